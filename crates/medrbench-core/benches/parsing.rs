use criterion::{black_box, criterion_group, criterion_main, Criterion};

use medrbench_core::answer::parse_answer;
use medrbench_core::prompts::{render_template, DIAGNOSIS_JUDGE_PROMPT};

fn bench_parse_answer(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_answer");

    let simple = "### Answer:\nOrbital cellulitis";

    let echoed_format = r#"```
### Chain of Thought:
<step 1> Fever and periorbital swelling after sinusitis.
<step 2> Proptosis and painful eye movement point to orbital involvement.

### Answer:
Orbital cellulitis secondary to acute ethmoid sinusitis
```
Let me know if you need anything else."#;

    let no_marker = "The most likely diagnosis is orbital cellulitis given the history.";

    let long_reasoning = {
        let mut s = String::from("### Answer:\n[diagnosis]\n\n### Chain of Thought:\n");
        for i in 0..500 {
            s.push_str(&format!("<step {i}> Consider finding {i} and its implications.\n"));
        }
        s.push_str("\n### Answer:\nSarcoidosis\n");
        s
    };

    group.bench_function("simple", |b| {
        b.iter(|| parse_answer(black_box(simple)))
    });

    group.bench_function("echoed_format", |b| {
        b.iter(|| parse_answer(black_box(echoed_format)))
    });

    group.bench_function("no_marker", |b| {
        b.iter(|| parse_answer(black_box(no_marker)))
    });

    group.bench_function("500_steps", |b| {
        b.iter(|| parse_answer(black_box(&long_reasoning)))
    });

    group.finish();
}

fn bench_render_judge_prompt(c: &mut Criterion) {
    let prediction = "Orbital cellulitis ".repeat(20);
    let reference = "Orbital cellulitis secondary to acute sinusitis with epidural empyema";

    c.bench_function("render_diagnosis_judge", |b| {
        b.iter(|| {
            render_template(
                black_box(DIAGNOSIS_JUDGE_PROMPT),
                black_box(&[("pred_diagnose", prediction.as_str()), ("gt_diagnose", reference)]),
            )
        })
    });
}

criterion_group!(benches, bench_parse_answer, bench_render_judge_prompt);
criterion_main!(benches);

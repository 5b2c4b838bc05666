use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use medrbench_core::dataset::{AssemblyOptions, DatasetAssembler};
use medrbench_core::model::{Category, Split};
use medrbench_core::normalize::RawCaseEntry;

/// Upstream-shaped entries keyed by PMC id.
fn upstream(category: Category, n: usize) -> Vec<RawCaseEntry> {
    let results_key = match category {
        Category::Diagnosis => "diagnosis_results",
        Category::Treatment => "treatment_plan_results",
    };
    (0..n)
        .map(|i| {
            RawCaseEntry::new(
                format!("PMC{}", 1_000_000 + i),
                json!({
                    "generate_case": {
                        "case_summary": format!("Case {i}: a patient presents with a history of ..."),
                        results_key: format!("Answer {i}"),
                        "differential_diagnosis": "...",
                    },
                    "body_category": ["Respiratory System"],
                    "disorder_category": ["Infectious Diseases"],
                    "checked_rare_disease": if i % 2 == 0 { json!(["Rare X"]) } else { json!([]) },
                }),
            )
            .with_category(category)
        })
        .collect()
}

fn bench_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");

    let mut all = upstream(Category::Diagnosis, 957);
    all.extend(upstream(Category::Treatment, 496));

    group.bench_function("all_1453", |b| {
        let assembler = DatasetAssembler::new(AssemblyOptions::default());
        b.iter(|| assembler.assemble(black_box(&all)))
    });

    group.bench_function("rare_only", |b| {
        let assembler = DatasetAssembler::new(AssemblyOptions {
            rare_disease_only: true,
            ..AssemblyOptions::default()
        });
        b.iter(|| assembler.assemble(black_box(&all)))
    });

    group.bench_function("diagnosis_eval_full", |b| {
        let assembler = DatasetAssembler::new(AssemblyOptions {
            split: Split::Diagnosis,
            eval_full: true,
            ..AssemblyOptions::default()
        });
        b.iter(|| assembler.assemble(black_box(&all)))
    });

    group.finish();
}

criterion_group!(benches, bench_assemble);
criterion_main!(benches);

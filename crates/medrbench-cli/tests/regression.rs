//! Regression detection integration tests.
//!
//! Tests the report comparison workflow end-to-end, including
//! JSON serialization, report loading, and the `compare` command.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use uuid::Uuid;

use medrbench_core::dataset::{DatasetSummary, Partition};
use medrbench_core::model::{
    CaseMetadata, Category, JudgeVerdict, ParsedAnswer, ScoredResult, Split, SplitTag,
};
use medrbench_core::report::EvalReport;
use medrbench_core::results::{EvaluatedCase, TimingInfo};
use medrbench_core::statistics::summarize;
use medrbench_core::traits::TokenUsage;

fn make_case(case_id: &str, correct: bool) -> EvaluatedCase {
    EvaluatedCase {
        result: ScoredResult {
            case_id: case_id.into(),
            reward: if correct { 1.0 } else { 0.0 },
            parsed_answer: ParsedAnswer {
                extracted_text: "Sarcoidosis".into(),
                extraction_succeeded: true,
            },
            judge_verdict: Some(JudgeVerdict {
                raw_judge_text: if correct { "Correct" } else { "Wrong" }.into(),
                is_correct: correct,
            }),
            metadata: CaseMetadata {
                category: Category::Diagnosis,
                body_category: vec![],
                disorder_category: vec![],
                is_rare_disease: false,
            },
            split_tag: SplitTag::Eval,
        },
        completion: "### Answer:\nSarcoidosis".into(),
        token_usage: TokenUsage::default(),
        timing: TimingInfo::default(),
    }
}

fn make_report(model: &str, cases: &[(&str, bool)]) -> EvalReport {
    let results: Vec<EvaluatedCase> = cases.iter().map(|&(id, ok)| make_case(id, ok)).collect();
    let summary = summarize(results.iter().map(|c| &c.result), 0, 0);
    EvalReport {
        id: Uuid::new_v4(),
        created_at: chrono::Utc::now(),
        dataset: DatasetSummary {
            split: Split::Diagnosis,
            rare_disease_only: false,
            eval_full: false,
            categories: vec![],
            malformed: 0,
            duplicates: 0,
        },
        partition: Partition::Eval,
        provider: "openai".into(),
        model: model.into(),
        judge_model: "gpt-4o".into(),
        results,
        unjudged: vec![],
        failed: vec![],
        summary,
        token_usage: TokenUsage::default(),
        duration_ms: 1000,
    }
}

fn medrbench(dir: &Path) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("medrbench").unwrap();
    cmd.current_dir(dir).env("HOME", dir);
    cmd
}

#[test]
fn saved_reports_compare_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let baseline_path = dir.path().join("baseline.json");
    let current_path = dir.path().join("current.json");

    make_report("v1", &[("diagnosis/PMC1", true), ("diagnosis/PMC2", true)])
        .save_json(&baseline_path)
        .unwrap();
    make_report("v2", &[("diagnosis/PMC1", true), ("diagnosis/PMC2", false)])
        .save_json(&current_path)
        .unwrap();

    let baseline = EvalReport::load_json(&baseline_path).unwrap();
    let current = EvalReport::load_json(&current_path).unwrap();
    let diff = current.compare(&baseline);

    assert!(diff.has_regressions());
    assert_eq!(diff.regressions.len(), 1);
    assert_eq!(diff.regressions[0].case_id, "diagnosis/PMC2");
    assert_eq!(diff.unchanged, 1);
    assert_eq!(diff.baseline_accuracy, 1.0);
    assert_eq!(diff.current_accuracy, 0.5);
}

#[test]
fn compare_command_fails_on_regression() {
    let dir = tempfile::tempdir().unwrap();
    make_report("v1", &[("diagnosis/PMC1", true)])
        .save_json(&dir.path().join("baseline.json"))
        .unwrap();
    make_report("v2", &[("diagnosis/PMC1", false)])
        .save_json(&dir.path().join("current.json"))
        .unwrap();

    medrbench(dir.path())
        .args(["compare", "--baseline", "baseline.json", "--current", "current.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 regressions"))
        .stdout(predicate::str::contains("diagnosis/PMC1 1 -> 0"));

    medrbench(dir.path())
        .args(["compare", "--baseline", "baseline.json", "--current", "current.json"])
        .arg("--fail-on-regression")
        .assert()
        .failure();
}

#[test]
fn compare_command_markdown_improvement() {
    let dir = tempfile::tempdir().unwrap();
    make_report("v1", &[("diagnosis/PMC1", false)])
        .save_json(&dir.path().join("baseline.json"))
        .unwrap();
    make_report("v2", &[("diagnosis/PMC1", true), ("diagnosis/PMC9", true)])
        .save_json(&dir.path().join("current.json"))
        .unwrap();

    medrbench(dir.path())
        .args(["compare", "--baseline", "baseline.json", "--current", "current.json"])
        .args(["--format", "markdown", "--fail-on-regression"])
        .assert()
        .success()
        .stdout(predicate::str::contains("### Improvements"))
        .stdout(predicate::str::contains("| diagnosis/PMC1 | 0 | 1 |"));
}

#[test]
fn compare_command_json() {
    let dir = tempfile::tempdir().unwrap();
    make_report("v1", &[("diagnosis/PMC1", true)])
        .save_json(&dir.path().join("baseline.json"))
        .unwrap();
    make_report("v2", &[("diagnosis/PMC2", true)])
        .save_json(&dir.path().join("current.json"))
        .unwrap();

    let output = medrbench(dir.path())
        .args(["compare", "--baseline", "baseline.json", "--current", "current.json"])
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let diff: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(diff["new_cases"], 1);
    assert_eq!(diff["removed_cases"], 1);
    assert_eq!(diff["current_model"], "v2");
}

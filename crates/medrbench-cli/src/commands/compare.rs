//! The `medrbench compare` command.

use std::path::PathBuf;

use anyhow::Result;

use medrbench_core::report::EvalReport;

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    fail_on_regression: bool,
    format: String,
) -> Result<()> {
    let baseline = EvalReport::load_json(&baseline_path)?;
    let current = EvalReport::load_json(&current_path)?;

    let report = current.compare(&baseline);

    match format.as_str() {
        "markdown" | "md" => {
            println!("{}", report.to_markdown());
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            // text format
            println!(
                "Accuracy: {:.1}% ({}) -> {:.1}% ({})",
                report.baseline_accuracy * 100.0,
                report.baseline_model,
                report.current_accuracy * 100.0,
                report.current_model,
            );
            println!(
                "Comparison: {} regressions, {} improvements, {} unchanged",
                report.regressions.len(),
                report.improvements.len(),
                report.unchanged
            );

            if !report.regressions.is_empty() {
                println!("\nRegressions:");
                for r in &report.regressions {
                    println!("  {} {:.0} -> {:.0}", r.case_id, r.baseline_reward, r.current_reward);
                }
            }

            if !report.improvements.is_empty() {
                println!("\nImprovements:");
                for i in &report.improvements {
                    println!("  {} {:.0} -> {:.0}", i.case_id, i.baseline_reward, i.current_reward);
                }
            }

            if report.new_cases > 0 {
                println!("\n{} new case(s)", report.new_cases);
            }
            if report.removed_cases > 0 {
                println!("{} removed case(s)", report.removed_cases);
            }
        }
    }

    if fail_on_regression && report.has_regressions() {
        std::process::exit(1);
    }

    Ok(())
}

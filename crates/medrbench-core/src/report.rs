//! Eval report types with JSON persistence and regression detection.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dataset::{DatasetSummary, Partition};
use crate::results::{EvaluatedCase, FailedCase, UnjudgedCase};
use crate::statistics::AccuracySummary;
use crate::traits::TokenUsage;

/// A complete eval report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Sizes of the assembled dataset the run drew from.
    pub dataset: DatasetSummary,
    /// Which tagged items were evaluated.
    pub partition: Partition,
    /// Provider of the model under test.
    pub provider: String,
    pub model: String,
    pub judge_model: String,
    pub results: Vec<EvaluatedCase>,
    #[serde(default)]
    pub unjudged: Vec<UnjudgedCase>,
    #[serde(default)]
    pub failed: Vec<FailedCase>,
    pub summary: AccuracySummary,
    /// Token usage of the model under test.
    #[serde(default)]
    pub token_usage: TokenUsage,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl EvalReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: EvalReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Reward per scored case.
    pub fn rewards(&self) -> HashMap<&str, f64> {
        self.results
            .iter()
            .map(|c| (c.result.case_id.as_str(), c.result.reward))
            .collect()
    }

    /// Compare this report against a baseline to detect regressions.
    ///
    /// Only scored cases take part; a case that was unjudged or failed in
    /// either run counts as new or removed.
    pub fn compare(&self, baseline: &EvalReport) -> RegressionReport {
        let baseline_rewards = baseline.rewards();
        let current_rewards = self.rewards();

        let mut regressions = Vec::new();
        let mut improvements = Vec::new();
        let mut unchanged = 0usize;
        let mut new_cases = 0usize;

        for (&case_id, &current) in &current_rewards {
            let Some(&baseline_reward) = baseline_rewards.get(case_id) else {
                new_cases += 1;
                continue;
            };
            let change = RewardChange {
                case_id: case_id.to_string(),
                baseline_reward,
                current_reward: current,
            };
            if current < baseline_reward {
                regressions.push(change);
            } else if current > baseline_reward {
                improvements.push(change);
            } else {
                unchanged += 1;
            }
        }

        let removed_cases = baseline_rewards
            .keys()
            .filter(|k| !current_rewards.contains_key(*k))
            .count();

        regressions.sort_by(|a, b| a.case_id.cmp(&b.case_id));
        improvements.sort_by(|a, b| a.case_id.cmp(&b.case_id));

        RegressionReport {
            baseline_model: baseline.model.clone(),
            current_model: self.model.clone(),
            baseline_accuracy: baseline.summary.overall.rate(),
            current_accuracy: self.summary.overall.rate(),
            regressions,
            improvements,
            unchanged,
            new_cases,
            removed_cases,
        }
    }
}

/// Result of comparing two reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionReport {
    pub baseline_model: String,
    pub current_model: String,
    pub baseline_accuracy: f64,
    pub current_accuracy: f64,
    /// Cases that went from correct to incorrect.
    pub regressions: Vec<RewardChange>,
    /// Cases that went from incorrect to correct.
    pub improvements: Vec<RewardChange>,
    /// Cases scored the same in both runs.
    pub unchanged: usize,
    /// Cases scored in current but not baseline.
    pub new_cases: usize,
    /// Cases scored in baseline but not current.
    pub removed_cases: usize,
}

/// A case whose reward changed between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardChange {
    pub case_id: String,
    pub baseline_reward: f64,
    pub current_reward: f64,
}

impl RegressionReport {
    /// Format the regression report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Accuracy:** {:.1}% ({}) → {:.1}% ({})\n\n",
            self.baseline_accuracy * 100.0,
            self.baseline_model,
            self.current_accuracy * 100.0,
            self.current_model,
        ));
        md.push_str(&format!(
            "**Summary:** {} regressions, {} improvements, {} unchanged\n\n",
            self.regressions.len(),
            self.improvements.len(),
            self.unchanged
        ));

        for (title, changes) in [
            ("Regressions", &self.regressions),
            ("Improvements", &self.improvements),
        ] {
            if changes.is_empty() {
                continue;
            }
            md.push_str(&format!("### {title}\n\n"));
            md.push_str("| Case | Baseline | Current |\n");
            md.push_str("|------|----------|---------|\n");
            for c in changes {
                md.push_str(&format!(
                    "| {} | {:.0} | {:.0} |\n",
                    c.case_id, c.baseline_reward, c.current_reward
                ));
            }
            md.push('\n');
        }

        md
    }

    /// Returns true if there are any regressions.
    pub fn has_regressions(&self) -> bool {
        !self.regressions.is_empty()
    }
}

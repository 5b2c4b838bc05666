//! Accuracy aggregation over scored cases.
//!
//! Accuracy is `correct / scored`. Unjudged and failed cases never enter
//! the denominator; they are counted separately so a flaky judge cannot
//! masquerade as a weak model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Category, ScoredResult};

/// Correct-over-scored for one slice of the results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Accuracy {
    pub correct: usize,
    pub scored: usize,
}

impl Accuracy {
    fn record(&mut self, result: &ScoredResult) {
        self.scored += 1;
        if result.is_correct() {
            self.correct += 1;
        }
    }

    /// Fraction in `[0, 1]`; 0 for an empty slice.
    pub fn rate(&self) -> f64 {
        if self.scored == 0 {
            0.0
        } else {
            self.correct as f64 / self.scored as f64
        }
    }
}

/// Aggregate statistics for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracySummary {
    pub overall: Accuracy,
    pub per_category: BTreeMap<Category, Accuracy>,
    pub rare_disease: Accuracy,
    pub common_disease: Accuracy,
    pub per_body_category: BTreeMap<String, Accuracy>,
    /// Scored cases whose completion had no answer marker.
    pub no_answer: usize,
    pub unjudged: usize,
    pub failed: usize,
}

impl AccuracySummary {
    /// Every case the run attempted.
    pub fn total_cases(&self) -> usize {
        self.overall.scored + self.unjudged + self.failed
    }

    pub fn category(&self, category: Category) -> Accuracy {
        self.per_category.get(&category).copied().unwrap_or_default()
    }
}

/// Aggregate scored results.
pub fn summarize<'a>(
    results: impl IntoIterator<Item = &'a ScoredResult>,
    unjudged: usize,
    failed: usize,
) -> AccuracySummary {
    let mut summary = AccuracySummary {
        unjudged,
        failed,
        ..AccuracySummary::default()
    };

    for result in results {
        summary.overall.record(result);
        summary
            .per_category
            .entry(result.metadata.category)
            .or_default()
            .record(result);

        if result.metadata.is_rare_disease {
            summary.rare_disease.record(result);
        } else {
            summary.common_disease.record(result);
        }

        for body in &result.metadata.body_category {
            summary
                .per_body_category
                .entry(body.clone())
                .or_default()
                .record(result);
        }

        if !result.parsed_answer.extraction_succeeded {
            summary.no_answer += 1;
        }
    }

    summary
}

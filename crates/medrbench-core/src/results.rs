//! Per-case outcomes of an eval run.
//!
//! Every case that finishes ends up in exactly one of three buckets: scored
//! (including cases with no extractable answer), unjudged (the model
//! answered but the judge could not), or failed (the model never answered).

use serde::{Deserialize, Serialize};

use crate::model::{CaseMetadata, ParsedAnswer, ScoredResult, SplitTag};
use crate::traits::TokenUsage;

/// A scored case plus the raw material behind the score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatedCase {
    pub result: ScoredResult,
    /// Full model completion, before extraction.
    pub completion: String,
    pub token_usage: TokenUsage,
    pub timing: TimingInfo,
}

/// The model answered but no verdict could be obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnjudgedCase {
    pub case_id: String,
    pub parsed_answer: ParsedAnswer,
    pub completion: String,
    pub metadata: CaseMetadata,
    pub split_tag: SplitTag,
    pub reason: String,
}

/// The model under test failed to produce a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedCase {
    pub case_id: String,
    pub metadata: CaseMetadata,
    pub split_tag: SplitTag,
    pub error: String,
}

/// Timing breakdown for one case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingInfo {
    /// Model-under-test request time, including retries.
    pub generation_ms: u64,
    /// Judge request time, including retries. 0 when the judge was skipped.
    pub judge_ms: u64,
    pub total_ms: u64,
}

/// Outcome of evaluating one case.
#[derive(Debug, Clone)]
pub enum CaseOutcome {
    Scored(EvaluatedCase),
    Unjudged(UnjudgedCase),
    Failed(FailedCase),
}

impl CaseOutcome {
    pub fn case_id(&self) -> &str {
        match self {
            CaseOutcome::Scored(c) => &c.result.case_id,
            CaseOutcome::Unjudged(c) => &c.case_id,
            CaseOutcome::Failed(c) => &c.case_id,
        }
    }

    /// Reward for scored cases; `None` for unjudged and failed ones.
    pub fn reward(&self) -> Option<f64> {
        match self {
            CaseOutcome::Scored(c) => Some(c.result.reward),
            _ => None,
        }
    }
}

//! Binary reward assignment.

use crate::model::{EvaluationItem, JudgeVerdict, ParsedAnswer, ScoredResult};

/// Combine an item, its parsed answer and the judge verdict into a result.
///
/// `verdict` is `None` when the completion had no answer to judge; such
/// cases score 0.0. Judge failures are not passed here.
pub fn score(
    item: &EvaluationItem,
    parsed: ParsedAnswer,
    verdict: Option<JudgeVerdict>,
) -> ScoredResult {
    let reward = match &verdict {
        Some(v) if v.is_correct => 1.0,
        _ => 0.0,
    };

    ScoredResult {
        case_id: item.case.case_id.clone(),
        reward,
        parsed_answer: parsed,
        judge_verdict: verdict,
        metadata: item.case.metadata(),
        split_tag: item.split_tag,
    }
}

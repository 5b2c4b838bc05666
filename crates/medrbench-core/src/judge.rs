//! LLM-as-judge adjudication.
//!
//! The judge sees the category's template filled with the predicted and
//! reference answers and replies in free text. A reply counts as correct
//! when it contains the substring `correct` in any casing. This matches the
//! upstream MedRBench scorer exactly, including that `incorrect` also
//! matches; do not replace it with a stricter classifier.

use crate::error::{JudgeError, ProviderError, TemplateError};
use crate::model::{CaseRecord, JudgeVerdict, ParsedAnswer};
use crate::prompts::{render_template, JudgeTemplates, NO_ADDITIONAL_INFO};
use crate::traits::{CompletionRequest, TextCompletionProvider};

/// Sampling settings for judge calls.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.0,
            max_tokens: 1024,
        }
    }
}

/// Render the judge prompt for one case.
pub fn build_judge_prompt(
    case: &CaseRecord,
    parsed: &ParsedAnswer,
    templates: &JudgeTemplates,
) -> Result<String, TemplateError> {
    let predicted = parsed.extracted_text.as_str();
    let reference = case.reference_answer.as_str();
    render_template(
        templates.for_category(case.category),
        &[
            ("case_summary", case.case_summary.as_str()),
            ("reference_answer", reference),
            ("predicted_answer", predicted),
            ("pred_diagnose", predicted),
            ("gt_diagnose", reference),
            ("pred_treatment", predicted),
            ("gt_treatment", reference),
            ("additional_info", NO_ADDITIONAL_INFO),
        ],
    )
}

/// `true` iff the judge text contains "correct", case-insensitively.
pub fn interpret_verdict(judge_text: &str) -> bool {
    judge_text.to_lowercase().contains("correct")
}

/// Ask the judge whether `parsed` matches the case's reference answer.
///
/// Calls the judge exactly once. A judge error or a blank reply is
/// reported as [`JudgeError::Unavailable`], never as an incorrect verdict.
pub async fn adjudicate(
    case: &CaseRecord,
    parsed: &ParsedAnswer,
    templates: &JudgeTemplates,
    judge: &dyn TextCompletionProvider,
    settings: &JudgeSettings,
) -> Result<JudgeVerdict, JudgeError> {
    let prompt = build_judge_prompt(case, parsed, templates).map_err(|source| {
        JudgeError::Template {
            case_id: case.case_id.clone(),
            source,
        }
    })?;

    let request = CompletionRequest {
        model: settings.model.clone(),
        prompt,
        system_prompt: None,
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
    };

    let completion = judge.complete(&request).await.map_err(|e| {
        let permanent = e
            .downcast_ref::<ProviderError>()
            .is_some_and(ProviderError::is_permanent);
        JudgeError::Unavailable {
            case_id: case.case_id.clone(),
            reason: format!("{e:#}"),
            permanent,
        }
    })?;

    if completion.content.trim().is_empty() {
        return Err(JudgeError::Unavailable {
            case_id: case.case_id.clone(),
            reason: "judge returned no text".to_string(),
            permanent: false,
        });
    }

    let is_correct = interpret_verdict(&completion.content);
    tracing::debug!(case_id = %case.case_id, is_correct, "judge verdict");

    Ok(JudgeVerdict {
        raw_judge_text: completion.content,
        is_correct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;
    use crate::traits::{Completion, ModelInfo, TokenUsage};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct ScriptedJudge {
        reply: anyhow::Result<String>,
        calls: AtomicU32,
        last_prompt: Mutex<Option<String>>,
    }

    impl ScriptedJudge {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: AtomicU32::new(0),
                last_prompt: Mutex::new(None),
            }
        }

        fn failing(err: anyhow::Error) -> Self {
            Self {
                reply: Err(err),
                calls: AtomicU32::new(0),
                last_prompt: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl TextCompletionProvider for ScriptedJudge {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<Completion> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            *self.last_prompt.lock().unwrap() = Some(request.prompt.clone());
            match &self.reply {
                Ok(text) => Ok(Completion {
                    content: text.clone(),
                    model: request.model.clone(),
                    token_usage: TokenUsage::default(),
                    latency_ms: 1,
                }),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }

        fn available_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    fn case(category: Category) -> CaseRecord {
        CaseRecord {
            case_id: format!("{category}/PMC42"),
            source_id: "PMC42".into(),
            category,
            body_category: vec![],
            disorder_category: vec![],
            is_rare_disease: false,
            case_summary: "Periorbital swelling after sinusitis.".into(),
            reference_answer: "Orbital cellulitis secondary to acute sinusitis with epidural empyema"
                .into(),
            metadata: BTreeMap::new(),
        }
    }

    fn answer(text: &str) -> ParsedAnswer {
        ParsedAnswer {
            extracted_text: text.into(),
            extraction_succeeded: true,
        }
    }

    #[test]
    fn verdict_substring_rule() {
        assert!(interpret_verdict("This is correct."));
        assert!(interpret_verdict("This is incorrect."));
        assert!(interpret_verdict("CORRECT"));
        assert!(!interpret_verdict("No match."));
        assert!(!interpret_verdict("Wrong"));
    }

    #[test]
    fn diagnosis_prompt_has_both_answers() {
        let prompt = build_judge_prompt(
            &case(Category::Diagnosis),
            &answer("Orbital cellulitis"),
            &JudgeTemplates::default(),
        )
        .unwrap();
        assert!(prompt.contains("[Predicted Diagosis]\nOrbital cellulitis"));
        assert!(prompt.contains("epidural empyema"));
    }

    #[test]
    fn treatment_prompt_uses_treatment_template() {
        let prompt = build_judge_prompt(
            &case(Category::Treatment),
            &answer("IV antibiotics"),
            &JudgeTemplates::default(),
        )
        .unwrap();
        assert!(prompt.contains("[predicted treatment]\nIV antibiotics"));
        assert!(prompt.contains(NO_ADDITIONAL_INFO));
    }

    #[test]
    fn custom_template_slots() {
        let templates = JudgeTemplates {
            diagnosis: "{case_summary}|{predicted_answer}|{reference_answer}".into(),
            treatment: "{unknown}".into(),
        };
        let prompt =
            build_judge_prompt(&case(Category::Diagnosis), &answer("x"), &templates).unwrap();
        assert!(prompt.starts_with("Periorbital swelling after sinusitis.|x|Orbital"));
        assert!(build_judge_prompt(&case(Category::Treatment), &answer("x"), &templates).is_err());
    }

    #[tokio::test]
    async fn adjudicate_calls_judge_once() {
        let judge = ScriptedJudge::replying("The prediction is correct given clinical equivalence.");
        let verdict = adjudicate(
            &case(Category::Diagnosis),
            &answer("Orbital cellulitis from sinus infection with empyema"),
            &JudgeTemplates::default(),
            &judge,
            &JudgeSettings::default(),
        )
        .await
        .unwrap();

        assert!(verdict.is_correct);
        assert_eq!(judge.calls.load(Ordering::Relaxed), 1);
        let prompt = judge.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("Orbital cellulitis from sinus infection with empyema"));
    }

    #[tokio::test]
    async fn adjudicate_wrong_verdict() {
        let judge = ScriptedJudge::replying("Wrong");
        let verdict = adjudicate(
            &case(Category::Treatment),
            &answer("Observation"),
            &JudgeTemplates::default(),
            &judge,
            &JudgeSettings::default(),
        )
        .await
        .unwrap();
        assert!(!verdict.is_correct);
        assert_eq!(verdict.raw_judge_text, "Wrong");
    }

    #[tokio::test]
    async fn judge_failure_is_unavailable() {
        let judge = ScriptedJudge::failing(anyhow::anyhow!("connection reset"));
        let err = adjudicate(
            &case(Category::Diagnosis),
            &answer("x"),
            &JudgeTemplates::default(),
            &judge,
            &JudgeSettings::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, JudgeError::Unavailable { permanent: false, .. }));
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn blank_judge_reply_is_unavailable() {
        let judge = ScriptedJudge::replying("  \n");
        let err = adjudicate(
            &case(Category::Diagnosis),
            &answer("x"),
            &JudgeTemplates::default(),
            &judge,
            &JudgeSettings::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, JudgeError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn template_failure_skips_judge() {
        let judge = ScriptedJudge::replying("Correct");
        let templates = JudgeTemplates {
            diagnosis: "{missing}".into(),
            treatment: String::new(),
        };
        let err = adjudicate(
            &case(Category::Diagnosis),
            &answer("x"),
            &templates,
            &judge,
            &JudgeSettings::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, JudgeError::Template { .. }));
        assert_eq!(judge.calls.load(Ordering::Relaxed), 0);
    }
}

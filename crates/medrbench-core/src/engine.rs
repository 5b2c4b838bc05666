//! Central eval engine orchestrator.
//!
//! Runs assembled cases through the model under test, extracts the answer,
//! asks the judge, and scores, with bounded parallelism and retries on
//! transient provider errors.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::answer::AnswerParser;
use crate::dataset::{AssembledDataset, Partition};
use crate::error::{JudgeError, ProviderError};
use crate::judge::{adjudicate, JudgeSettings};
use crate::model::{EvaluationItem, JudgeVerdict, ParsedAnswer};
use crate::prompts::JudgeTemplates;
use crate::report::EvalReport;
use crate::results::{CaseOutcome, EvaluatedCase, FailedCase, TimingInfo, UnjudgedCase};
use crate::scorer::score;
use crate::statistics::summarize;
use crate::traits::{CompletionRequest, TextCompletionProvider, TokenUsage};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Configuration for the eval engine.
#[derive(Debug, Clone)]
pub struct EvalEngineConfig {
    /// Maximum concurrent cases.
    pub parallelism: usize,
    /// Model under test.
    pub model: String,
    /// Temperature for generation.
    pub temperature: f64,
    /// Max tokens for generation.
    pub max_tokens: u32,
    pub judge: JudgeSettings,
    /// Retries on provider errors, for both model and judge calls.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time.
    pub retry_delay: Duration,
    /// Fail the run on the first case the judge cannot adjudicate.
    pub abort_on_judge_error: bool,
}

impl Default for EvalEngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens: 4096,
            judge: JudgeSettings::default(),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            abort_on_judge_error: false,
        }
    }
}

/// Which assembled items a run evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSelection {
    pub partition: Partition,
    /// Evaluate only the first N selected items.
    pub limit: Option<usize>,
}

impl Default for RunSelection {
    fn default() -> Self {
        Self {
            partition: Partition::Eval,
            limit: None,
        }
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_run_start(&self, total: usize);
    fn on_case_complete(&self, outcome: &CaseOutcome);
    fn on_run_complete(&self, total: usize, scored: usize, unjudged: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_run_start(&self, _: usize) {}
    fn on_case_complete(&self, _: &CaseOutcome) {}
    fn on_run_complete(&self, _: usize, _: usize, _: usize, _: usize, _: Duration) {}
}

/// The central eval engine.
pub struct EvalEngine {
    model_provider: Arc<dyn TextCompletionProvider>,
    judge_provider: Arc<dyn TextCompletionProvider>,
    templates: JudgeTemplates,
    parser: AnswerParser,
    config: EvalEngineConfig,
}

impl EvalEngine {
    pub fn new(
        model_provider: Arc<dyn TextCompletionProvider>,
        judge_provider: Arc<dyn TextCompletionProvider>,
        config: EvalEngineConfig,
    ) -> Self {
        Self {
            model_provider,
            judge_provider,
            templates: JudgeTemplates::default(),
            parser: AnswerParser::default(),
            config,
        }
    }

    pub fn with_templates(mut self, templates: JudgeTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_parser(mut self, parser: AnswerParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn config(&self) -> &EvalEngineConfig {
        &self.config
    }

    /// Run the selected items of an assembled dataset.
    ///
    /// Per-case failures are recorded in the report. The run itself only
    /// fails when `abort_on_judge_error` is set and a case cannot be judged.
    pub async fn run(
        &self,
        dataset: &AssembledDataset,
        selection: RunSelection,
        progress: &dyn ProgressReporter,
    ) -> Result<EvalReport> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));

        let items: Vec<&EvaluationItem> = dataset
            .partition(selection.partition)
            .take(selection.limit.unwrap_or(usize::MAX))
            .collect();
        let total = items.len();
        progress.on_run_start(total);
        tracing::info!(
            %run_id,
            cases = total,
            partition = %selection.partition,
            model = %self.config.model,
            judge = %self.config.judge.model,
            "starting eval run"
        );

        let mut futures = FuturesUnordered::new();
        for (index, item) in items.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                Ok::<_, anyhow::Error>((index, self.evaluate_case(item).await))
            });
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(next) = futures.next().await {
            let (index, outcome) = next?;
            progress.on_case_complete(&outcome);
            if let CaseOutcome::Unjudged(case) = &outcome {
                tracing::warn!("case {} left unjudged: {}", case.case_id, case.reason);
                if self.config.abort_on_judge_error {
                    anyhow::bail!("aborting run: judge failed on {}: {}", case.case_id, case.reason);
                }
            }
            outcomes.push((index, outcome));
        }
        drop(futures);

        // Completion order is nondeterministic; report in dataset order.
        outcomes.sort_by_key(|(index, _)| *index);

        let mut results = Vec::new();
        let mut unjudged = Vec::new();
        let mut failed = Vec::new();
        let mut token_usage = TokenUsage::default();
        for (_, outcome) in outcomes {
            match outcome {
                CaseOutcome::Scored(case) => {
                    token_usage += case.token_usage;
                    results.push(case);
                }
                CaseOutcome::Unjudged(case) => unjudged.push(case),
                CaseOutcome::Failed(case) => {
                    tracing::error!("eval failed for {}: {}", case.case_id, case.error);
                    failed.push(case);
                }
            }
        }

        let elapsed = start.elapsed();
        progress.on_run_complete(total, results.len(), unjudged.len(), failed.len(), elapsed);

        let summary = summarize(results.iter().map(|c| &c.result), unjudged.len(), failed.len());
        tracing::info!(
            %run_id,
            accuracy = summary.overall.rate(),
            scored = summary.overall.scored,
            unjudged = summary.unjudged,
            failed = summary.failed,
            "eval run complete"
        );

        Ok(EvalReport {
            id: run_id,
            created_at: chrono::Utc::now(),
            dataset: dataset.summary().clone(),
            partition: selection.partition,
            provider: self.model_provider.name().to_string(),
            model: self.config.model.clone(),
            judge_model: self.config.judge.model.clone(),
            results,
            unjudged,
            failed,
            summary,
            token_usage,
            duration_ms: elapsed.as_millis() as u64,
        })
    }

    /// Generate, extract, judge and score a single item.
    pub async fn evaluate_case(&self, item: &EvaluationItem) -> CaseOutcome {
        let case_start = Instant::now();
        let case = &item.case;

        let request = CompletionRequest {
            model: self.config.model.clone(),
            prompt: item.formatted_question.clone(),
            system_prompt: (!item.system_prompt.is_empty()).then(|| item.system_prompt.clone()),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let completion = match with_retries(
            self.config.max_retries,
            self.config.retry_delay,
            || self.model_provider.complete(&request),
            classify_provider_error,
        )
        .await
        {
            Ok(completion) => completion,
            Err(e) => {
                return CaseOutcome::Failed(FailedCase {
                    case_id: case.case_id.clone(),
                    metadata: case.metadata(),
                    split_tag: item.split_tag,
                    error: format!("{e:#}"),
                })
            }
        };
        let generation_ms = case_start.elapsed().as_millis() as u64;

        let parsed = self.parser.parse(&completion.content);
        if !parsed.extraction_succeeded {
            tracing::debug!(case_id = %case.case_id, "no answer marker, skipping judge");
            return self.scored(item, parsed, None, completion.content, completion.token_usage, generation_ms, 0);
        }

        let judge_start = Instant::now();
        let verdict = with_retries(
            self.config.max_retries,
            self.config.retry_delay,
            || {
                adjudicate(
                    case,
                    &parsed,
                    &self.templates,
                    self.judge_provider.as_ref(),
                    &self.config.judge,
                )
            },
            classify_judge_error,
        )
        .await;
        let judge_ms = judge_start.elapsed().as_millis() as u64;

        match verdict {
            Ok(verdict) => self.scored(
                item,
                parsed,
                Some(verdict),
                completion.content,
                completion.token_usage,
                generation_ms,
                judge_ms,
            ),
            Err(e) => CaseOutcome::Unjudged(UnjudgedCase {
                case_id: case.case_id.clone(),
                parsed_answer: parsed,
                completion: completion.content,
                metadata: case.metadata(),
                split_tag: item.split_tag,
                reason: e.to_string(),
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn scored(
        &self,
        item: &EvaluationItem,
        parsed: ParsedAnswer,
        verdict: Option<JudgeVerdict>,
        completion: String,
        token_usage: TokenUsage,
        generation_ms: u64,
        judge_ms: u64,
    ) -> CaseOutcome {
        CaseOutcome::Scored(EvaluatedCase {
            result: score(item, parsed, verdict),
            completion,
            token_usage,
            timing: TimingInfo {
                generation_ms,
                judge_ms,
                total_ms: generation_ms + judge_ms,
            },
        })
    }
}

/// How to proceed after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryDecision {
    Stop,
    Retry { after: Option<Duration> },
}

fn classify_provider_error(err: &anyhow::Error) -> RetryDecision {
    match err.downcast_ref::<ProviderError>() {
        Some(e) if e.is_permanent() => RetryDecision::Stop,
        Some(e) => RetryDecision::Retry {
            after: e.retry_after_ms().map(Duration::from_millis),
        },
        None => RetryDecision::Retry { after: None },
    }
}

fn classify_judge_error(err: &JudgeError) -> RetryDecision {
    if err.is_retryable() {
        RetryDecision::Retry { after: None }
    } else {
        RetryDecision::Stop
    }
}

/// Call `op` until it succeeds, `classify` says stop, or retries run out.
///
/// Backoff doubles from `base_delay`, capped at 60s; a rate-limit hint
/// replaces the next delay.
async fn with_retries<T, E, F, Fut>(
    max_retries: u32,
    base_delay: Duration,
    mut op: F,
    classify: impl Fn(&E) -> RetryDecision,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = base_delay;
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let decision = classify(&e);
                if attempt >= max_retries || decision == RetryDecision::Stop {
                    return Err(e);
                }
                let wait = match decision {
                    RetryDecision::Retry { after: Some(hint) } => hint,
                    _ => delay,
                };
                attempt += 1;
                tracing::debug!(attempt, wait_ms = wait.as_millis() as u64, "retrying after error");
                tokio::time::sleep(wait).await;
                delay = (delay * 2).min(MAX_RETRY_DELAY);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{AssemblyOptions, DatasetAssembler};
    use crate::model::Split;
    use crate::normalize::RawCaseEntry;
    use crate::traits::{Completion, ModelInfo};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replies with the first matching `(substring, reply)` rule, failing
    /// the first `fail_first` calls.
    struct Scripted {
        rules: Vec<(String, String)>,
        fallback: String,
        fail_first: u32,
        failure: fn() -> ProviderError,
        calls: AtomicU32,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(fallback: &str) -> Self {
            Self {
                rules: vec![],
                fallback: fallback.to_string(),
                fail_first: 0,
                failure: || ProviderError::NetworkError("connection reset".into()),
                calls: AtomicU32::new(0),
                prompts: Mutex::new(vec![]),
            }
        }

        fn rule(mut self, needle: &str, reply: &str) -> Self {
            self.rules.push((needle.to_string(), reply.to_string()));
            self
        }

        fn failing(mut self, n: u32, failure: fn() -> ProviderError) -> Self {
            self.fail_first = n;
            self.failure = failure;
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextCompletionProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<Completion> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt.clone());
            if n < self.fail_first {
                return Err((self.failure)().into());
            }
            let content = self
                .rules
                .iter()
                .find(|(needle, _)| request.prompt.contains(needle.as_str()))
                .map(|(_, reply)| reply.clone())
                .unwrap_or_else(|| self.fallback.clone());
            Ok(Completion {
                content,
                model: request.model.clone(),
                token_usage: TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                    estimated_cost_usd: 0.0,
                },
                latency_ms: 1,
            })
        }

        fn available_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    fn dataset(n: usize) -> AssembledDataset {
        let entries: Vec<RawCaseEntry> = (0..n)
            .map(|i| {
                RawCaseEntry::new(
                    format!("PMC{i}"),
                    json!({
                        "category": "diagnosis",
                        "case_summary": format!("Patient {i} presents with symptoms."),
                        "reference_answer": format!("Disease {i}"),
                        "is_rare_disease": i % 2 == 0,
                    }),
                )
            })
            .collect();
        DatasetAssembler::new(AssemblyOptions {
            split: Split::Diagnosis,
            eval_full: true,
            ..AssemblyOptions::default()
        })
        .assemble(&entries)
        .unwrap()
    }

    fn config() -> EvalEngineConfig {
        EvalEngineConfig {
            parallelism: 2,
            model: "test-model".into(),
            retry_delay: Duration::from_millis(1),
            ..EvalEngineConfig::default()
        }
    }

    fn all() -> RunSelection {
        RunSelection {
            partition: Partition::All,
            limit: None,
        }
    }

    #[tokio::test]
    async fn scores_correct_and_wrong() {
        let model = Arc::new(
            Scripted::new("### Answer:\nwrong guess").rule("Patient 0 ", "### Answer:\nDisease 0"),
        );
        let judge = Arc::new(Scripted::new("Wrong").rule("Disease 0\n\n[Ground-truth", "Correct"));
        let engine = EvalEngine::new(model, judge.clone(), config());

        let report = engine.run(&dataset(3), all(), &NoopReporter).await.unwrap();
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.summary.overall.correct, 1);
        assert_eq!(report.summary.overall.scored, 3);
        assert_eq!(judge.calls(), 3);
        assert_eq!(report.results[0].result.case_id, "diagnosis/PMC0");
        assert_eq!(report.results[0].result.reward, 1.0);
        assert_eq!(report.token_usage.total_tokens, 45);
    }

    #[tokio::test]
    async fn missing_marker_skips_judge() {
        let model = Arc::new(Scripted::new("I believe it is Disease 0."));
        let judge = Arc::new(Scripted::new("Correct"));
        let engine = EvalEngine::new(model, judge.clone(), config());

        let report = engine.run(&dataset(2), all(), &NoopReporter).await.unwrap();
        assert_eq!(judge.calls(), 0);
        assert!(report.results.iter().all(|c| c.result.reward == 0.0));
        assert!(report.results.iter().all(|c| c.result.judge_verdict.is_none()));
        assert_eq!(report.summary.no_answer, 2);
    }

    #[tokio::test]
    async fn judge_failure_becomes_unjudged() {
        let model = Arc::new(Scripted::new("### Answer:\nDisease"));
        let judge = Arc::new(Scripted::new("Correct").failing(u32::MAX, || ProviderError::Timeout(30)));
        let engine = EvalEngine::new(
            model,
            judge.clone(),
            EvalEngineConfig {
                max_retries: 1,
                ..config()
            },
        );

        let report = engine.run(&dataset(2), all(), &NoopReporter).await.unwrap();
        assert!(report.results.is_empty());
        assert_eq!(report.unjudged.len(), 2);
        assert_eq!(report.summary.unjudged, 2);
        assert_eq!(report.summary.overall.scored, 0);
        // One attempt plus one retry per case.
        assert_eq!(judge.calls(), 4);
    }

    #[tokio::test]
    async fn abort_on_judge_error() {
        let model = Arc::new(Scripted::new("### Answer:\nDisease"));
        let judge = Arc::new(Scripted::new("").failing(u32::MAX, || {
            ProviderError::AuthenticationFailed("bad key".into())
        }));
        let engine = EvalEngine::new(
            model,
            judge.clone(),
            EvalEngineConfig {
                abort_on_judge_error: true,
                ..config()
            },
        );

        let err = engine.run(&dataset(2), all(), &NoopReporter).await.unwrap_err();
        assert!(err.to_string().contains("judge failed"));
    }

    #[tokio::test]
    async fn permanent_judge_error_not_retried() {
        let model = Arc::new(Scripted::new("### Answer:\nDisease"));
        let judge = Arc::new(Scripted::new("").failing(u32::MAX, || {
            ProviderError::AuthenticationFailed("bad key".into())
        }));
        let engine = EvalEngine::new(model, judge.clone(), config());

        let report = engine.run(&dataset(1), all(), &NoopReporter).await.unwrap();
        assert_eq!(report.unjudged.len(), 1);
        assert_eq!(judge.calls(), 1);
    }

    #[tokio::test]
    async fn transient_model_errors_are_retried() {
        let model = Arc::new(
            Scripted::new("### Answer:\nDisease 0").failing(2, || ProviderError::RateLimited {
                retry_after_ms: 1,
            }),
        );
        let judge = Arc::new(Scripted::new("Correct"));
        let engine = EvalEngine::new(model.clone(), judge, config());

        let report = engine.run(&dataset(1), all(), &NoopReporter).await.unwrap();
        assert_eq!(report.results.len(), 1);
        assert!(report.failed.is_empty());
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn model_failure_recorded() {
        let model = Arc::new(Scripted::new("").failing(u32::MAX, || {
            ProviderError::ModelNotFound("nope".into())
        }));
        let judge = Arc::new(Scripted::new("Correct"));
        let engine = EvalEngine::new(model.clone(), judge.clone(), config());

        let report = engine.run(&dataset(2), all(), &NoopReporter).await.unwrap();
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.summary.failed, 2);
        assert_eq!(model.calls(), 2);
        assert_eq!(judge.calls(), 0);
        assert!(report.failed[0].error.contains("model not found"));
    }

    #[tokio::test]
    async fn selection_limits_items() {
        let model = Arc::new(Scripted::new("### Answer:\nx"));
        let judge = Arc::new(Scripted::new("Correct"));
        let engine = EvalEngine::new(model.clone(), judge, config());

        let selection = RunSelection {
            partition: Partition::All,
            limit: Some(2),
        };
        let report = engine.run(&dataset(5), selection, &NoopReporter).await.unwrap();
        assert_eq!(report.results.len(), 2);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn system_prompt_and_question_sent() {
        struct Capture(Mutex<Option<CompletionRequest>>);

        #[async_trait]
        impl TextCompletionProvider for Capture {
            fn name(&self) -> &str {
                "capture"
            }
            async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<Completion> {
                *self.0.lock().unwrap() = Some(request.clone());
                Ok(Completion {
                    content: "no marker".into(),
                    model: request.model.clone(),
                    token_usage: TokenUsage::default(),
                    latency_ms: 0,
                })
            }
            fn available_models(&self) -> Vec<ModelInfo> {
                vec![]
            }
        }

        let capture = Arc::new(Capture(Mutex::new(None)));
        let engine = EvalEngine::new(capture.clone(), Arc::new(Scripted::new("Correct")), config());
        let data = dataset(1);
        engine.evaluate_case(&data.items()[0]).await;

        let request = capture.0.lock().unwrap().clone().unwrap();
        assert_eq!(request.system_prompt.as_deref(), Some("You are a professional doctor"));
        assert!(request.prompt.contains("Patient 0 presents with symptoms."));
        assert_eq!(request.model, "test-model");
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_capped() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result: Result<(), &str> = with_retries(
            3,
            Duration::from_secs(40),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom") }
            },
            |_| RetryDecision::Retry { after: None },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 40s + 60s + 60s
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(160));
        assert!(elapsed < Duration::from_secs(161));
    }
}

//! The `medrbench run` command.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use medrbench_core::dataset::Partition;
use medrbench_core::engine::{EvalEngine, EvalEngineConfig, ProgressReporter, RunSelection};
use medrbench_core::judge::JudgeSettings;
use medrbench_core::prompts::JudgeTemplates;
use medrbench_core::report::EvalReport;
use medrbench_core::results::CaseOutcome;
use medrbench_core::traits::TextCompletionProvider;
use medrbench_providers::config::load_config_from;
use medrbench_providers::{create_judge, create_named_provider};
use medrbench_report::write_html_report;

use super::DatasetArgs;

/// Flags for `medrbench run`; unset values come from the config file.
pub struct RunArgs {
    pub dataset: DatasetArgs,
    pub partition: Option<String>,
    pub limit: Option<usize>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub judge_model: Option<String>,
    pub judge_base_url: Option<String>,
    pub system_prompt: Option<String>,
    pub parallelism: Option<usize>,
    pub temperature: Option<f64>,
    pub output: Option<PathBuf>,
    pub format: String,
}

/// Console progress reporter.
#[derive(Default)]
struct ConsoleReporter {
    total: AtomicUsize,
    done: AtomicUsize,
}

impl ProgressReporter for ConsoleReporter {
    fn on_run_start(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
    }

    fn on_case_complete(&self, outcome: &CaseOutcome) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.total.load(Ordering::Relaxed);
        let status = match outcome {
            CaseOutcome::Scored(case) if !case.result.parsed_answer.extraction_succeeded => {
                "no answer".to_string()
            }
            CaseOutcome::Scored(case) if case.result.is_correct() => "correct".to_string(),
            CaseOutcome::Scored(_) => "incorrect".to_string(),
            CaseOutcome::Unjudged(case) => format!("UNJUDGED: {}", case.reason),
            CaseOutcome::Failed(case) => format!("FAILED: {}", case.error),
        };
        eprintln!("  [{done}/{total}] {} {status}", outcome.case_id());
    }

    fn on_run_complete(
        &self,
        total: usize,
        scored: usize,
        unjudged: usize,
        failed: usize,
        elapsed: Duration,
    ) {
        eprintln!(
            "\nComplete: {scored}/{total} scored, {unjudged} unjudged, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Html,
}

fn parse_formats(format: &str) -> Result<Vec<OutputFormat>> {
    if format == "all" {
        return Ok(vec![OutputFormat::Json, OutputFormat::Html]);
    }
    format
        .split(',')
        .map(|f| match f.trim() {
            "json" => Ok(OutputFormat::Json),
            "html" => Ok(OutputFormat::Html),
            other => Err(anyhow::anyhow!("unknown output format: '{other}'")),
        })
        .collect()
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let mut config = load_config_from(args.dataset.config.as_deref())?;
    if let Some(url) = args.judge_base_url {
        config.judge.base_url = Some(url);
    }
    tracing::debug!(?config, "resolved configuration");

    // Validate inputs
    let parallelism = args.parallelism.unwrap_or(config.parallelism);
    anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");
    let temperature = args.temperature.unwrap_or(config.temperature);
    anyhow::ensure!(
        (0.0..=2.0).contains(&temperature),
        "temperature must be between 0.0 and 2.0"
    );
    let partition = match &args.partition {
        Some(p) => p.parse::<Partition>().map_err(anyhow::Error::msg)?,
        None => config.dataset.partition,
    };
    let formats = parse_formats(&args.format)?;

    let system_prompt = args
        .system_prompt
        .unwrap_or_else(|| config.system_prompt.clone());
    let dataset = args.dataset.assemble(&config, system_prompt).await?;

    // Create providers
    let provider_name = args
        .provider
        .unwrap_or_else(|| config.default_provider.clone());
    let model_provider: Arc<dyn TextCompletionProvider> =
        Arc::from(create_named_provider(&config, &provider_name)?);
    let judge_provider: Arc<dyn TextCompletionProvider> = Arc::from(create_judge(&config)?);

    let templates = JudgeTemplates::load(
        config.judge_templates.diagnosis.as_deref(),
        config.judge_templates.treatment.as_deref(),
    )?;

    let engine_config = EvalEngineConfig {
        parallelism,
        model: args.model.unwrap_or_else(|| config.default_model.clone()),
        temperature,
        max_tokens: config.max_tokens,
        judge: JudgeSettings {
            model: args
                .judge_model
                .unwrap_or_else(|| config.judge.model.clone()),
            temperature: config.judge.temperature,
            max_tokens: config.judge.max_tokens,
        },
        max_retries: config.max_retries,
        retry_delay: Duration::from_millis(config.retry_delay_ms),
        abort_on_judge_error: config.judge.abort_on_error,
    };

    let selection = RunSelection {
        partition,
        limit: args.limit,
    };
    let selected = dataset
        .partition(partition)
        .count()
        .min(args.limit.unwrap_or(usize::MAX));

    eprintln!(
        "medrbench v{} | {} {} cases | model {}/{} | judge {}",
        env!("CARGO_PKG_VERSION"),
        selected,
        partition,
        provider_name,
        engine_config.model,
        engine_config.judge.model,
    );
    eprintln!();

    let engine =
        EvalEngine::new(model_provider, judge_provider, engine_config).with_templates(templates);
    let reporter = ConsoleReporter::default();
    let report = engine.run(&dataset, selection, &reporter).await?;

    // Print summary table
    print_summary(&report);

    // Save outputs
    let output = args.output.unwrap_or_else(|| config.output_dir.clone());
    std::fs::create_dir_all(&output)?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");

    for fmt in formats {
        match fmt {
            OutputFormat::Json => {
                let path = output.join(format!("report-{timestamp}.json"));
                report.save_json(&path)?;
                eprintln!("Results saved to: {}", path.display());
            }
            OutputFormat::Html => {
                let path = output.join(format!("report-{timestamp}.html"));
                write_html_report(&report, &path)?;
                eprintln!("HTML report: {}", path.display());
            }
        }
    }

    Ok(())
}

fn print_summary(report: &EvalReport) {
    use comfy_table::{Cell, Table};

    let summary = &report.summary;
    let mut table = Table::new();
    table.set_header(vec!["Slice", "Accuracy", "Correct", "Scored"]);

    let mut row = |label: String, acc: &medrbench_core::statistics::Accuracy| {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(format!("{:.1}%", acc.rate() * 100.0)),
            Cell::new(acc.correct),
            Cell::new(acc.scored),
        ]);
    };

    row("overall".to_string(), &summary.overall);
    for (category, acc) in &summary.per_category {
        row(category.to_string(), acc);
    }
    row("rare disease".to_string(), &summary.rare_disease);
    row("common disease".to_string(), &summary.common_disease);

    eprintln!("\n{table}");
    eprintln!(
        "No answer: {} | Unjudged: {} | Failed: {} | Tokens: {} | Est. cost: ${:.4}",
        summary.no_answer,
        summary.unjudged,
        summary.failed,
        report.token_usage.total_tokens,
        report.token_usage.estimated_cost_usd,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_parse() {
        use OutputFormat::*;
        assert_eq!(parse_formats("json").unwrap(), vec![Json]);
        assert_eq!(parse_formats("json, html").unwrap(), vec![Json, Html]);
        assert_eq!(parse_formats("all").unwrap(), vec![Json, Html]);
        assert!(parse_formats("sarif").is_err());
    }
}

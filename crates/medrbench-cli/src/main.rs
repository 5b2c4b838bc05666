//! medrbench CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::filter::{Directive, LevelFilter};

mod commands;

use commands::DatasetArgs;

#[derive(Parser)]
#[command(
    name = "medrbench",
    version,
    about = "Clinical-reasoning eval harness for MedRBench"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the model under test over a dataset and judge its answers
    Run {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Partition to evaluate: train, eval, all (default: from config)
        #[arg(long)]
        partition: Option<String>,

        /// Evaluate only the first N selected cases
        #[arg(long)]
        limit: Option<usize>,

        /// Model under test (default: from config)
        #[arg(long)]
        model: Option<String>,

        /// Configured provider serving the model (default: from config)
        #[arg(long)]
        provider: Option<String>,

        /// Judge model (default: from config)
        #[arg(long)]
        judge_model: Option<String>,

        /// OpenAI-compatible endpoint for the judge
        #[arg(long)]
        judge_base_url: Option<String>,

        /// Role instruction for the model under test
        #[arg(long)]
        system_prompt: Option<String>,

        /// Max concurrent cases
        #[arg(long)]
        parallelism: Option<usize>,

        /// Generation temperature
        #[arg(long)]
        temperature: Option<f64>,

        /// Output directory
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: json, html, all
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Show dataset sizes for a configuration
    Inspect {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Export assembled cases as JSON lines
    Export {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Partition to export: train, eval, all
        #[arg(long, default_value = "all")]
        partition: String,

        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Compare two eval reports
    Compare {
        /// Baseline report JSON
        #[arg(long)]
        baseline: PathBuf,

        /// Current report JSON
        #[arg(long)]
        current: PathBuf,

        /// Exit code 1 if regressions found
        #[arg(long)]
        fail_on_regression: bool,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter config
    Init,
}

#[tokio::main]
async fn main() {
    let directive: Directive = "medrbench=info"
        .parse()
        .unwrap_or_else(|_| LevelFilter::INFO.into());
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            dataset,
            partition,
            limit,
            model,
            provider,
            judge_model,
            judge_base_url,
            system_prompt,
            parallelism,
            temperature,
            output,
            format,
        } => {
            commands::run::execute(commands::run::RunArgs {
                dataset,
                partition,
                limit,
                model,
                provider,
                judge_model,
                judge_base_url,
                system_prompt,
                parallelism,
                temperature,
                output,
                format,
            })
            .await
        }
        Commands::Inspect { dataset, format } => commands::inspect::execute(dataset, format).await,
        Commands::Export {
            dataset,
            partition,
            output,
        } => commands::export::execute(dataset, partition, output).await,
        Commands::Compare {
            baseline,
            current,
            fail_on_regression,
            format,
        } => commands::compare::execute(baseline, current, fail_on_regression, format),
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config).await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

//! The `medrbench init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    let path = std::path::Path::new("medrbench.toml");
    if path.exists() {
        println!("medrbench.toml already exists, skipping.");
    } else {
        std::fs::write(path, SAMPLE_CONFIG)?;
        println!("Created medrbench.toml");
    }

    println!("\nNext steps:");
    println!("  1. Set OPENAI_API_KEY or edit medrbench.toml with your API keys");
    println!("  2. Run: medrbench inspect --split all");
    println!("  3. Run: medrbench run --split diagnosis --limit 10");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# medrbench configuration

default_provider = "openai"
default_model = "gpt-4o-mini"
temperature = 0.0
max_tokens = 4096
parallelism = 4
max_retries = 3
retry_delay_ms = 1000
output_dir = "./medrbench-results"
system_prompt = "You are a professional doctor"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

[judge]
model = "gpt-4o"
provider = "openai"
temperature = 0.0
max_tokens = 1024
abort_on_error = false

[dataset]
split = "all"
rare_disease_only = false
eval_full = false
partition = "eval"
cache_dir = "~/.cache/medrbench"

# Replace the built-in judge prompts.
# [judge_templates]
# diagnosis = "prompts/diagnosis_judge.txt"
# treatment = "prompts/treatment_judge.txt"
"#;

//! Configuration loading and provider factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use medrbench_core::dataset::Partition;
use medrbench_core::model::Split;
use medrbench_core::prompts::DEFAULT_SYSTEM_PROMPT;
use medrbench_core::traits::TextCompletionProvider;

use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

/// Configuration for a single LLM provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        #[serde(default)]
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &mask(api_key))
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

fn mask(key: &str) -> &'static str {
    if key.is_empty() {
        ""
    } else {
        "***"
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Judge model settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub model: String,
    /// Name of a configured provider to reuse for judging.
    pub provider: Option<String>,
    /// OpenAI-compatible endpoint dedicated to the judge.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Fail the whole run when a case cannot be judged.
    pub abort_on_error: bool,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            provider: None,
            base_url: None,
            api_key: None,
            temperature: 0.0,
            max_tokens: 1024,
            abort_on_error: false,
        }
    }
}

impl std::fmt::Debug for JudgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JudgeConfig")
            .field("model", &self.model)
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_deref().map(mask))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("abort_on_error", &self.abort_on_error)
            .finish()
    }
}

/// Dataset selection and source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub split: Split,
    pub rare_disease_only: bool,
    pub eval_full: bool,
    pub partition: Partition,
    /// Where fetched upstream files are cached. `~` expands to `$HOME`.
    pub cache_dir: PathBuf,
    /// Override the upstream diagnosis file URL.
    pub diagnosis_url: Option<String>,
    /// Override the upstream treatment file URL.
    pub treatment_url: Option<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            split: Split::All,
            rare_disease_only: false,
            eval_full: false,
            partition: Partition::Eval,
            cache_dir: PathBuf::from("~/.cache/medrbench"),
            diagnosis_url: None,
            treatment_url: None,
        }
    }
}

impl DatasetConfig {
    /// `cache_dir` with a leading `~` expanded.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        expand_home(&self.cache_dir)
    }
}

/// Optional judge template overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JudgeTemplatePaths {
    #[serde(default)]
    pub diagnosis: Option<PathBuf>,
    #[serde(default)]
    pub treatment: Option<PathBuf>,
}

/// Top-level medrbench configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedrbenchConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Provider serving the model under test.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Model under test.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Generation temperature (0.0 for deterministic evals).
    #[serde(default, alias = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Max retries on provider errors.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Max concurrent cases.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Output directory for reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Role instruction sent to the model under test.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub judge_templates: JudgeTemplatePaths,
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_parallelism() -> usize {
    4
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./medrbench-results")
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for MedrbenchConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            parallelism: default_parallelism(),
            output_dir: default_output_dir(),
            system_prompt: default_system_prompt(),
            judge: JudgeConfig::default(),
            dataset: DatasetConfig::default(),
            judge_templates: JudgeTemplatePaths::default(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Substituted values are copied verbatim and never rescanned.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + 2 + len];
        result.push_str(&rest[..start]);
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + 2 + len + 1..];
    }
    result.push_str(rest);
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
            org_id: org_id.as_deref().map(resolve_env_vars),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(rest),
        Err(_) => PathBuf::from(".medrbench-cache"),
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `medrbench.toml` in the current directory
/// 2. `~/.config/medrbench/config.toml`
///
/// Environment variable overrides: `MEDRBENCH_OPENAI_KEY`, `MEDRBENCH_JUDGE_API_KEY`.
pub fn load_config() -> Result<MedrbenchConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<MedrbenchConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("medrbench.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            tracing::debug!("loaded config from {}", path.display());
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => MedrbenchConfig::default(),
    };

    Ok(apply_env(config))
}

/// Parse a TOML config string without touching the environment.
pub fn parse_config(content: &str) -> Result<MedrbenchConfig> {
    Ok(toml::from_str::<MedrbenchConfig>(content)?)
}

/// Apply env var overrides and resolve `${VAR}` references.
fn apply_env(mut config: MedrbenchConfig) -> MedrbenchConfig {
    if let Ok(key) = std::env::var("MEDRBENCH_OPENAI_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("MEDRBENCH_JUDGE_API_KEY") {
        config.judge.api_key = Some(key);
    }

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();
    config.judge.api_key = config.judge.api_key.as_deref().map(resolve_env_vars);
    config.judge.base_url = config.judge.base_url.as_deref().map(resolve_env_vars);

    config
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("medrbench"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn TextCompletionProvider>> {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Ok(Box::new(OpenAiProvider::new(
            api_key,
            base_url.clone(),
            org_id.clone(),
        )?)),
        ProviderConfig::Ollama { base_url } => Ok(Box::new(OllamaProvider::new(base_url)?)),
    }
}

/// Look up a named provider and build it.
pub fn create_named_provider(
    config: &MedrbenchConfig,
    name: &str,
) -> Result<Box<dyn TextCompletionProvider>> {
    let provider_config = config.providers.get(name).with_context(|| {
        format!("provider '{name}' not configured. Run `medrbench init` to create a config file")
    })?;
    create_provider(provider_config)
}

/// Build the judge provider.
///
/// A dedicated `judge.base_url` wins, then a named `judge.provider`, then
/// the configured `openai` provider, then the public OpenAI endpoint. The
/// key falls back to `OPENAI_API_KEY` when none is configured.
pub fn create_judge(config: &MedrbenchConfig) -> Result<Box<dyn TextCompletionProvider>> {
    let judge = &config.judge;

    if judge.base_url.is_none() {
        if let Some(name) = &judge.provider {
            return create_named_provider(config, name);
        }
        if judge.api_key.is_none() {
            if let Some(openai) = config.providers.get("openai") {
                return create_provider(openai);
            }
        }
    }

    let api_key = judge
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_default();
    if api_key.is_empty() && judge.base_url.is_none() {
        anyhow::bail!(
            "no judge API key: set judge.api_key, MEDRBENCH_JUDGE_API_KEY or OPENAI_API_KEY"
        );
    }

    Ok(Box::new(OpenAiProvider::new(
        &api_key,
        judge.base_url.clone(),
        None,
    )?))
}

//! Subcommand implementations.

pub mod compare;
pub mod export;
pub mod init;
pub mod inspect;
pub mod list_models;
pub mod run;

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use medrbench_core::dataset::{AssembledDataset, AssemblyOptions, DatasetAssembler};
use medrbench_core::model::{Category, Split};
use medrbench_data::DataLoader;
use medrbench_providers::MedrbenchConfig;

/// Dataset selection flags shared by `run`, `inspect` and `export`.
#[derive(Args, Debug, Clone, Default)]
pub struct DatasetArgs {
    /// Dataset split: diagnosis, treatment, all (default: from config)
    #[arg(long)]
    pub split: Option<String>,

    /// Keep only cases flagged as rare diseases
    #[arg(long)]
    pub rare_disease_only: bool,

    /// Tag every case for eval instead of holding out every fifth
    #[arg(long)]
    pub eval_full: bool,

    /// Local diagnosis case file instead of the upstream URL
    #[arg(long)]
    pub diagnosis_data: Option<PathBuf>,

    /// Local treatment case file instead of the upstream URL
    #[arg(long)]
    pub treatment_data: Option<PathBuf>,

    /// Fetch upstream files again even if cached
    #[arg(long)]
    pub refresh: bool,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl DatasetArgs {
    /// Resolve assembly options, with flags taking precedence over config.
    ///
    /// The split name is validated here, before any data is loaded.
    pub fn assembly_options(
        &self,
        config: &MedrbenchConfig,
        system_prompt: String,
    ) -> Result<AssemblyOptions> {
        let split = match &self.split {
            Some(name) => name.parse::<Split>()?,
            None => config.dataset.split,
        };
        Ok(AssemblyOptions {
            split,
            rare_disease_only: self.rare_disease_only || config.dataset.rare_disease_only,
            eval_full: self.eval_full || config.dataset.eval_full,
            system_prompt,
        })
    }

    fn loader(&self, config: &MedrbenchConfig) -> Result<DataLoader> {
        let dataset = &config.dataset;
        let mut loader = DataLoader::new(dataset.resolved_cache_dir())?.with_refresh(self.refresh);

        if let Some(url) = &dataset.diagnosis_url {
            loader = loader.with_url(Category::Diagnosis, url.clone());
        }
        if let Some(url) = &dataset.treatment_url {
            loader = loader.with_url(Category::Treatment, url.clone());
        }
        if let Some(path) = &self.diagnosis_data {
            loader = loader.with_file(Category::Diagnosis, path);
        }
        if let Some(path) = &self.treatment_data {
            loader = loader.with_file(Category::Treatment, path);
        }
        Ok(loader)
    }

    /// Load the needed categories and assemble them.
    pub async fn assemble(
        &self,
        config: &MedrbenchConfig,
        system_prompt: String,
    ) -> Result<AssembledDataset> {
        let options = self.assembly_options(config, system_prompt)?;
        let raw = self.loader(config)?.load(options.split).await?;
        Ok(DatasetAssembler::new(options).assemble(&raw)?)
    }
}

//! Dataset assembly: split selection, rare-disease filtering and the
//! deterministic train/eval partition.
//!
//! The partition is a pure function of a case's position within its
//! category's filtered sequence: position `i` is held out for eval when
//! `i % EVAL_STRIDE == 0`. Each category therefore contributes
//! `ceil(n / 5)` eval cases (diagnosis 957 → 765/192, treatment 496 →
//! 396/100), independent of process, platform or run.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::DatasetError;
use crate::model::{CaseRecord, Category, EvaluationItem, Split, SplitTag};
use crate::normalize::{normalize, RawCaseEntry};
use crate::prompts::{format_question, DEFAULT_SYSTEM_PROMPT};

/// Every fifth case (starting with the first) is held out for eval.
pub const EVAL_STRIDE: usize = 5;

/// Partition tag for the case at `index` within its category.
pub fn partition_tag(index: usize) -> SplitTag {
    if index % EVAL_STRIDE == 0 {
        SplitTag::Eval
    } else {
        SplitTag::Train
    }
}

/// Options controlling dataset assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyOptions {
    pub split: Split,
    pub rare_disease_only: bool,
    pub eval_full: bool,
    pub system_prompt: String,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            split: Split::All,
            rare_disease_only: false,
            eval_full: false,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Which tagged items to select from an assembled dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Train,
    Eval,
    All,
}

impl Partition {
    pub fn contains(&self, tag: SplitTag) -> bool {
        match self {
            Partition::Train => tag == SplitTag::Train,
            Partition::Eval => tag == SplitTag::Eval,
            Partition::All => true,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Train => write!(f, "train"),
            Partition::Eval => write!(f, "eval"),
            Partition::All => write!(f, "all"),
        }
    }
}

impl FromStr for Partition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "train" => Ok(Partition::Train),
            "eval" | "test" => Ok(Partition::Eval),
            "all" => Ok(Partition::All),
            other => Err(format!("unknown partition: {other}")),
        }
    }
}

/// Builds the evaluation sequence for one configuration.
pub struct DatasetAssembler {
    options: AssemblyOptions,
}

impl DatasetAssembler {
    pub fn new(options: AssemblyOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AssemblyOptions {
        &self.options
    }

    /// Normalize, filter and partition raw entries.
    ///
    /// Malformed and duplicate records are skipped and counted. Categories
    /// are emitted in [`Split::categories`] order, each in input order.
    pub fn assemble(&self, raw_entries: &[RawCaseEntry]) -> Result<AssembledDataset, DatasetError> {
        let options = &self.options;
        let mut by_category: HashMap<Category, Vec<CaseRecord>> = HashMap::new();
        let mut seen = HashSet::new();
        let mut malformed = 0usize;
        let mut duplicates = 0usize;

        for raw in raw_entries {
            let case = match normalize(raw) {
                Ok(case) => case,
                Err(e) => {
                    tracing::warn!("skipping record: {e}");
                    malformed += 1;
                    continue;
                }
            };
            if !options.split.includes(case.category) {
                continue;
            }
            if !seen.insert(case.case_id.clone()) {
                tracing::warn!("skipping duplicate case {}", case.case_id);
                duplicates += 1;
                continue;
            }
            by_category.entry(case.category).or_default().push(case);
        }

        let mut items = Vec::new();
        let mut counts = Vec::new();

        for &category in options.split.categories() {
            let cases = by_category.remove(&category).unwrap_or_default();
            let total = cases.len();
            let retained: Vec<CaseRecord> = cases
                .into_iter()
                .filter(|c| !options.rare_disease_only || c.is_rare_disease)
                .collect();

            let mut category_counts = CategoryCounts {
                category,
                source_total: total,
                retained: retained.len(),
                train: 0,
                eval: 0,
            };

            for (index, case) in retained.into_iter().enumerate() {
                let split_tag = if options.eval_full {
                    SplitTag::Eval
                } else {
                    partition_tag(index)
                };
                match split_tag {
                    SplitTag::Train => category_counts.train += 1,
                    SplitTag::Eval => category_counts.eval += 1,
                }
                let formatted_question = format_question(category, &case.case_summary);
                items.push(EvaluationItem {
                    case: Arc::new(case),
                    system_prompt: options.system_prompt.clone(),
                    formatted_question,
                    split_tag,
                });
            }
            counts.push(category_counts);
        }

        if items.is_empty() {
            return Err(DatasetError::EmptyDataset {
                split: options.split,
                rare_disease_only: options.rare_disease_only,
            });
        }

        let summary = DatasetSummary {
            split: options.split,
            rare_disease_only: options.rare_disease_only,
            eval_full: options.eval_full,
            categories: counts,
            malformed,
            duplicates,
        };
        tracing::info!(
            "assembled {} cases (train {}, eval {}, skipped {})",
            summary.retained(),
            summary.train(),
            summary.eval(),
            summary.skipped()
        );

        Ok(AssembledDataset { items, summary })
    }
}

/// Assemble with a split given by name.
///
/// The split is validated before any record is looked at.
pub fn assemble(
    raw_entries: &[RawCaseEntry],
    split: &str,
    rare_disease_only: bool,
    eval_full: bool,
) -> Result<AssembledDataset, DatasetError> {
    let split: Split = split.parse()?;
    DatasetAssembler::new(AssemblyOptions {
        split,
        rare_disease_only,
        eval_full,
        ..AssemblyOptions::default()
    })
    .assemble(raw_entries)
}

/// The read-only result of assembly; safe to share across workers.
#[derive(Debug, Clone)]
pub struct AssembledDataset {
    items: Vec<EvaluationItem>,
    summary: DatasetSummary,
}

impl AssembledDataset {
    pub fn items(&self) -> &[EvaluationItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<EvaluationItem> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn train(&self) -> impl Iterator<Item = &EvaluationItem> {
        self.partition(Partition::Train)
    }

    pub fn eval(&self) -> impl Iterator<Item = &EvaluationItem> {
        self.partition(Partition::Eval)
    }

    pub fn partition(&self, partition: Partition) -> impl Iterator<Item = &EvaluationItem> {
        self.items
            .iter()
            .filter(move |item| partition.contains(item.split_tag))
    }

    /// Records that failed normalization or repeated an earlier id.
    pub fn skipped(&self) -> usize {
        self.summary.skipped()
    }

    pub fn summary(&self) -> &DatasetSummary {
        &self.summary
    }
}

/// Per-category sizes of an assembled dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub category: Category,
    /// Well-formed cases before the rare-disease filter.
    pub source_total: usize,
    pub retained: usize,
    pub train: usize,
    pub eval: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub split: Split,
    pub rare_disease_only: bool,
    pub eval_full: bool,
    pub categories: Vec<CategoryCounts>,
    pub malformed: usize,
    pub duplicates: usize,
}

impl DatasetSummary {
    pub fn retained(&self) -> usize {
        self.categories.iter().map(|c| c.retained).sum()
    }

    pub fn train(&self) -> usize {
        self.categories.iter().map(|c| c.train).sum()
    }

    pub fn eval(&self) -> usize {
        self.categories.iter().map(|c| c.eval).sum()
    }

    pub fn skipped(&self) -> usize {
        self.malformed + self.duplicates
    }

    pub fn category(&self, category: Category) -> Option<&CategoryCounts> {
        self.categories.iter().find(|c| c.category == category)
    }
}

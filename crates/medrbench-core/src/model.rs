//! Core data model types for medrbench.
//!
//! These are the fundamental types that flow through the evaluation
//! pipeline: clinical cases, the items presented to a model, and the
//! parsed answers, verdicts and scored results derived from them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

/// The two kinds of clinical task in the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Diagnosis,
    Treatment,
}

impl Category {
    /// Both categories in assembly order.
    pub const ALL: [Category; 2] = [Category::Diagnosis, Category::Treatment];

    /// Task name attached to exported harness records.
    pub fn task_name(&self) -> &'static str {
        match self {
            Category::Diagnosis => "medrbench-diagnosis",
            Category::Treatment => "medrbench-treatment",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Diagnosis => write!(f, "diagnosis"),
            Category::Treatment => write!(f, "treatment"),
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "diagnosis" | "medrbench-diagnosis" => Ok(Category::Diagnosis),
            "treatment" | "medrbench-treatment" => Ok(Category::Treatment),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// Which categories a dataset split includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Diagnosis,
    Treatment,
    All,
}

impl Split {
    /// Categories selected by this split, in assembly order.
    pub fn categories(&self) -> &'static [Category] {
        match self {
            Split::Diagnosis => &[Category::Diagnosis],
            Split::Treatment => &[Category::Treatment],
            Split::All => &Category::ALL,
        }
    }

    pub fn includes(&self, category: Category) -> bool {
        self.categories().contains(&category)
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Diagnosis => write!(f, "diagnosis"),
            Split::Treatment => write!(f, "treatment"),
            Split::All => write!(f, "all"),
        }
    }
}

impl FromStr for Split {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "diagnosis" => Ok(Split::Diagnosis),
            "treatment" => Ok(Split::Treatment),
            "all" => Ok(Split::All),
            other => Err(DatasetError::InvalidSplit(other.to_string())),
        }
    }
}

/// Train/eval partition tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitTag {
    Train,
    Eval,
}

impl fmt::Display for SplitTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitTag::Train => write!(f, "train"),
            SplitTag::Eval => write!(f, "eval"),
        }
    }
}

/// One clinical case, normalized from an upstream record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Unique across categories: `"<category>/<source_id>"`.
    pub case_id: String,
    /// Upstream identifier (a PMC article id).
    pub source_id: String,
    pub category: Category,
    #[serde(default)]
    pub body_category: Vec<String>,
    #[serde(default)]
    pub disorder_category: Vec<String>,
    pub is_rare_disease: bool,
    /// The only text shown to the model under test.
    pub case_summary: String,
    /// Ground-truth diagnosis or treatment plan.
    pub reference_answer: String,
    /// Upstream fields not consumed by normalization, keyed as upstream.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl CaseRecord {
    pub fn metadata(&self) -> CaseMetadata {
        CaseMetadata {
            category: self.category,
            body_category: self.body_category.clone(),
            disorder_category: self.disorder_category.clone(),
            is_rare_disease: self.is_rare_disease,
        }
    }
}

/// A case packaged for presentation to the model under test.
#[derive(Debug, Clone)]
pub struct EvaluationItem {
    pub case: Arc<CaseRecord>,
    pub system_prompt: String,
    pub formatted_question: String,
    pub split_tag: SplitTag,
}

impl EvaluationItem {
    pub fn case_id(&self) -> &str {
        &self.case.case_id
    }

    /// The per-case view exposed to surrounding harnesses.
    pub fn to_harness_record(&self) -> HarnessRecord {
        let case = &self.case;
        HarnessRecord {
            question: self.formatted_question.clone(),
            answer: case.reference_answer.clone(),
            task: case.category.task_name().to_string(),
            split: self.split_tag,
            info: HarnessInfo {
                case_id: case.case_id.clone(),
                pmc_id: case.source_id.clone(),
                case_summary: case.case_summary.clone(),
                reference_response: case.reference_answer.clone(),
                body_category: case.body_category.clone(),
                disorder_category: case.disorder_category.clone(),
                checked_rare_disease: case.is_rare_disease,
                extra: case.metadata.clone(),
            },
        }
    }
}

/// Exported form of an [`EvaluationItem`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessRecord {
    pub question: String,
    pub answer: String,
    pub task: String,
    pub split: SplitTag,
    pub info: HarnessInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessInfo {
    pub case_id: String,
    pub pmc_id: String,
    pub case_summary: String,
    pub reference_response: String,
    pub body_category: Vec<String>,
    pub disorder_category: Vec<String>,
    pub checked_rare_disease: bool,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Answer pulled out of a model completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAnswer {
    pub extracted_text: String,
    pub extraction_succeeded: bool,
}

impl ParsedAnswer {
    pub fn missing() -> Self {
        Self {
            extracted_text: String::new(),
            extraction_succeeded: false,
        }
    }
}

/// The judge's free-text response and its binary interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub raw_judge_text: String,
    pub is_correct: bool,
}

/// Case attributes carried into results for breakdowns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseMetadata {
    pub category: Category,
    pub body_category: Vec<String>,
    pub disorder_category: Vec<String>,
    pub is_rare_disease: bool,
}

/// Final per-case outcome of a judged (or unanswerable) case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub case_id: String,
    /// Always 0.0 or 1.0.
    pub reward: f64,
    pub parsed_answer: ParsedAnswer,
    /// `None` when the completion had no answer marker and was never judged.
    pub judge_verdict: Option<JudgeVerdict>,
    pub metadata: CaseMetadata,
    pub split_tag: SplitTag,
}

impl ScoredResult {
    pub fn is_correct(&self) -> bool {
        self.reward >= 1.0
    }
}

//! Prompt assets and `{slot}` template rendering.
//!
//! The task and judge prompts are the upstream MedRBench instructions,
//! shipped as text assets under `prompts/`. Templates are treated as opaque
//! format strings: `{name}` is replaced by the value bound to `name`, and
//! `{{` / `}}` produce literal braces.

use std::path::Path;

use anyhow::{Context, Result};

use crate::error::TemplateError;
use crate::model::Category;

/// Default role instruction for the model under test.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional doctor";

pub const DIAGNOSIS_TASK_PROMPT: &str = include_str!("../prompts/diagnosis_task.txt");
pub const TREATMENT_TASK_PROMPT: &str = include_str!("../prompts/treatment_task.txt");
pub const DIAGNOSIS_JUDGE_PROMPT: &str = include_str!("../prompts/diagnosis_judge.txt");
pub const TREATMENT_JUDGE_PROMPT: &str = include_str!("../prompts/treatment_judge.txt");

/// Filler for the treatment judge's web-search slot, which is not used.
pub const NO_ADDITIONAL_INFO: &str = "No additional information available.";

/// Task template shown to the model under test for a category.
pub fn task_template(category: Category) -> &'static str {
    match category {
        Category::Diagnosis => DIAGNOSIS_TASK_PROMPT,
        Category::Treatment => TREATMENT_TASK_PROMPT,
    }
}

/// Render the task question for a case summary.
///
/// The task templates carry a single `{case}` slot and no other braces.
pub fn format_question(category: Category, case_summary: &str) -> String {
    task_template(category).replacen("{case}", case_summary, 1)
}

/// One judge template per category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeTemplates {
    pub diagnosis: String,
    pub treatment: String,
}

impl Default for JudgeTemplates {
    fn default() -> Self {
        Self {
            diagnosis: DIAGNOSIS_JUDGE_PROMPT.to_string(),
            treatment: TREATMENT_JUDGE_PROMPT.to_string(),
        }
    }
}

impl JudgeTemplates {
    /// Load templates from files, falling back to the built-in prompt for
    /// any category without a path.
    pub fn load(diagnosis: Option<&Path>, treatment: Option<&Path>) -> Result<Self> {
        let read = |path: &Path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read judge template: {}", path.display()))
        };
        let defaults = Self::default();
        Ok(Self {
            diagnosis: diagnosis.map(read).transpose()?.unwrap_or(defaults.diagnosis),
            treatment: treatment.map(read).transpose()?.unwrap_or(defaults.treatment),
        })
    }

    pub fn for_category(&self, category: Category) -> &str {
        match category {
            Category::Diagnosis => &self.diagnosis,
            Category::Treatment => &self.treatment,
        }
    }
}

/// Substitute named slots into a template.
///
/// Every `{slot}` in the template must be bound; bindings the template
/// does not use are ignored.
pub fn render_template(template: &str, slots: &[(&str, &str)]) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0usize;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
            offset += pos + 2;
            continue;
        }
        if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
            offset += pos + 2;
            continue;
        }
        if tail.starts_with('}') {
            return Err(TemplateError::UnbalancedBrace(offset + pos));
        }

        let Some(close) = tail.find('}') else {
            return Err(TemplateError::UnbalancedBrace(offset + pos));
        };
        let name = &tail[1..close];
        if name.contains('{') {
            return Err(TemplateError::UnbalancedBrace(offset + pos));
        }
        let value = slots
            .iter()
            .find(|(slot, _)| *slot == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| TemplateError::UnknownSlot(name.to_string()))?;
        out.push_str(value);

        rest = &tail[close + 1..];
        offset += pos + close + 1;
    }
    out.push_str(rest);

    Ok(out)
}

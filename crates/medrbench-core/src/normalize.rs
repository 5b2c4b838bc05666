//! Normalization of raw upstream entries into [`CaseRecord`]s.
//!
//! Upstream MedRBench files are JSON objects keyed by PMC id. Each value
//! holds the category labels at the top level and the case text in a
//! nested `generate_case` object. Field lookup tolerates key casing and
//! separator differences and searches both levels; anything not consumed is
//! kept in `CaseRecord::metadata`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MalformedRecordError;
use crate::model::{CaseRecord, Category};

const NESTED_KEY: &str = "generate_case";

/// One upstream entry before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCaseEntry {
    /// Upstream key (the PMC id). May be empty if the value carries an id.
    pub source_id: String,
    pub value: Value,
}

impl RawCaseEntry {
    pub fn new(source_id: impl Into<String>, value: Value) -> Self {
        Self {
            source_id: source_id.into(),
            value,
        }
    }

    /// Tag the entry with the category of the file it came from, unless the
    /// entry already names one.
    pub fn with_category(mut self, category: Category) -> Self {
        if let Value::Object(map) = &mut self.value {
            if find_key(map, "category").is_none() {
                map.insert("category".into(), Value::String(category.to_string()));
            }
        }
        self
    }

    /// Split an upstream id-keyed object into entries, preserving key order.
    pub fn from_keyed_object(object: Map<String, Value>, category: Category) -> Vec<Self> {
        object
            .into_iter()
            .map(|(id, value)| Self::new(id, value).with_category(category))
            .collect()
    }
}

/// Normalize one raw entry.
pub fn normalize(raw: &RawCaseEntry) -> Result<CaseRecord, MalformedRecordError> {
    let Value::Object(top) = &raw.value else {
        return Err(MalformedRecordError::NotAnObject {
            source_id: raw.source_id.clone(),
        });
    };
    let nested = find_key(top, NESTED_KEY).and_then(|k| top[k].as_object());
    let mut fields = Fields {
        top,
        nested,
        consumed_top: BTreeSet::new(),
        consumed_nested: BTreeSet::new(),
    };

    let source_id = if raw.source_id.trim().is_empty() {
        fields
            .string(&["pmc_id", "case_id", "id"])
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| MalformedRecordError::MissingField {
                source_id: String::new(),
                field: "case_id",
            })?
    } else {
        raw.source_id.trim().to_string()
    };

    let category_value = fields.required(&source_id, "category", &["category", "task"])?;
    let category: Category =
        category_value
            .parse()
            .map_err(|_| MalformedRecordError::InvalidCategory {
                source_id: source_id.clone(),
                value: category_value.clone(),
            })?;

    let case_summary = fields.required(&source_id, "case_summary", &["case_summary"])?;

    let reference_keys: &[&str] = match category {
        Category::Diagnosis => &["reference_answer", "diagnosis_results"],
        Category::Treatment => &["reference_answer", "treatment_plan_results"],
    };
    let reference_answer = fields.required(&source_id, "reference_answer", reference_keys)?;

    let body_category = fields.labels("body_category");
    let disorder_category = fields.labels("disorder_category");

    let mut metadata = BTreeMap::new();
    let rare_value = fields.take(&["checked_rare_disease", "is_rare_disease"]);
    let is_rare_disease = rare_value.map(|(_, v)| is_truthy(v)).unwrap_or(false);
    if let Some((key, value)) = rare_value {
        if !value.is_boolean() {
            metadata.insert(key.to_string(), value.clone());
        }
    }

    metadata.extend(fields.leftovers());

    Ok(CaseRecord {
        case_id: format!("{category}/{source_id}"),
        source_id,
        category,
        body_category,
        disorder_category,
        is_rare_disease,
        case_summary: case_summary.trim().to_string(),
        reference_answer: reference_answer.trim().to_string(),
        metadata,
    })
}

/// Field access over the top level and the nested case object, tracking
/// which keys were consumed.
struct Fields<'a> {
    top: &'a Map<String, Value>,
    nested: Option<&'a Map<String, Value>>,
    consumed_top: BTreeSet<&'a str>,
    consumed_nested: BTreeSet<&'a str>,
}

impl<'a> Fields<'a> {
    /// First match for any of `names`, top level before nested.
    fn take(&mut self, names: &[&str]) -> Option<(&'a str, &'a Value)> {
        let top = self.top;
        for name in names {
            if let Some(key) = find_key(top, name) {
                self.consumed_top.insert(key);
                return Some((key, &top[key]));
            }
            if let Some(nested) = self.nested {
                if let Some(key) = find_key(nested, name) {
                    self.consumed_nested.insert(key);
                    return Some((key, &nested[key]));
                }
            }
        }
        None
    }

    fn string(&mut self, names: &[&str]) -> Option<&'a str> {
        self.take(names).and_then(|(_, v)| v.as_str())
    }

    fn required(
        &mut self,
        source_id: &str,
        field: &'static str,
        names: &[&str],
    ) -> Result<String, MalformedRecordError> {
        match self.take(names) {
            None | Some((_, Value::Null)) => Err(MalformedRecordError::MissingField {
                source_id: source_id.to_string(),
                field,
            }),
            Some((_, Value::String(s))) if s.trim().is_empty() => {
                Err(MalformedRecordError::EmptyField {
                    source_id: source_id.to_string(),
                    field,
                })
            }
            Some((_, Value::String(s))) => Ok(s.clone()),
            Some(_) => Err(MalformedRecordError::MissingField {
                source_id: source_id.to_string(),
                field,
            }),
        }
    }

    /// Category labels arrive either as a string or a list of strings.
    fn labels(&mut self, name: &str) -> Vec<String> {
        match self.take(&[name]) {
            Some((_, Value::String(s))) if !s.trim().is_empty() => vec![s.trim().to_string()],
            Some((_, Value::Array(items))) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    fn leftovers(&self) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for (key, value) in self.top {
            if self.consumed_top.contains(key.as_str()) {
                continue;
            }
            if self.nested.is_some() && normalize_key(key) == NESTED_KEY {
                continue;
            }
            out.insert(key.clone(), value.clone());
        }
        if let Some(nested) = self.nested {
            for (key, value) in nested {
                if self.consumed_nested.contains(key.as_str()) {
                    continue;
                }
                let name = if out.contains_key(key) {
                    format!("{NESTED_KEY}.{key}")
                } else {
                    key.clone()
                };
                out.insert(name, value.clone());
            }
        }
        out
    }
}

fn normalize_key(key: &str) -> String {
    key.trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Exact key first, then a casing/separator-insensitive match.
fn find_key<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    if let Some((key, _)) = map.get_key_value(name) {
        return Some(key.as_str());
    }
    map.keys()
        .find(|key| normalize_key(key) == name)
        .map(String::as_str)
}

/// Truthiness of a rare-disease flag: empty strings, lists and objects, zero,
/// `false` and `null` are false. Any other string is true, including "No".
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

//! Error types for the medrbench core.
//!
//! Provider errors live here rather than in `medrbench-providers` so the
//! eval engine can downcast and classify them for retry decisions without
//! string matching.

use thiserror::Error;

use crate::model::Split;

/// An upstream record that cannot be turned into a `CaseRecord`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecordError {
    #[error("record {source_id}: expected a JSON object")]
    NotAnObject { source_id: String },

    #[error("record {source_id}: missing required field `{field}`")]
    MissingField {
        source_id: String,
        field: &'static str,
    },

    #[error("record {source_id}: required field `{field}` is empty")]
    EmptyField {
        source_id: String,
        field: &'static str,
    },

    #[error("record {source_id}: unknown category `{value}`")]
    InvalidCategory { source_id: String, value: String },
}

/// Configuration errors raised before any case is processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasetError {
    #[error("invalid split: {0}. Must be 'diagnosis', 'treatment', or 'all'")]
    InvalidSplit(String),

    #[error("no cases left for split '{split}' (rare_disease_only = {rare_disease_only})")]
    EmptyDataset {
        split: Split,
        rare_disease_only: bool,
    },
}

/// Failure to substitute values into a prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template references unknown slot `{0}`")]
    UnknownSlot(String),

    #[error("unbalanced brace at byte {0}")]
    UnbalancedBrace(usize),
}

/// Errors from judge adjudication.
///
/// A judge that fails to answer is never turned into an incorrect verdict;
/// callers decide whether to retry, skip, or abort.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("judge unavailable for {case_id}: {reason}")]
    Unavailable {
        case_id: String,
        reason: String,
        /// Set when the underlying provider error cannot succeed on retry.
        permanent: bool,
    },

    #[error("failed to build judge prompt for {case_id}: {source}")]
    Template {
        case_id: String,
        #[source]
        source: TemplateError,
    },
}

impl JudgeError {
    /// Whether another judge call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JudgeError::Unavailable {
                permanent: false,
                ..
            }
        )
    }

    pub fn case_id(&self) -> &str {
        match self {
            JudgeError::Unavailable { case_id, .. } | JudgeError::Template { case_id, .. } => {
                case_id
            }
        }
    }
}

/// Errors that can occur when interacting with an LLM provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

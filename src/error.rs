//! Error taxonomy for the demand engine.

use thiserror::Error;

use crate::grid::DemandColumn;

/// Why a single raw record was dropped during ingestion.
///
/// These never abort a batch: the pipeline counts them and moves on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    /// A required field is absent, unknown, or fails to parse.
    #[error("malformed record: {field}: {reason}")]
    Malformed { field: String, reason: String },

    /// Structurally valid but semantically empty or implausible.
    #[error("degenerate session: {0}")]
    Degenerate(String),

    /// Older than the configured retention window.
    #[error("session expired: {age_days} days old (retention {retention_days} days)")]
    Expired { age_days: i64, retention_days: u32 },
}

impl RecordError {
    pub(crate) fn malformed(field: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Engine-level errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("insufficient history for {column}: need {required} rows, have {actual}")]
    InsufficientHistory {
        column: DemandColumn,
        required: usize,
        actual: usize,
    },

    #[error("no cached model parameters for \"{0}\"")]
    NoCachedParameters(String),

    #[error("artifact store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("artifact \"{0}\" not found")]
    NotFound(String),

    #[error("artifact \"{name}\" holds {found}, expected {expected}")]
    WrongArtifact {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("record source yielded no usable sessions and no prior snapshot exists")]
    EmptySource,

    #[error("config error: {0}")]
    Config(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the orchestrator may retry the whole job after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

use thiserror::Error;
use uuid::Uuid;

/// Failures of snapshot decoding and reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The document failed version or schema checks. Nothing was mutated.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// The store rejected a read, write, or the final commit. The batch is
    /// not committed; a Replace may be retried only with care.
    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] rusqlite::Error),

    /// A snapshot item broke a field invariant.
    #[error("snapshot item {index} ({id}) is invalid: {reason}")]
    ValidationFailure {
        index: usize,
        id: Uuid,
        reason: String,
    },
}

impl ReconcileError {
    /// Stable code for programmatic handling and JSON output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedSnapshot(_) => "ERR_MALFORMED_SNAPSHOT",
            Self::PersistenceFailure(_) => "ERR_PERSISTENCE_FAILURE",
            Self::ValidationFailure { .. } => "ERR_VALIDATION_FAILURE",
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedSnapshot(message.into())
    }
}

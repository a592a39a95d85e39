//! Engine Error Taxonomy
//!
//! Every fallible operation in the engine converges on [`EngineError`].
//! The `kind()` string is the stable wire-level error identifier; the tool
//! surface serializes it verbatim into `{error: {kind, message, hint?}}`.

use crate::embeddings::EmbeddingError;

/// Engine-wide error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Input rejected at the boundary (bad enum value, out-of-range number,
    /// missing required field)
    #[error("{0}")]
    Validation(String),

    /// A referenced entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A GHAP entry is already active for the session
    #[error("an active GHAP entry already exists for this session (id: {id})")]
    ActiveGhapExists {
        /// Id of the live entry
        id: String,
    },

    /// No GHAP entry is active for the session
    #[error("no active GHAP entry for this session")]
    NoActiveGhap,

    /// Not enough data to perform the operation (e.g. clustering below
    /// `min_cluster_size`)
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Vector or metadata store failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Embedding model failure
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Git repository failure
    #[error("git error: {0}")]
    Git(String),

    /// An outbound call exceeded its deadline; the fractional-second budget
    /// is reported exactly as configured
    #[error("operation timed out after {0}s")]
    Timeout(f64),

    /// Unclassified failure; logged at ERROR before surfacing
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable wire-level kind identifier
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::NotFound(_) => "not_found",
            EngineError::ActiveGhapExists { .. } => "active_ghap_exists",
            EngineError::NoActiveGhap => "no_active_ghap",
            EngineError::InsufficientData(_) => "insufficient_data",
            EngineError::Storage(_) => "storage_error",
            EngineError::Embedding(_) => "embedding_error",
            EngineError::Git(_) => "git_error",
            EngineError::Timeout(_) => "timeout",
            EngineError::Internal(_) => "internal_error",
        }
    }

    /// Actionable hint for the caller, where one exists.
    /// `internal_error` deliberately carries none.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            EngineError::Validation(_) => Some("check the parameter constraints in the tool schema"),
            EngineError::NotFound(_) => Some("the id may have been deleted or never stored"),
            EngineError::ActiveGhapExists { .. } => {
                Some("resolve or abandon the active entry before starting a new one")
            }
            EngineError::NoActiveGhap => Some("call start_ghap first"),
            EngineError::InsufficientData(_) => {
                Some("store more entries or lower min_cluster_size")
            }
            EngineError::Storage(_) => Some("the state root may be unwritable or corrupted"),
            EngineError::Embedding(_) => {
                Some("the embedding model may still be downloading; retry shortly")
            }
            EngineError::Git(_) => Some("check that the repository path exists and is readable"),
            EngineError::Timeout(_) => Some("retry, or raise the configured request timeout"),
            EngineError::Internal(_) => None,
        }
    }

    /// True for boundary errors that are reported to the caller and never
    /// logged above WARN
    pub fn is_boundary(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_)
                | EngineError::NotFound(_)
                | EngineError::ActiveGhapExists { .. }
                | EngineError::NoActiveGhap
                | EngineError::InsufficientData(_)
        )
    }
}

impl From<EmbeddingError> for EngineError {
    fn from(e: EmbeddingError) -> Self {
        EngineError::Embedding(e.to_string())
    }
}

impl From<crate::store::StoreError> for EngineError {
    fn from(e: crate::store::StoreError) -> Self {
        match e {
            crate::store::StoreError::Timeout(secs) => EngineError::Timeout(secs),
            other => EngineError::Storage(other.to_string()),
        }
    }
}

impl From<crate::metadata::MetadataError> for EngineError {
    fn from(e: crate::metadata::MetadataError) -> Self {
        EngineError::Storage(e.to_string())
    }
}

impl From<git2::Error> for EngineError {
    fn from(e: git2::Error) -> Self {
        EngineError::Git(e.message().to_string())
    }
}

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(EngineError::Validation("x".into()).kind(), "validation_error");
        assert_eq!(
            EngineError::ActiveGhapExists { id: "a".into() }.kind(),
            "active_ghap_exists"
        );
        assert_eq!(EngineError::NoActiveGhap.kind(), "no_active_ghap");
        assert_eq!(EngineError::Timeout(0.5).kind(), "timeout");
    }

    #[test]
    fn internal_error_has_no_hint() {
        assert!(EngineError::Internal("boom".into()).hint().is_none());
        assert!(EngineError::NoActiveGhap.hint().is_some());
    }

    #[test]
    fn timeout_preserves_fractional_seconds() {
        let err = EngineError::Timeout(0.25);
        assert!(err.to_string().contains("0.25"));
    }

    #[test]
    fn boundary_classification() {
        assert!(EngineError::Validation("x".into()).is_boundary());
        assert!(EngineError::NoActiveGhap.is_boundary());
        assert!(!EngineError::Storage("x".into()).is_boundary());
    }
}

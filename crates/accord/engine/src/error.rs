use accord_storage::StorageError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level failure taxonomy exposed to the transport layer.
///
/// Lost races ("someone else acted first") are not errors; those operations
/// return `false`/`None`. Authorization failures collapse into `NotFound` so
/// that neither a contract's existence nor a caller's relationship to it can
/// be probed through differing error codes.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The record does not exist, or the caller has no relationship to it.
    /// Callers cannot tell the two cases apart.
    #[error("not found")]
    NotFound,

    /// The caller has access but lacks the role the operation requires
    /// (owner-only operations invoked by a plain collaborator).
    #[error("not authorized")]
    Unauthorized,

    /// The row is not in a state that allows the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed input; `field` names the offending part of the payload.
    #[error("validation failed for `{field}`: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// The contract already carries the maximum number of approved
    /// amendments.
    #[error("amendment limit reached")]
    LimitExceeded,

    /// Self-directed actions are forbidden: self-share, self-invite,
    /// approving one's own amendment.
    #[error("self-directed action forbidden: {0}")]
    SelfActionForbidden(String),

    /// The identity directory could not be reached.
    #[error("identity directory failure: {0}")]
    Directory(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Collapse a storage `NotFound` raised by a write that follows a passed
    /// access check (the row vanished underneath us) into the uniform
    /// engine `NotFound`.
    pub(crate) fn from_gone(error: StorageError) -> EngineError {
        match error {
            StorageError::NotFound(_) => EngineError::NotFound,
            other => other.into(),
        }
    }
}

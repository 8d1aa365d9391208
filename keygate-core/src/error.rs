//! The failure taxonomy for access operations.

use crate::checkpoint::CheckpointId;

/// Every way an access operation can fail.
///
/// All failures are reported synchronously as structured results. Only
/// [`AccessError::StorageUnavailable`] is transient; every other variant is
/// terminal for that request and requires a new request with corrected
/// input.
///
/// The `Display` strings for [`AccessError::InvalidTag`] and
/// [`AccessError::CodeMismatch`] are deliberately identical and generic:
/// callers must not learn which part of a comparison failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AccessError {
    /// A required request field was absent or empty.
    #[error("missing required parameters")]
    MissingParameters,

    /// No session exists for the given id.
    #[error("session not found")]
    SessionNotFound,

    /// The presented tag did not verify. Tamper or forgery suspected.
    #[error("verification failed")]
    InvalidTag,

    /// The checkpoint id is not in the known set.
    #[error("unknown checkpoint")]
    UnknownCheckpoint,

    /// No pending verification exists for the session.
    #[error("no pending verification for this session")]
    NoPendingVerification,

    /// The submitted challenge code did not match. The client may retry.
    #[error("verification failed")]
    CodeMismatch,

    /// Issuance requires checkpoints that are not yet recorded.
    #[error("missing required checkpoints: {}", joined(.0))]
    MissingRequiredCheckpoints(Vec<CheckpointId>),

    /// No credential exists for the presented key.
    #[error("credential not found")]
    CredentialNotFound,

    /// The credential is bound to a different identity.
    #[error("identity mismatch")]
    IdentityMismatch,

    /// The credential's expiry horizon has passed.
    #[error("credential expired")]
    CredentialExpired,

    /// The credential was already redeemed.
    #[error("credential already used")]
    CredentialAlreadyUsed,

    /// The durable store could not be reached. Retryable.
    #[error("storage unavailable")]
    StorageUnavailable,
}

impl AccessError {
    /// Whether a caller may retry the same request unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable)
    }
}

fn joined(checkpoints: &[CheckpointId]) -> String {
    checkpoints
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

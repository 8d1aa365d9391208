//! Session records: a client's progress through the checkpoint set.

use keygate_auth::ClientIdentity;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkpoint::{CheckpointId, REQUIRED_CHECKPOINTS};

/// Opaque unique session identifier, generated at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a fresh random session id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a session id from its string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A completed checkpoint within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Which checkpoint was completed.
    pub checkpoint: CheckpointId,
    /// Unix seconds at completion. Never changes once recorded.
    pub completed_at: i64,
    /// Whether completion went through the code-verified gate path.
    pub verified: bool,
}

/// A client's session: identity binding plus checkpoint progress.
///
/// Sessions are never deleted; expiry is enforced at the credential, not
/// the session. `checkpoints` grows monotonically with no duplicates per
/// checkpoint id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Immutable opaque identifier.
    pub id: SessionId,
    /// Derived client fingerprint, immutable once set.
    pub identity: ClientIdentity,
    /// Creation time, Unix seconds.
    pub created_at: i64,
    /// Completed checkpoints, in completion order.
    pub checkpoints: Vec<CheckpointRecord>,
    /// True only once a credential has been issued for this session.
    pub completed: bool,
    /// Back-reference to the minted credential, if any.
    pub issued_key: Option<String>,
}

impl Session {
    /// Whether the given checkpoint has already been recorded.
    #[must_use]
    pub fn has_checkpoint(&self, checkpoint: CheckpointId) -> bool {
        self.checkpoints.iter().any(|r| r.checkpoint == checkpoint)
    }

    /// Required checkpoints not yet recorded, in declaration order.
    ///
    /// Presence is all that matters; the requirement set is unordered.
    #[must_use]
    pub fn missing_required(&self) -> Vec<CheckpointId> {
        REQUIRED_CHECKPOINTS
            .into_iter()
            .filter(|c| !self.has_checkpoint(*c))
            .collect()
    }
}

//! Process-wide pending-verification table.
//!
//! A pending verification bridges an external task-completion event to a
//! checkpoint confirmation: requesting a gate stores a short challenge
//! code here, and the client must type it back in after the external task.
//!
//! Entries are process-local and ephemeral. At most one pending
//! verification exists per session; a new gate request overwrites the
//! prior entry (last write wins). Entries expire after a fixed TTL and are
//! swept by a timer task; expired entries behave as absent on lookup, so
//! the sweep is maintenance, not correctness.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use keygate_auth::{generate_challenge_code, normalize_challenge_code, ClientIdentity};
use subtle::ConstantTimeEq;

use crate::checkpoint::CheckpointId;
use crate::error::AccessError;
use crate::session::SessionId;

/// Default pending-verification lifetime: 10 minutes.
pub const PENDING_TTL_SECS: i64 = 10 * 60;

/// A single pending verification awaiting its challenge code.
#[derive(Debug, Clone)]
pub struct PendingVerification {
    /// Normalized challenge code (uppercase, no dash).
    challenge: String,
    /// The checkpoint the gate was requested for.
    pub checkpoint: CheckpointId,
    /// Identity of the requesting session.
    pub identity: ClientIdentity,
    /// When this entry stops being honored.
    expires_at: DateTime<Utc>,
}

impl PendingVerification {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Check a submitted code against the stored challenge.
    ///
    /// Case- and dash-insensitive via normalization; the comparison itself
    /// is constant-time.
    fn code_matches(&self, submitted: &str) -> bool {
        match normalize_challenge_code(submitted) {
            Some(normalized) => normalized
                .as_bytes()
                .ct_eq(self.challenge.as_bytes())
                .into(),
            None => false,
        }
    }
}

/// The process-wide table of pending verifications, keyed by session.
///
/// Concurrent request handlers share this table; the map's entry locking
/// makes insert-or-overwrite and check-then-consume atomic per session,
/// and the sweep cannot delete a live entry that was inserted while it
/// runs (expiry is re-checked per entry).
pub struct PendingVerifications {
    entries: DashMap<SessionId, PendingVerification>,
    ttl: Duration,
}

impl PendingVerifications {
    /// Create a table whose entries live for `ttl_secs`.
    #[must_use]
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Begin a verification: generate a fresh challenge code and store it.
    ///
    /// Overwrites any prior entry for the session. Returns the code in its
    /// display form (`ABC-234`) for the client to re-enter.
    pub fn begin(
        &self,
        session_id: SessionId,
        checkpoint: CheckpointId,
        identity: ClientIdentity,
    ) -> String {
        let code = generate_challenge_code();
        let normalized =
            normalize_challenge_code(&code).expect("generated codes always normalize");
        self.entries.insert(
            session_id,
            PendingVerification {
                challenge: normalized,
                checkpoint,
                identity,
                expires_at: Utc::now() + self.ttl,
            },
        );
        code
    }

    /// Confirm a verification with a submitted code.
    ///
    /// On match the entry is consumed and returned. On mismatch the entry
    /// is left in place so the client may retry. A missing or expired
    /// entry reports [`AccessError::NoPendingVerification`].
    pub fn confirm(
        &self,
        session_id: &SessionId,
        submitted: &str,
    ) -> Result<PendingVerification, AccessError> {
        let now = Utc::now();
        match self.entries.entry(*session_id) {
            Entry::Occupied(entry) => {
                if entry.get().is_expired(now) {
                    entry.remove();
                    return Err(AccessError::NoPendingVerification);
                }
                if entry.get().code_matches(submitted) {
                    Ok(entry.remove())
                } else {
                    Err(AccessError::CodeMismatch)
                }
            }
            Entry::Vacant(_) => Err(AccessError::NoPendingVerification),
        }
    }

    /// Remove expired entries. Returns how many were dropped.
    ///
    /// Routine maintenance run from a timer task; not required for
    /// correctness since expired entries are ignored on lookup.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, v| !v.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Current number of entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Force a session's entry to be expired, for testing sweeps.
    #[cfg(test)]
    pub(crate) fn force_expire(&self, session_id: &SessionId) {
        if let Some(mut entry) = self.entries.get_mut(session_id) {
            entry.expires_at = Utc::now() - Duration::seconds(1);
        }
    }
}

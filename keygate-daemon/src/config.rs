//! Daemon configuration.

use std::path::PathBuf;

use serde::Deserialize;

/// Tunables for the access service.
///
/// Deserializable from whatever configuration source the embedding binary
/// uses; every field has a default matching the fixed policies in the
/// design (24 h credential horizon, 10 min pending TTL).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path of the SQLite database file.
    pub db_path: PathBuf,
    /// Lifetime of a pending verification, seconds.
    pub pending_ttl_secs: i64,
    /// Credential expiry horizon, seconds.
    pub credential_ttl_secs: i64,
    /// How often the pending-verification sweep runs, seconds.
    pub sweep_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("keygate.db"),
            pending_ttl_secs: keygate_core::pending::PENDING_TTL_SECS,
            credential_ttl_secs: keygate_core::credential::CREDENTIAL_TTL_SECS,
            sweep_interval_secs: 60,
        }
    }
}

//! Persistent session and credential storage with SQLite.
//!
//! All mutations go straight to the durable store; there is no local cache
//! to diverge from. Checkpoint appends are idempotent via the table's
//! primary key, and credential redemption is a single atomic test-and-set
//! so concurrent redemptions cannot both succeed.

use std::path::Path;

use keygate_auth::ClientIdentity;
use keygate_core::{CheckpointId, CheckpointRecord, Credential, Session, SessionId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

/// Persistent storage for sessions, checkpoint progress, and credentials.
pub struct AccessStore {
    pool: SqlitePool,
}

impl AccessStore {
    /// Open or create a database at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Database(sqlx::Error::Configuration(
                    format!("failed to create db directory: {}", e).into(),
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            // WAL mode for better concurrent read performance
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1) // SQLite performs best with a single writer
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory database, for tests and ephemeral deployments.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                identity TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                issued_key TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // The primary key makes checkpoint appends idempotent: re-appending
        // an already-present checkpoint is a no-op, not an error.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_checkpoints (
                session_id TEXT NOT NULL,
                checkpoint TEXT NOT NULL,
                completed_at INTEGER NOT NULL,
                verified INTEGER NOT NULL,
                PRIMARY KEY (session_id, checkpoint)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                key TEXT PRIMARY KEY,
                identity TEXT NOT NULL,
                session_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                used_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create and persist a new session bound to the given identity.
    pub async fn create_session(
        &self,
        identity: &ClientIdentity,
        now: i64,
    ) -> Result<Session, StoreError> {
        let session = Session {
            id: SessionId::generate(),
            identity: identity.clone(),
            created_at: now,
            checkpoints: Vec::new(),
            completed: false,
            issued_key: None,
        };

        sqlx::query(
            "INSERT INTO sessions (id, identity, created_at, completed) VALUES (?, ?, ?, 0)",
        )
        .bind(session.id.to_string())
        .bind(session.identity.as_str())
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    /// Load a session with its checkpoint records.
    pub async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            "SELECT identity, created_at, completed, issued_key FROM sessions WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let identity_str: String = row.try_get("identity")?;
        let identity = ClientIdentity::parse(&identity_str)
            .map_err(|e| sqlx::Error::Decode(format!("invalid identity: {}", e).into()))?;
        let created_at: i64 = row.try_get("created_at")?;
        let completed: i64 = row.try_get("completed")?;
        let issued_key: Option<String> = row.try_get("issued_key")?;

        let checkpoint_rows = sqlx::query(
            "SELECT checkpoint, completed_at, verified
             FROM session_checkpoints WHERE session_id = ? ORDER BY completed_at",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut checkpoints = Vec::with_capacity(checkpoint_rows.len());
        for cp_row in checkpoint_rows {
            let name: String = cp_row.try_get("checkpoint")?;
            let checkpoint = CheckpointId::parse(&name)
                .ok_or_else(|| sqlx::Error::Decode(format!("unknown checkpoint: {}", name).into()))?;
            let verified: i64 = cp_row.try_get("verified")?;
            checkpoints.push(CheckpointRecord {
                checkpoint,
                completed_at: cp_row.try_get("completed_at")?,
                verified: verified != 0,
            });
        }

        Ok(Some(Session {
            id: *id,
            identity,
            created_at,
            checkpoints,
            completed: completed != 0,
            issued_key,
        }))
    }

    /// Record a completed checkpoint. Idempotent per checkpoint id:
    /// re-appending reports success without touching the original record.
    ///
    /// Returns the total number of checkpoints recorded for the session.
    pub async fn append_checkpoint(
        &self,
        id: &SessionId,
        checkpoint: CheckpointId,
        now: i64,
        verified: bool,
    ) -> Result<u32, StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO session_checkpoints
             (session_id, checkpoint, completed_at, verified) VALUES (?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(checkpoint.as_str())
        .bind(now)
        .bind(i64::from(verified))
        .execute(&self.pool)
        .await?;

        let row =
            sqlx::query("SELECT COUNT(*) AS n FROM session_checkpoints WHERE session_id = ?")
                .bind(id.to_string())
                .fetch_one(&self.pool)
                .await?;
        let count: i64 = row.try_get("n")?;
        Ok(count as u32)
    }

    /// Mark a session completed with a back-reference to its minted key.
    pub async fn mark_completed(&self, id: &SessionId, key: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE sessions SET completed = 1, issued_key = ? WHERE id = ?")
            .bind(key)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Persist a freshly minted credential.
    pub async fn insert_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO credentials (key, identity, session_id, created_at, expires_at, used_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&credential.key)
        .bind(credential.identity.as_str())
        .bind(credential.session_id.to_string())
        .bind(credential.created_at)
        .bind(credential.expires_at)
        .bind(credential.used_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically redeem a credential, consuming its single use.
    ///
    /// The WHERE clause is the whole guarantee: only an unused, unexpired
    /// credential bound to the presented identity is consumed, in one
    /// UPDATE. If zero rows were touched, a classification read reports
    /// the distinct reason; a race between the read and someone else's
    /// consume can only ever surface as "already used".
    pub async fn redeem_credential(
        &self,
        key: &str,
        identity: &ClientIdentity,
        now: i64,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "UPDATE credentials SET used_at = ?
             WHERE key = ? AND identity = ? AND used_at IS NULL AND expires_at > ?",
        )
        .bind(now)
        .bind(key)
        .bind(identity.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            let row = sqlx::query("SELECT expires_at FROM credentials WHERE key = ?")
                .bind(key)
                .fetch_one(&self.pool)
                .await?;
            return Ok(row.try_get("expires_at")?);
        }

        // Nothing consumed: classify why.
        let row = sqlx::query("SELECT identity, expires_at, used_at FROM credentials WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Err(StoreError::CredentialNotFound);
        };

        let bound_identity: String = row.try_get("identity")?;
        let bound = ClientIdentity::parse(&bound_identity)
            .map_err(|e| sqlx::Error::Decode(format!("invalid identity: {}", e).into()))?;
        if bound != *identity {
            return Err(StoreError::IdentityMismatch);
        }

        let used_at: Option<i64> = row.try_get("used_at")?;
        if used_at.is_some() {
            return Err(StoreError::CredentialAlreadyUsed);
        }

        let expires_at: i64 = row.try_get("expires_at")?;
        if expires_at <= now {
            return Err(StoreError::CredentialExpired);
        }

        // The credential was consumed between our UPDATE and the read.
        Err(StoreError::CredentialAlreadyUsed)
    }
}

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("credential not found")]
    CredentialNotFound,
    #[error("identity mismatch")]
    IdentityMismatch,
    #[error("credential expired")]
    CredentialExpired,
    #[error("credential already used")]
    CredentialAlreadyUsed,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

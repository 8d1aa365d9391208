//! The access service: every externally exposed operation.
//!
//! Transport-agnostic: each operation takes and returns a structured
//! record; the embedding transport adapter only does field mapping. All
//! failures surface synchronously through [`AccessError`].

use std::sync::Arc;
use std::time::Duration;

use keygate_auth::{ClientIdentity, TagSigner};
use keygate_core::{
    AccessError, CheckpointId, Credential, PendingVerifications, Session, SessionId,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::config::DaemonConfig;
use crate::store::{AccessStore, StoreError};
use crate::sweep::spawn_pending_sweeper;

/// Get current Unix timestamp in seconds.
fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time before Unix epoch")
        .as_secs() as i64
}

/// Connection attributes observed by the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionRequest {
    /// Originating network address.
    pub remote_addr: String,
    /// Client-supplied agent string.
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    /// Session-scope tag over `{session_id, identity, created_at}`.
    pub tag: String,
    /// Grant-scope tag over `{session_id, identity}`, used by the direct
    /// confirmation and issuance operations.
    pub grant_tag: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestCheckpointGateRequest {
    pub session_id: String,
    pub tag: String,
    pub checkpoint_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestCheckpointGateResponse {
    /// Where to send the client for the external task.
    pub gate_url: String,
    /// The code the client must re-enter after completing it.
    pub challenge_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmCheckpointCodeRequest {
    pub session_id: String,
    pub challenge_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmCheckpointCodeResponse {
    /// Refreshed session-scope tag.
    pub tag: String,
    pub checkpoint_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmCheckpointDirectRequest {
    pub session_id: String,
    pub tag: String,
    pub checkpoint_id: String,
    /// Free-form proof value. Accepted verbatim, never validated.
    pub proof: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmCheckpointDirectResponse {
    /// Refreshed grant-scope tag.
    pub tag: String,
    pub checkpoints_completed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueCredentialRequest {
    pub session_id: String,
    /// Grant-scope tag.
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueCredentialResponse {
    pub key: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemCredentialRequest {
    pub key: String,
    /// Identity the relying party claims the credential is bound to.
    pub identity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemCredentialResponse {
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub operations: Vec<String>,
}

/// Implementation of the access operations.
#[derive(Clone)]
pub struct AccessService {
    store: Arc<AccessStore>,
    signer: Arc<TagSigner>,
    pending: Arc<PendingVerifications>,
    credential_ttl_secs: i64,
}

impl AccessService {
    /// Build a service from already-constructed parts.
    pub fn new(
        store: Arc<AccessStore>,
        signer: Arc<TagSigner>,
        pending: Arc<PendingVerifications>,
        credential_ttl_secs: i64,
    ) -> Self {
        Self {
            store,
            signer,
            pending,
            credential_ttl_secs,
        }
    }

    /// Open the store, generate a process-lifetime signing secret, and
    /// start the pending-verification sweeper.
    pub async fn open(config: &DaemonConfig) -> Result<(Self, JoinHandle<()>), StoreError> {
        let store = Arc::new(AccessStore::open(&config.db_path).await?);
        let signer = Arc::new(TagSigner::new());
        let pending = Arc::new(PendingVerifications::new(config.pending_ttl_secs));
        let sweeper = spawn_pending_sweeper(
            Arc::clone(&pending),
            Duration::from_secs(config.sweep_interval_secs),
        );
        Ok((
            Self::new(store, signer, pending, config.credential_ttl_secs),
            sweeper,
        ))
    }

    /// Start a new session bound to the caller's derived identity.
    pub async fn start_session(
        &self,
        req: StartSessionRequest,
    ) -> Result<StartSessionResponse, AccessError> {
        let identity = ClientIdentity::bind(&req.remote_addr, &req.user_agent);
        let now = current_timestamp();

        let session = self
            .store
            .create_session(&identity, now)
            .await
            .map_err(storage_failure)?;

        let session_id = session.id.to_string();
        let tag = self
            .signer
            .sign_session(&session_id, identity.as_str(), now);
        let grant_tag = self.signer.sign_grant(&session_id, identity.as_str());

        tracing::info!(session_id = %session_id, identity = %identity, "Session started");

        Ok(StartSessionResponse {
            session_id,
            tag: tag.to_string(),
            grant_tag: grant_tag.to_string(),
            created_at: now,
        })
    }

    /// Request the external gate for a checkpoint.
    ///
    /// Stores a pending verification (overwriting any prior one for the
    /// session) and hands back the redirect target plus the challenge code
    /// the client must re-enter afterwards.
    pub async fn request_checkpoint_gate(
        &self,
        req: RequestCheckpointGateRequest,
    ) -> Result<RequestCheckpointGateResponse, AccessError> {
        if req.session_id.is_empty() || req.tag.is_empty() || req.checkpoint_id.is_empty() {
            return Err(AccessError::MissingParameters);
        }

        let session = self.load_session(&req.session_id).await?;
        self.require_session_tag(&session, &req.tag)?;

        let checkpoint =
            CheckpointId::parse(&req.checkpoint_id).ok_or(AccessError::UnknownCheckpoint)?;

        let challenge_code =
            self.pending
                .begin(session.id, checkpoint, session.identity.clone());

        tracing::info!(
            session_id = %session.id,
            checkpoint = %checkpoint,
            "Checkpoint gate requested"
        );

        Ok(RequestCheckpointGateResponse {
            gate_url: checkpoint.gate_reference().redirect_url.to_string(),
            challenge_code,
        })
    }

    /// Confirm a gated checkpoint with the challenge code.
    ///
    /// A mismatch leaves the pending verification in place so the client
    /// may retry; a match consumes it, records the checkpoint (idempotent)
    /// and refreshes the session tag.
    pub async fn confirm_checkpoint_code(
        &self,
        req: ConfirmCheckpointCodeRequest,
    ) -> Result<ConfirmCheckpointCodeResponse, AccessError> {
        if req.session_id.is_empty() || req.challenge_code.is_empty() {
            return Err(AccessError::MissingParameters);
        }

        let session = self.load_session(&req.session_id).await?;
        let verification = self.pending.confirm(&session.id, &req.challenge_code)?;
        let checkpoint = verification.checkpoint;

        if !session.has_checkpoint(checkpoint) {
            self.store
                .append_checkpoint(&session.id, checkpoint, current_timestamp(), true)
                .await
                .map_err(storage_failure)?;
        }

        let tag = self.signer.sign_session(
            &session.id.to_string(),
            session.identity.as_str(),
            session.created_at,
        );

        tracing::info!(
            session_id = %session.id,
            checkpoint = %checkpoint,
            "Checkpoint confirmed via challenge code"
        );

        Ok(ConfirmCheckpointCodeResponse {
            tag: tag.to_string(),
            checkpoint_id: checkpoint.as_str().to_string(),
        })
    }

    /// Legacy direct confirmation for checkpoints without an external gate.
    ///
    /// The proof value is an untrusted side-channel input: it is logged
    /// and otherwise ignored.
    pub async fn confirm_checkpoint_direct(
        &self,
        req: ConfirmCheckpointDirectRequest,
    ) -> Result<ConfirmCheckpointDirectResponse, AccessError> {
        if req.session_id.is_empty()
            || req.tag.is_empty()
            || req.checkpoint_id.is_empty()
            || req.proof.is_empty()
        {
            return Err(AccessError::MissingParameters);
        }

        let session = self.load_session(&req.session_id).await?;
        self.require_grant_tag(&session, &req.tag)?;

        let checkpoint =
            CheckpointId::parse(&req.checkpoint_id).ok_or(AccessError::UnknownCheckpoint)?;

        let checkpoints_completed = self
            .store
            .append_checkpoint(&session.id, checkpoint, current_timestamp(), false)
            .await
            .map_err(storage_failure)?;

        let tag = self
            .signer
            .sign_grant(&session.id.to_string(), session.identity.as_str());

        tracing::debug!(
            session_id = %session.id,
            checkpoint = %checkpoint,
            proof = %req.proof,
            "Checkpoint confirmed directly"
        );

        Ok(ConfirmCheckpointDirectResponse {
            tag: tag.to_string(),
            checkpoints_completed,
        })
    }

    /// Convert a fully-checkpointed session into a single-use key.
    pub async fn issue_credential(
        &self,
        req: IssueCredentialRequest,
    ) -> Result<IssueCredentialResponse, AccessError> {
        if req.session_id.is_empty() || req.tag.is_empty() {
            return Err(AccessError::MissingParameters);
        }

        let session = self.load_session(&req.session_id).await?;
        self.require_grant_tag(&session, &req.tag)?;

        let missing = session.missing_required();
        if !missing.is_empty() {
            return Err(AccessError::MissingRequiredCheckpoints(missing));
        }

        if session.completed {
            // Known gap preserved: issuance does not reject an
            // already-completed session, it mints a second key.
            tracing::warn!(
                session_id = %session.id,
                prior_key_present = session.issued_key.is_some(),
                "Re-issuing credential for an already-completed session"
            );
        }

        let now = current_timestamp();
        let credential = Credential::mint(
            session.identity.clone(),
            session.id,
            now,
            self.credential_ttl_secs,
        );

        // Independent writes, credential first: a crash in between leaves
        // a usable credential and a session not yet marked completed,
        // which redemption never consults.
        self.store
            .insert_credential(&credential)
            .await
            .map_err(storage_failure)?;
        self.store
            .mark_completed(&session.id, &credential.key)
            .await
            .map_err(storage_failure)?;

        tracing::info!(
            session_id = %session.id,
            expires_at = credential.expires_at,
            "Credential issued"
        );

        Ok(IssueCredentialResponse {
            key: credential.key,
            expires_at: credential.expires_at,
        })
    }

    /// Validate and atomically consume a presented key.
    pub async fn redeem_credential(
        &self,
        req: RedeemCredentialRequest,
    ) -> Result<RedeemCredentialResponse, AccessError> {
        if req.key.is_empty() || req.identity.is_empty() {
            return Err(AccessError::MissingParameters);
        }

        // A malformed identity can never match a stored binding.
        let identity =
            ClientIdentity::parse(&req.identity).map_err(|_| AccessError::IdentityMismatch)?;

        let expires_at = self
            .store
            .redeem_credential(&req.key, &identity, current_timestamp())
            .await
            .map_err(|e| match e {
                StoreError::CredentialNotFound => AccessError::CredentialNotFound,
                StoreError::IdentityMismatch => AccessError::IdentityMismatch,
                StoreError::CredentialExpired => AccessError::CredentialExpired,
                StoreError::CredentialAlreadyUsed => AccessError::CredentialAlreadyUsed,
                StoreError::Database(_) => storage_failure(e),
            })?;

        tracing::info!(identity = %identity, "Credential redeemed");

        Ok(RedeemCredentialResponse { expires_at })
    }

    /// Service status and the supported operation list.
    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
            operations: [
                "StartSession",
                "RequestCheckpointGate",
                "ConfirmCheckpointCode",
                "ConfirmCheckpointDirect",
                "IssueCredential",
                "RedeemCredential",
                "Health",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }

    async fn load_session(&self, session_id: &str) -> Result<Session, AccessError> {
        let id = SessionId::parse(session_id).ok_or(AccessError::SessionNotFound)?;
        self.store
            .get_session(&id)
            .await
            .map_err(storage_failure)?
            .ok_or(AccessError::SessionNotFound)
    }

    fn require_session_tag(&self, session: &Session, presented: &str) -> Result<(), AccessError> {
        let valid = self.signer.verify_session(
            &session.id.to_string(),
            session.identity.as_str(),
            session.created_at,
            presented,
        );
        if valid {
            Ok(())
        } else {
            tracing::warn!(session_id = %session.id, "Session tag verification failed");
            Err(AccessError::InvalidTag)
        }
    }

    fn require_grant_tag(&self, session: &Session, presented: &str) -> Result<(), AccessError> {
        let valid = self.signer.verify_grant(
            &session.id.to_string(),
            session.identity.as_str(),
            presented,
        );
        if valid {
            Ok(())
        } else {
            tracing::warn!(session_id = %session.id, "Grant tag verification failed");
            Err(AccessError::InvalidTag)
        }
    }
}

fn storage_failure(e: StoreError) -> AccessError {
    tracing::error!(error = %e, "Storage operation failed");
    AccessError::StorageUnavailable
}

//! End-to-end exercises of the credential lifecycle.

use std::sync::Arc;

use keygate_auth::{ClientIdentity, TagSigner};
use keygate_core::{AccessError, Credential, PendingVerifications, SessionId};
use keygate_daemon::services::{
    ConfirmCheckpointCodeRequest, ConfirmCheckpointDirectRequest, IssueCredentialRequest,
    RedeemCredentialRequest, RequestCheckpointGateRequest, StartSessionRequest,
    StartSessionResponse,
};
use keygate_daemon::{AccessService, AccessStore};

const ADDR: &str = "203.0.113.9";
const AGENT: &str = "agent/1.0";

fn now_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

async fn test_service() -> (AccessService, Arc<AccessStore>) {
    let store = Arc::new(AccessStore::open_in_memory().await.unwrap());
    let service = AccessService::new(
        Arc::clone(&store),
        Arc::new(TagSigner::new()),
        Arc::new(PendingVerifications::new(600)),
        86_400,
    );
    (service, store)
}

async fn start(service: &AccessService) -> StartSessionResponse {
    service
        .start_session(StartSessionRequest {
            remote_addr: ADDR.into(),
            user_agent: AGENT.into(),
        })
        .await
        .unwrap()
}

/// Complete a gated checkpoint: request the gate, then confirm its code.
async fn complete_gated(service: &AccessService, session: &StartSessionResponse, id: &str) {
    let gate = service
        .request_checkpoint_gate(RequestCheckpointGateRequest {
            session_id: session.session_id.clone(),
            tag: session.tag.clone(),
            checkpoint_id: id.into(),
        })
        .await
        .unwrap();

    let confirmed = service
        .confirm_checkpoint_code(ConfirmCheckpointCodeRequest {
            session_id: session.session_id.clone(),
            challenge_code: gate.challenge_code,
        })
        .await
        .unwrap();
    assert_eq!(confirmed.checkpoint_id, id);
}

#[tokio::test]
async fn full_flow_issues_and_redeems_once() {
    let (service, _store) = test_service().await;
    let session = start(&service).await;

    complete_gated(&service, &session, "task1").await;
    complete_gated(&service, &session, "task2").await;

    let before = now_ts();
    let issued = service
        .issue_credential(IssueCredentialRequest {
            session_id: session.session_id.clone(),
            tag: session.grant_tag.clone(),
        })
        .await
        .unwrap();

    // Fixed 24 hour horizon from issuance time.
    let horizon = issued.expires_at - before;
    assert!((86_398..=86_402).contains(&horizon), "horizon was {}", horizon);

    let identity = ClientIdentity::bind(ADDR, AGENT).to_string();
    let redeemed = service
        .redeem_credential(RedeemCredentialRequest {
            key: issued.key.clone(),
            identity: identity.clone(),
        })
        .await
        .unwrap();
    assert_eq!(redeemed.expires_at, issued.expires_at);

    // Single use: every later attempt fails the same way.
    for _ in 0..3 {
        let again = service
            .redeem_credential(RedeemCredentialRequest {
                key: issued.key.clone(),
                identity: identity.clone(),
            })
            .await;
        assert!(matches!(again, Err(AccessError::CredentialAlreadyUsed)));
    }
}

#[tokio::test]
async fn issuance_requires_both_checkpoints() {
    let (service, _store) = test_service().await;
    let session = start(&service).await;

    let result = service
        .issue_credential(IssueCredentialRequest {
            session_id: session.session_id.clone(),
            tag: session.grant_tag.clone(),
        })
        .await;

    match result {
        Err(AccessError::MissingRequiredCheckpoints(missing)) => {
            let names: Vec<&str> = missing.iter().map(|c| c.as_str()).collect();
            assert_eq!(names, vec!["task1", "task2"]);
        }
        other => panic!("expected missing checkpoints, got {:?}", other),
    }
}

#[tokio::test]
async fn wrong_code_rejects_then_retry_succeeds() {
    let (service, _store) = test_service().await;
    let session = start(&service).await;

    let gate = service
        .request_checkpoint_gate(RequestCheckpointGateRequest {
            session_id: session.session_id.clone(),
            tag: session.tag.clone(),
            checkpoint_id: "task1".into(),
        })
        .await
        .unwrap();

    let wrong = service
        .confirm_checkpoint_code(ConfirmCheckpointCodeRequest {
            session_id: session.session_id.clone(),
            challenge_code: "ZZZ-999".into(),
        })
        .await;
    assert!(matches!(wrong, Err(AccessError::CodeMismatch)));

    // Mismatch did not consume the pending verification; the correct code
    // is accepted case-insensitively.
    let confirmed = service
        .confirm_checkpoint_code(ConfirmCheckpointCodeRequest {
            session_id: session.session_id.clone(),
            challenge_code: gate.challenge_code.to_lowercase(),
        })
        .await
        .unwrap();
    assert_eq!(confirmed.checkpoint_id, "task1");
}

#[tokio::test]
async fn confirm_without_gate_request_fails() {
    let (service, _store) = test_service().await;
    let session = start(&service).await;

    let result = service
        .confirm_checkpoint_code(ConfirmCheckpointCodeRequest {
            session_id: session.session_id.clone(),
            challenge_code: "ABC-234".into(),
        })
        .await;
    assert!(matches!(result, Err(AccessError::NoPendingVerification)));
}

#[tokio::test]
async fn tampered_tags_are_rejected() {
    let (service, _store) = test_service().await;
    let session = start(&service).await;
    let other = start(&service).await;

    // A valid tag for a different session does not transfer.
    let result = service
        .request_checkpoint_gate(RequestCheckpointGateRequest {
            session_id: session.session_id.clone(),
            tag: other.tag.clone(),
            checkpoint_id: "task1".into(),
        })
        .await;
    assert!(matches!(result, Err(AccessError::InvalidTag)));

    // The grant-scope tag does not authorize session-scope operations.
    let result = service
        .request_checkpoint_gate(RequestCheckpointGateRequest {
            session_id: session.session_id.clone(),
            tag: session.grant_tag.clone(),
            checkpoint_id: "task1".into(),
        })
        .await;
    assert!(matches!(result, Err(AccessError::InvalidTag)));

    // Nor the session-scope tag grant-scope ones.
    let result = service
        .issue_credential(IssueCredentialRequest {
            session_id: session.session_id.clone(),
            tag: session.tag.clone(),
        })
        .await;
    assert!(matches!(result, Err(AccessError::InvalidTag)));
}

#[tokio::test]
async fn unknown_checkpoint_rejected() {
    let (service, _store) = test_service().await;
    let session = start(&service).await;

    let result = service
        .request_checkpoint_gate(RequestCheckpointGateRequest {
            session_id: session.session_id.clone(),
            tag: session.tag.clone(),
            checkpoint_id: "task99".into(),
        })
        .await;
    assert!(matches!(result, Err(AccessError::UnknownCheckpoint)));
}

#[tokio::test]
async fn direct_path_appends_with_grant_tag() {
    let (service, _store) = test_service().await;
    let session = start(&service).await;

    let first = service
        .confirm_checkpoint_direct(ConfirmCheckpointDirectRequest {
            session_id: session.session_id.clone(),
            tag: session.grant_tag.clone(),
            checkpoint_id: "task1".into(),
            proof: "external-event-42".into(),
        })
        .await
        .unwrap();
    assert_eq!(first.checkpoints_completed, 1);

    // Idempotent: re-confirming the same checkpoint does not duplicate.
    let again = service
        .confirm_checkpoint_direct(ConfirmCheckpointDirectRequest {
            session_id: session.session_id.clone(),
            tag: first.tag.clone(),
            checkpoint_id: "task1".into(),
            proof: "external-event-43".into(),
        })
        .await
        .unwrap();
    assert_eq!(again.checkpoints_completed, 1);

    let second = service
        .confirm_checkpoint_direct(ConfirmCheckpointDirectRequest {
            session_id: session.session_id.clone(),
            tag: again.tag.clone(),
            checkpoint_id: "task2".into(),
            proof: "external-event-44".into(),
        })
        .await
        .unwrap();
    assert_eq!(second.checkpoints_completed, 2);

    // Both paths converge: issuance now succeeds.
    assert!(service
        .issue_credential(IssueCredentialRequest {
            session_id: session.session_id.clone(),
            tag: session.grant_tag.clone(),
        })
        .await
        .is_ok());
}

#[tokio::test]
async fn redeem_with_wrong_identity_rejected() {
    let (service, _store) = test_service().await;
    let session = start(&service).await;
    complete_gated(&service, &session, "task1").await;
    complete_gated(&service, &session, "task2").await;

    let issued = service
        .issue_credential(IssueCredentialRequest {
            session_id: session.session_id.clone(),
            tag: session.grant_tag.clone(),
        })
        .await
        .unwrap();

    let other_identity = ClientIdentity::bind("198.51.100.7", AGENT).to_string();
    let result = service
        .redeem_credential(RedeemCredentialRequest {
            key: issued.key.clone(),
            identity: other_identity,
        })
        .await;
    assert!(matches!(result, Err(AccessError::IdentityMismatch)));

    // The credential is still unused for its rightful holder.
    let identity = ClientIdentity::bind(ADDR, AGENT).to_string();
    assert!(service
        .redeem_credential(RedeemCredentialRequest {
            key: issued.key,
            identity,
        })
        .await
        .is_ok());
}

#[tokio::test]
async fn expired_credential_rejected_even_if_unused() {
    let (service, store) = test_service().await;
    let identity = ClientIdentity::bind(ADDR, AGENT);

    let expired = Credential::mint(identity.clone(), SessionId::generate(), now_ts() - 200, 100);
    store.insert_credential(&expired).await.unwrap();

    let result = service
        .redeem_credential(RedeemCredentialRequest {
            key: expired.key,
            identity: identity.to_string(),
        })
        .await;
    assert!(matches!(result, Err(AccessError::CredentialExpired)));
}

#[tokio::test]
async fn concurrent_redemption_consumes_exactly_once() {
    let (service, _store) = test_service().await;
    let session = start(&service).await;
    complete_gated(&service, &session, "task1").await;
    complete_gated(&service, &session, "task2").await;

    let issued = service
        .issue_credential(IssueCredentialRequest {
            session_id: session.session_id.clone(),
            tag: session.grant_tag.clone(),
        })
        .await
        .unwrap();

    let identity = ClientIdentity::bind(ADDR, AGENT).to_string();
    let req = RedeemCredentialRequest {
        key: issued.key,
        identity,
    };

    let (a, b) = tokio::join!(
        service.redeem_credential(req.clone()),
        service.redeem_credential(req.clone()),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent redemption may succeed");
    for result in [a, b] {
        if let Err(e) = result {
            assert!(matches!(e, AccessError::CredentialAlreadyUsed));
        }
    }
}

#[tokio::test]
async fn reissue_on_completed_session_mints_second_key() {
    // The known double-issuance gap is preserved deliberately.
    let (service, _store) = test_service().await;
    let session = start(&service).await;
    complete_gated(&service, &session, "task1").await;
    complete_gated(&service, &session, "task2").await;

    let first = service
        .issue_credential(IssueCredentialRequest {
            session_id: session.session_id.clone(),
            tag: session.grant_tag.clone(),
        })
        .await
        .unwrap();
    let second = service
        .issue_credential(IssueCredentialRequest {
            session_id: session.session_id.clone(),
            tag: session.grant_tag.clone(),
        })
        .await
        .unwrap();

    assert_ne!(first.key, second.key);
}

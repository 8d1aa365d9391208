//! Service implementations exposed by the daemon.

mod access;

pub use access::{
    AccessService, ConfirmCheckpointCodeRequest, ConfirmCheckpointCodeResponse,
    ConfirmCheckpointDirectRequest, ConfirmCheckpointDirectResponse, HealthResponse,
    IssueCredentialRequest, IssueCredentialResponse, RedeemCredentialRequest,
    RedeemCredentialResponse, RequestCheckpointGateRequest, RequestCheckpointGateResponse,
    StartSessionRequest, StartSessionResponse,
};

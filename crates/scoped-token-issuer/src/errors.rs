use scoped_token_policy::ScopeId;
use thiserror::Error;

use crate::types::Identity;

/// Failures of the identity, minting and upstream stages
#[derive(Error, Debug)]
pub enum IssuanceError {
    #[error("invalid OIDC token: {0}")]
    MalformedAssertion(String),

    #[error("OIDC token has no repository claim")]
    MissingIdentityClaim,

    #[error("invalid repository format: {0}")]
    MalformedIdentity(String),

    #[error("failed to fetch signing key: {0}")]
    SecretFetch(#[from] SecretError),

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("failed to sign JWT: {0}")]
    SigningFailure(String),

    #[error("GitHub App is not installed on repository {0}")]
    AppNotInstalled(Identity),

    #[error("insufficient permissions for requested scopes")]
    InsufficientGrantedPermission,

    #[error("GitHub App installation is suspended or has insufficient permissions")]
    SuspendedInstallation,

    #[error("GitHub API returned fewer scopes than requested (missing: {})", join_scopes(.missing))]
    PartialGrant { missing: Vec<ScopeId> },

    #[error("GitHub API error: {0}")]
    UpstreamUnavailable(String),
}

fn join_scopes(scopes: &[ScopeId]) -> String {
    scopes
        .iter()
        .map(ScopeId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Secret retrieval failures
#[derive(Error, Debug)]
pub enum SecretError {
    #[error("failed to retrieve secret '{name}': {reason}")]
    Unavailable { name: String, reason: String },

    #[error("secret '{name}' has an invalid payload: {reason}")]
    InvalidPayload { name: String, reason: String },
}

/// HTTP-style failures reported by the upstream installation API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("not found")]
    NotFound,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unprocessable entity: {0}")]
    Unprocessable(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, IssuanceError>;

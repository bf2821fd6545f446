//! Issuance orchestration: key fetch, app assertion, upstream broker.

use scoped_token_policy::ScopeRequest;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

use crate::broker::UpstreamBroker;
use crate::errors::{IssuanceError, Result};
use crate::minter::{CredentialMinter, SigningCredential};
use crate::secrets::SecretSource;
use crate::types::{Identity, IssuedCredential};
use crate::upstream::InstallationTokenApi;

/// Network and signing stages of an issuance, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    GetPrivateKey,
    CreateJwt,
    GetInstallationId,
    CreateInstallationToken,
    VerifyGrant,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::GetPrivateKey => "get_private_key",
            Stage::CreateJwt => "create_jwt",
            Stage::GetInstallationId => "get_installation_id",
            Stage::CreateInstallationToken => "create_installation_token",
            Stage::VerifyGrant => "verify_grant",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives the outcome of every stage
pub trait StageObserver: Send + Sync {
    fn record(&self, stage: Stage, error: Option<&IssuanceError>);
}

/// Observer that discards stage outcomes
pub struct NoOpObserver;

impl StageObserver for NoOpObserver {
    fn record(&self, _stage: Stage, _error: Option<&IssuanceError>) {}
}

pub(crate) fn observe<T>(
    observer: &dyn StageObserver,
    stage: Stage,
    result: Result<T>,
) -> Result<T> {
    observer.record(stage, result.as_ref().err());
    result
}

/// Run a stage against the request deadline. Running out of time cancels
/// the stage and is reported as the upstream being unavailable.
pub(crate) async fn within_deadline<T>(
    deadline: Instant,
    stage: Stage,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout_at(deadline, future).await {
        Ok(result) => result,
        Err(_) => Err(IssuanceError::UpstreamUnavailable(format!(
            "request deadline exceeded during {}",
            stage
        ))),
    }
}

/// Issues installation tokens for validated requests.
///
/// Holds no per-request state: the signing key is fetched and the
/// upstream queried again for every call.
pub struct TokenIssuer {
    secrets: Arc<dyn SecretSource>,
    upstream: Arc<dyn InstallationTokenApi>,
    app_id: String,
    key_secret_name: String,
}

impl TokenIssuer {
    pub fn new(
        secrets: Arc<dyn SecretSource>,
        upstream: Arc<dyn InstallationTokenApi>,
        app_id: impl Into<String>,
        key_secret_name: impl Into<String>,
    ) -> Self {
        Self {
            secrets,
            upstream,
            app_id: app_id.into(),
            key_secret_name: key_secret_name.into(),
        }
    }

    /// Issue a token for `identity` carrying exactly `request`.
    ///
    /// Stages run strictly in sequence and the first failure ends the
    /// issuance. Nothing is retried.
    pub async fn issue(
        &self,
        identity: &Identity,
        request: &ScopeRequest,
        deadline: Instant,
        observer: &dyn StageObserver,
    ) -> Result<IssuedCredential> {
        let key_pem = observe(
            observer,
            Stage::GetPrivateKey,
            within_deadline(deadline, Stage::GetPrivateKey, async {
                self.secrets
                    .fetch(&self.key_secret_name)
                    .await
                    .map_err(IssuanceError::from)
            })
            .await,
        )?;

        let credential = SigningCredential::new(key_pem, self.app_id.as_str());
        let assertion = observe(
            observer,
            Stage::CreateJwt,
            CredentialMinter::mint(&credential),
        )?;
        drop(credential);

        tracing::debug!(
            repository = %identity,
            scopes = ?request.scope_names(),
            "Minted app assertion"
        );

        UpstreamBroker::new(self.upstream.as_ref(), assertion.token(), deadline)
            .run(identity, request, observer)
            .await
    }
}

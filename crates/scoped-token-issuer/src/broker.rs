//! Upstream broker: installation lookup, token request, grant check.
//!
//! The exchange is an explicit state machine:
//!
//! ```text
//! ResolveInstallation -> RequestCredential -> VerifyGrant -> Done
//! ```
//!
//! Each transition produces the typed input of the next state. Any failure
//! ends the flow; there are no retries.

use scoped_token_policy::ScopeRequest;
use tokio::time::Instant;

use crate::errors::{IssuanceError, Result, UpstreamError};
use crate::service::{observe, within_deadline, Stage, StageObserver};
use crate::types::{GrantedScopes, Identity, InstallationId, InstallationToken, IssuedCredential};
use crate::upstream::InstallationTokenApi;

/// State of one brokered exchange
#[derive(Debug)]
pub enum BrokerState {
    ResolveInstallation,
    RequestCredential(InstallationId),
    VerifyGrant(InstallationToken),
    Done(IssuedCredential),
}

pub struct UpstreamBroker<'a> {
    api: &'a dyn InstallationTokenApi,
    app_token: &'a str,
    deadline: Instant,
}

impl<'a> UpstreamBroker<'a> {
    pub fn new(api: &'a dyn InstallationTokenApi, app_token: &'a str, deadline: Instant) -> Self {
        Self {
            api,
            app_token,
            deadline,
        }
    }

    /// Drive the exchange from `ResolveInstallation` to `Done`.
    pub async fn run(
        &self,
        identity: &Identity,
        request: &ScopeRequest,
        observer: &dyn StageObserver,
    ) -> Result<IssuedCredential> {
        let mut state = BrokerState::ResolveInstallation;

        loop {
            state = match state {
                BrokerState::ResolveInstallation => {
                    let installation = observe(
                        observer,
                        Stage::GetInstallationId,
                        self.resolve_installation(identity).await,
                    )?;
                    BrokerState::RequestCredential(installation)
                }
                BrokerState::RequestCredential(installation) => {
                    let token = observe(
                        observer,
                        Stage::CreateInstallationToken,
                        self.request_credential(installation, request).await,
                    )?;
                    BrokerState::VerifyGrant(token)
                }
                BrokerState::VerifyGrant(token) => {
                    observe(
                        observer,
                        Stage::VerifyGrant,
                        Self::verify_grant(request, &token.granted),
                    )?;
                    BrokerState::Done(IssuedCredential {
                        token: token.token,
                        expires_at: token.expires_at,
                        scopes: request.clone(),
                    })
                }
                BrokerState::Done(credential) => return Ok(credential),
            };
        }
    }

    /// `ResolveInstallation`: identity to installation reference
    pub async fn resolve_installation(&self, identity: &Identity) -> Result<InstallationId> {
        within_deadline(self.deadline, Stage::GetInstallationId, async {
            self.api
                .find_repository_installation(self.app_token, identity)
                .await
                .map_err(|e| match e {
                    UpstreamError::NotFound => IssuanceError::AppNotInstalled(identity.clone()),
                    other => IssuanceError::UpstreamUnavailable(format!(
                        "failed to find installation: {}",
                        other
                    )),
                })
        })
        .await
    }

    /// `RequestCredential`: token for the installation with the requested
    /// permissions
    pub async fn request_credential(
        &self,
        installation: InstallationId,
        request: &ScopeRequest,
    ) -> Result<InstallationToken> {
        within_deadline(self.deadline, Stage::CreateInstallationToken, async {
            self.api
                .create_installation_token(self.app_token, installation, request)
                .await
                .map_err(|e| match e {
                    UpstreamError::Forbidden(_) => IssuanceError::InsufficientGrantedPermission,
                    UpstreamError::Unprocessable(_) => IssuanceError::SuspendedInstallation,
                    other => IssuanceError::UpstreamUnavailable(format!(
                        "failed to create installation token: {}",
                        other
                    )),
                })
        })
        .await
    }

    /// `VerifyGrant`: every requested pair must be granted exactly.
    /// Extra granted scopes are ignored.
    pub fn verify_grant(request: &ScopeRequest, granted: &GrantedScopes) -> Result<()> {
        let missing = granted.missing_from(request);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(IssuanceError::PartialGrant { missing })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::NoOpObserver;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use scoped_token_policy::{parse_scope_pairs, PermissionLevel, ScopeId};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Upstream mock returning canned results
    struct MockApi {
        installation: std::result::Result<InstallationId, UpstreamError>,
        token: std::result::Result<InstallationToken, UpstreamError>,
        delay: Option<Duration>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl MockApi {
        fn granting(granted: &[(&str, PermissionLevel)]) -> Self {
            Self {
                installation: Ok(InstallationId(42)),
                token: Ok(InstallationToken {
                    token: "ghs_test".to_string(),
                    expires_at: Utc::now() + ChronoDuration::hours(1),
                    granted: granted
                        .iter()
                        .map(|(scope, level)| (ScopeId::new(*scope), *level))
                        .collect(),
                }),
                delay: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InstallationTokenApi for MockApi {
        async fn find_repository_installation(
            &self,
            _app_token: &str,
            _identity: &Identity,
        ) -> std::result::Result<InstallationId, UpstreamError> {
            self.calls.lock().unwrap().push("find");
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.installation.clone()
        }

        async fn create_installation_token(
            &self,
            _app_token: &str,
            installation: InstallationId,
            _permissions: &ScopeRequest,
        ) -> std::result::Result<InstallationToken, UpstreamError> {
            assert_eq!(installation, InstallationId(42));
            self.calls.lock().unwrap().push("create");
            self.token.clone()
        }
    }

    fn identity() -> Identity {
        Identity::parse("octo-org/octo-repo").unwrap()
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    use PermissionLevel::{Read, Write};

    #[test]
    fn test_verify_grant_exact_and_superset() {
        let request = parse_scope_pairs([("contents", "write"), ("issues", "read")]).unwrap();

        let exact: GrantedScopes = [
            (ScopeId::new("contents"), Write),
            (ScopeId::new("issues"), Read),
        ]
        .into_iter()
        .collect();
        assert!(UpstreamBroker::verify_grant(&request, &exact).is_ok());

        let superset: GrantedScopes = [
            (ScopeId::new("contents"), Write),
            (ScopeId::new("issues"), Read),
            (ScopeId::new("metadata"), Read),
            (ScopeId::new("pull_requests"), Write),
        ]
        .into_iter()
        .collect();
        assert!(UpstreamBroker::verify_grant(&request, &superset).is_ok());
    }

    #[test]
    fn test_verify_grant_subset_reports_difference() {
        let request = parse_scope_pairs([
            ("contents", "write"),
            ("deployments", "write"),
            ("issues", "read"),
        ])
        .unwrap();
        let granted: GrantedScopes = [
            (ScopeId::new("contents"), Write),
            (ScopeId::new("issues"), Write),
        ]
        .into_iter()
        .collect();

        match UpstreamBroker::verify_grant(&request, &granted) {
            Err(IssuanceError::PartialGrant { missing }) => {
                let mut missing: Vec<_> = missing.iter().map(ScopeId::as_str).collect();
                missing.sort_unstable();
                assert_eq!(missing, vec!["deployments", "issues"]);
            }
            other => panic!("expected PartialGrant, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_grant_empty_grant() {
        let request = parse_scope_pairs([("contents", "read")]).unwrap();
        assert!(matches!(
            UpstreamBroker::verify_grant(&request, &GrantedScopes::default()),
            Err(IssuanceError::PartialGrant { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_returns_requested_scopes_only() {
        let api = MockApi::granting(&[("contents", Write), ("issues", Read), ("checks", Write)]);
        let request = parse_scope_pairs([("contents", "write"), ("issues", "read")]).unwrap();

        let credential = UpstreamBroker::new(&api, "jwt", deadline())
            .run(&identity(), &request, &NoOpObserver)
            .await
            .unwrap();

        assert_eq!(credential.token, "ghs_test");
        assert_eq!(credential.scopes, request);
        assert_eq!(credential.scopes.get("checks"), None);
        assert_eq!(api.calls(), vec!["find", "create"]);
    }

    #[tokio::test]
    async fn test_not_found_is_app_not_installed() {
        let mut api = MockApi::granting(&[]);
        api.installation = Err(UpstreamError::NotFound);
        let request = parse_scope_pairs([("contents", "read")]).unwrap();

        let err = UpstreamBroker::new(&api, "jwt", deadline())
            .run(&identity(), &request, &NoOpObserver)
            .await
            .unwrap_err();

        match err {
            IssuanceError::AppNotInstalled(identity) => {
                assert_eq!(identity.to_string(), "octo-org/octo-repo")
            }
            other => panic!("expected AppNotInstalled, got {other:?}"),
        }
        assert_eq!(api.calls(), vec!["find"]);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_unavailable() {
        let mut api = MockApi::granting(&[]);
        api.installation = Err(UpstreamError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        });

        let err = UpstreamBroker::new(&api, "jwt", deadline())
            .resolve_installation(&identity())
            .await
            .unwrap_err();
        assert!(matches!(err, IssuanceError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_token_request_failures_are_classified() {
        let request = parse_scope_pairs([("contents", "write")]).unwrap();
        let cases = [
            (UpstreamError::Forbidden(String::new()), "insufficient"),
            (UpstreamError::Unprocessable(String::new()), "suspended"),
            (UpstreamError::Transport("reset".to_string()), "unavailable"),
        ];

        for (upstream, expected) in cases {
            let mut api = MockApi::granting(&[]);
            api.token = Err(upstream);

            let err = UpstreamBroker::new(&api, "jwt", deadline())
                .request_credential(InstallationId(42), &request)
                .await
                .unwrap_err();

            let actual = match err {
                IssuanceError::InsufficientGrantedPermission => "insufficient",
                IssuanceError::SuspendedInstallation => "suspended",
                IssuanceError::UpstreamUnavailable(_) => "unavailable",
                other => panic!("unexpected error {other:?}"),
            };
            assert_eq!(actual, expected);
        }
    }

    #[tokio::test]
    async fn test_deadline_cancels_slow_upstream() {
        let mut api = MockApi::granting(&[("contents", Read)]);
        api.delay = Some(Duration::from_secs(5));
        let request = parse_scope_pairs([("contents", "read")]).unwrap();
        let deadline = Instant::now() + Duration::from_millis(20);

        let err = UpstreamBroker::new(&api, "jwt", deadline)
            .run(&identity(), &request, &NoOpObserver)
            .await
            .unwrap_err();

        assert!(matches!(err, IssuanceError::UpstreamUnavailable(_)));
        assert_eq!(api.calls(), vec!["find"]);
    }
}

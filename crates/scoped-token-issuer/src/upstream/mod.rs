//! Upstream installation-token API.
//!
//! The broker talks to the upstream through [`InstallationTokenApi`], which
//! works in terms of the generic scope maps. Translation to the upstream's
//! own permission schema happens inside the implementation.

mod github;

pub use github::{from_upstream_permissions, to_upstream_permissions, GitHubClient};

use async_trait::async_trait;
use scoped_token_policy::ScopeRequest;

use crate::errors::UpstreamError;
use crate::types::{Identity, InstallationId, InstallationToken};

#[async_trait]
pub trait InstallationTokenApi: Send + Sync {
    /// Look up the app installation bound to a repository
    async fn find_repository_installation(
        &self,
        app_token: &str,
        identity: &Identity,
    ) -> Result<InstallationId, UpstreamError>;

    /// Request a token for an installation, restricted to `permissions`
    async fn create_installation_token(
        &self,
        app_token: &str,
        installation: InstallationId,
        permissions: &ScopeRequest,
    ) -> Result<InstallationToken, UpstreamError>;
}

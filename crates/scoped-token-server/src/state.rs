use anyhow::{Context, Result};
use scoped_token_issuer::{
    FileSecretSource, GcpSecretManager, GitHubClient, SecretSource, TokenIssuer,
};
use scoped_token_policy::PolicyCatalog;
use std::sync::Arc;

use crate::config::{Config, KeySource};

/// Application state shared across all handlers.
///
/// Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub catalog: Arc<PolicyCatalog>,
    pub issuer: Arc<TokenIssuer>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let catalog = match &config.policy_file {
            Some(path) => PolicyCatalog::load(path)
                .with_context(|| format!("loading policy file {}", path.display()))?,
            None => PolicyCatalog::builtin(),
        };
        tracing::info!(
            allowed = catalog.allowed_scopes().count(),
            blocked = catalog.blocked_scopes().count(),
            "Policy catalog loaded"
        );

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("building HTTP client")?;

        let secrets: Arc<dyn SecretSource> = match &config.key_source {
            KeySource::SecretManager { project_id } => {
                tracing::info!(project_id = %project_id, "Using Secret Manager for signing key");
                Arc::new(GcpSecretManager::new(http_client.clone(), project_id.as_str()))
            }
            KeySource::Directory(dir) => {
                tracing::info!(dir = %dir.display(), "Using local directory for signing key");
                Arc::new(FileSecretSource::new(dir.clone()))
            }
        };

        let upstream = Arc::new(GitHubClient::new(http_client, config.github_api_url.as_str()));

        let issuer = Arc::new(TokenIssuer::new(
            secrets,
            upstream,
            config.github_app_id.as_str(),
            config.private_key_secret.as_str(),
        ));

        Ok(Self::from_parts(config, catalog, issuer))
    }

    pub fn from_parts(config: Config, catalog: PolicyCatalog, issuer: Arc<TokenIssuer>) -> Self {
        Self {
            config,
            catalog: Arc::new(catalog),
            issuer,
        }
    }
}

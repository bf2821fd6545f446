//! GitHub REST implementation of the installation-token API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use scoped_token_policy::{PermissionLevel, ScopeId, ScopeRequest};
use serde::Deserialize;
use std::collections::BTreeMap;
use url::Url;

use super::InstallationTokenApi;
use crate::errors::UpstreamError;
use crate::types::{GrantedScopes, Identity, InstallationId, InstallationToken};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";

/// Scope ids whose upstream permission field is named differently.
/// Every other scope maps to a field of the same name.
const FIELD_RENAMES: &[(&str, &str)] = &[
    ("projects", "repository_projects"),
    ("secret_scanning", "secret_scanning_alerts"),
];

fn upstream_field(scope: &str) -> &str {
    FIELD_RENAMES
        .iter()
        .find(|(ours, _)| *ours == scope)
        .map(|(_, theirs)| *theirs)
        .unwrap_or(scope)
}

fn scope_for_field(field: &str) -> &str {
    FIELD_RENAMES
        .iter()
        .find(|(_, theirs)| *theirs == field)
        .map(|(ours, _)| *ours)
        .unwrap_or(field)
}

/// Requested scopes as the upstream `permissions` object
pub fn to_upstream_permissions(request: &ScopeRequest) -> BTreeMap<String, &'static str> {
    request
        .iter()
        .map(|(scope, level)| (upstream_field(scope.as_str()).to_string(), level.as_str()))
        .collect()
}

/// Upstream `permissions` object as granted scopes.
///
/// Levels other than read/write (e.g. `admin`) are dropped: they can never
/// equal a requested level.
pub fn from_upstream_permissions(permissions: &BTreeMap<String, String>) -> GrantedScopes {
    permissions
        .iter()
        .filter_map(|(field, level)| {
            PermissionLevel::parse(level).map(|level| (ScopeId::new(scope_for_field(field)), level))
        })
        .collect()
}

#[derive(Deserialize)]
struct InstallationResponse {
    id: u64,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
    #[serde(default)]
    permissions: Option<BTreeMap<String, String>>,
}

/// GitHub Apps API client
pub struct GitHubClient {
    http_client: Client,
    api_url: String,
}

impl GitHubClient {
    pub fn new(http_client: Client, api_url: impl Into<String>) -> Self {
        Self {
            http_client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// API URL with `segments` appended, each percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
        let invalid = |reason: String| {
            UpstreamError::Transport(format!("invalid API URL {}: {}", self.api_url, reason))
        };
        let mut url = Url::parse(&self.api_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url, app_token: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, url)
            .bearer_auth(app_token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", concat!("scoped-token/", env!("CARGO_PKG_VERSION")))
    }
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new(Client::new(), DEFAULT_API_URL)
    }
}

/// Map non-success statuses to classified failures
async fn check_status(response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => UpstreamError::NotFound,
        StatusCode::FORBIDDEN => UpstreamError::Forbidden(body),
        StatusCode::UNPROCESSABLE_ENTITY => UpstreamError::Unprocessable(body),
        _ => UpstreamError::Status {
            status: status.as_u16(),
            body,
        },
    })
}

#[async_trait]
impl InstallationTokenApi for GitHubClient {
    async fn find_repository_installation(
        &self,
        app_token: &str,
        identity: &Identity,
    ) -> Result<InstallationId, UpstreamError> {
        let url = self.endpoint(&["repos", identity.owner(), identity.name(), "installation"])?;

        let response = self
            .request(reqwest::Method::GET, url, app_token)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let installation: InstallationResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;

        Ok(InstallationId(installation.id))
    }

    async fn create_installation_token(
        &self,
        app_token: &str,
        installation: InstallationId,
        permissions: &ScopeRequest,
    ) -> Result<InstallationToken, UpstreamError> {
        let installation = installation.to_string();
        let url = self.endpoint(&["app", "installations", &installation, "access_tokens"])?;
        let body = serde_json::json!({ "permissions": to_upstream_permissions(permissions) });

        let response = self
            .request(reqwest::Method::POST, url, app_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let token: AccessTokenResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;

        Ok(InstallationToken {
            token: token.token,
            expires_at: token.expires_at,
            granted: token
                .permissions
                .as_ref()
                .map(from_upstream_permissions)
                .unwrap_or_default(),
        })
    }
}

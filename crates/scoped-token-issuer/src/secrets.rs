//! Signing key retrieval.
//!
//! Keys are fetched by name on every request; nothing is cached.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::path::PathBuf;
use zeroize::Zeroizing;

use crate::errors::SecretError;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const SECRET_MANAGER_URL: &str = "https://secretmanager.googleapis.com";

/// Fetch-by-name source of secret bytes
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Zeroizing<Vec<u8>>, SecretError>;
}

/// Reads secrets from files in a directory, one file per secret name
pub struct FileSecretSource {
    dir: PathBuf,
}

impl FileSecretSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SecretSource for FileSecretSource {
    async fn fetch(&self, name: &str) -> Result<Zeroizing<Vec<u8>>, SecretError> {
        if name.contains(['/', '\\']) || name == ".." {
            return Err(SecretError::Unavailable {
                name: name.to_string(),
                reason: "secret name must not contain path separators".to_string(),
            });
        }

        let bytes = tokio::fs::read(self.dir.join(name))
            .await
            .map_err(|e| SecretError::Unavailable {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Zeroizing::new(bytes))
    }
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

#[derive(Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Deserialize)]
struct SecretPayload {
    data: String,
}

/// Google Cloud Secret Manager, authenticated through the metadata server
pub struct GcpSecretManager {
    http_client: Client,
    project_id: String,
    metadata_token_url: String,
    api_url: String,
}

impl GcpSecretManager {
    pub fn new(http_client: Client, project_id: impl Into<String>) -> Self {
        Self {
            http_client,
            project_id: project_id.into(),
            metadata_token_url: METADATA_TOKEN_URL.to_string(),
            api_url: SECRET_MANAGER_URL.to_string(),
        }
    }

    /// Point at non-default endpoints (emulators, tests)
    pub fn with_endpoints(
        mut self,
        metadata_token_url: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        self.metadata_token_url = metadata_token_url.into();
        self.api_url = api_url.into();
        self
    }

    /// Resource path of the latest version of a secret
    pub fn version_path(&self, name: &str) -> String {
        format!(
            "projects/{}/secrets/{}/versions/latest",
            self.project_id, name
        )
    }

    async fn access_token(&self, name: &str) -> Result<Zeroizing<String>, SecretError> {
        let unavailable = |reason: String| SecretError::Unavailable {
            name: name.to_string(),
            reason,
        };

        let response = self
            .http_client
            .get(&self.metadata_token_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| unavailable(format!("metadata server request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(unavailable(format!(
                "metadata server returned {}",
                response.status()
            )));
        }

        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| unavailable(format!("failed to parse metadata token: {}", e)))?;

        Ok(Zeroizing::new(token.access_token))
    }
}

#[async_trait]
impl SecretSource for GcpSecretManager {
    async fn fetch(&self, name: &str) -> Result<Zeroizing<Vec<u8>>, SecretError> {
        let access_token = self.access_token(name).await?;
        let url = format!("{}/v1/{}:access", self.api_url, self.version_path(name));

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token.as_str())
            .send()
            .await
            .map_err(|e| SecretError::Unavailable {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SecretError::Unavailable {
                name: name.to_string(),
                reason: format!("Secret Manager returned {}: {}", status, body),
            });
        }

        let version: AccessSecretVersionResponse =
            response.json().await.map_err(|e| SecretError::InvalidPayload {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let bytes = STANDARD
            .decode(version.payload.data.as_bytes())
            .map_err(|e| SecretError::InvalidPayload {
                name: name.to_string(),
                reason: format!("payload is not base64: {}", e),
            })?;

        Ok(Zeroizing::new(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_source_reads_named_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("github-app-private-key"), b"pem bytes").unwrap();

        let source = FileSecretSource::new(dir.path());
        let bytes = source.fetch("github-app-private-key").await.unwrap();
        assert_eq!(bytes.as_slice(), b"pem bytes");
    }

    #[tokio::test]
    async fn test_file_source_missing_secret() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSecretSource::new(dir.path());

        assert!(matches!(
            source.fetch("absent").await,
            Err(SecretError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_source_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSecretSource::new(dir.path());

        assert!(source.fetch("../etc/passwd").await.is_err());
        assert!(source.fetch("..").await.is_err());
    }

    #[test]
    fn test_gcp_version_path() {
        let manager = GcpSecretManager::new(Client::new(), "my-project");
        assert_eq!(
            manager.version_path("github-app-private-key"),
            "projects/my-project/secrets/github-app-private-key/versions/latest"
        );
    }

    #[tokio::test]
    async fn test_gcp_unreachable_metadata_server() {
        let manager = GcpSecretManager::new(Client::new(), "my-project")
            .with_endpoints("http://127.0.0.1:9/token", "http://127.0.0.1:9");

        assert!(matches!(
            manager.fetch("github-app-private-key").await,
            Err(SecretError::Unavailable { .. })
        ));
    }

    const ACCESS_PATH: &str =
        "/v1/projects/my-project/secrets/github-app-private-key/versions/latest:access";

    async fn manager_with_token(
        server: &mut mockito::ServerGuard,
    ) -> (GcpSecretManager, mockito::Mock) {
        let token_mock = server
            .mock("GET", "/token")
            .match_header("Metadata-Flavor", "Google")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"ya29.test","expires_in":3599,"token_type":"Bearer"}"#)
            .create_async()
            .await;

        let manager = GcpSecretManager::new(Client::new(), "my-project")
            .with_endpoints(format!("{}/token", server.url()), server.url());
        (manager, token_mock)
    }

    #[tokio::test]
    async fn test_gcp_fetch_decodes_latest_version() {
        let mut server = mockito::Server::new_async().await;
        let (manager, token_mock) = manager_with_token(&mut server).await;
        let access_mock = server
            .mock("GET", ACCESS_PATH)
            .match_header("Authorization", "Bearer ya29.test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"name":"projects/my-project/secrets/github-app-private-key/versions/3","payload":{"data":"cGVtIGJ5dGVz"}}"#,
            )
            .create_async()
            .await;

        let bytes = manager.fetch("github-app-private-key").await.unwrap();

        assert_eq!(bytes.as_slice(), b"pem bytes");
        token_mock.assert_async().await;
        access_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_gcp_access_denied() {
        let mut server = mockito::Server::new_async().await;
        let (manager, _token_mock) = manager_with_token(&mut server).await;
        let _access_mock = server
            .mock("GET", ACCESS_PATH)
            .with_status(403)
            .with_body("permission denied")
            .create_async()
            .await;

        match manager.fetch("github-app-private-key").await {
            Err(SecretError::Unavailable { name, reason }) => {
                assert_eq!(name, "github-app-private-key");
                assert!(reason.contains("403"));
            }
            other => panic!("expected Unavailable, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_gcp_payload_not_base64() {
        let mut server = mockito::Server::new_async().await;
        let (manager, _token_mock) = manager_with_token(&mut server).await;
        let _access_mock = server
            .mock("GET", ACCESS_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"payload":{"data":"not base64!"}}"#)
            .create_async()
            .await;

        assert!(matches!(
            manager.fetch("github-app-private-key").await,
            Err(SecretError::InvalidPayload { .. })
        ));
    }

    #[tokio::test]
    async fn test_gcp_metadata_server_error() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = server
            .mock("GET", "/token")
            .with_status(500)
            .create_async()
            .await;
        let manager = GcpSecretManager::new(Client::new(), "my-project")
            .with_endpoints(format!("{}/token", server.url()), server.url());

        assert!(matches!(
            manager.fetch("github-app-private-key").await,
            Err(SecretError::Unavailable { .. })
        ));
        token_mock.assert_async().await;
    }
}

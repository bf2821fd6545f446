use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Where the app's private key is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Google Cloud Secret Manager in the given project
    SecretManager { project_id: String },
    /// Local directory with one file per secret (development)
    Directory(PathBuf),
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the server to
    pub bind_address: SocketAddr,

    /// GitHub App ID, the issuer of app assertions
    pub github_app_id: String,

    /// GitHub REST API base URL
    pub github_api_url: String,

    pub key_source: KeySource,

    /// Name of the secret holding the app's PEM private key
    pub private_key_secret: String,

    /// JSON policy catalog; the built-in catalog when unset
    pub policy_file: Option<PathBuf>,

    /// Deadline for the whole pipeline of one request
    pub request_timeout: Duration,

    /// Emit the request log for every request, not only tag URLs
    pub log_all_requests: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_address = match lookup("BIND_ADDRESS") {
            Some(address) => address.parse()?,
            None => {
                let port: u16 = lookup("PORT")
                    .unwrap_or_else(|| "8080".to_string())
                    .parse()?;
                SocketAddr::from(([0, 0, 0, 0], port))
            }
        };

        let github_app_id = lookup("GITHUB_APP_ID")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow::anyhow!("GITHUB_APP_ID environment variable required"))?;

        let github_api_url = lookup("GITHUB_API_URL")
            .unwrap_or_else(|| "https://api.github.com".to_string());

        let key_source = match lookup("PRIVATE_KEY_DIR") {
            Some(dir) => KeySource::Directory(dir.into()),
            None => {
                let project_id = lookup("GOOGLE_CLOUD_PROJECT")
                    .or_else(|| lookup("GCP_PROJECT"))
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "GOOGLE_CLOUD_PROJECT (or GCP_PROJECT) required when PRIVATE_KEY_DIR is not set"
                        )
                    })?;
                KeySource::SecretManager { project_id }
            }
        };

        let private_key_secret = lookup("PRIVATE_KEY_SECRET")
            .unwrap_or_else(|| "github-app-private-key".to_string());

        let policy_file = lookup("POLICY_FILE").map(PathBuf::from);

        let request_timeout = lookup("REQUEST_TIMEOUT_SECONDS")
            .unwrap_or_else(|| "30".to_string())
            .parse()
            .map(Duration::from_secs)?;
        if request_timeout.is_zero() {
            anyhow::bail!("REQUEST_TIMEOUT_SECONDS must be greater than zero");
        }

        let log_all_requests = match lookup("LOG_ALL_REQUESTS").as_deref() {
            None | Some("") | Some("false") | Some("0") => false,
            Some("true") | Some("1") => true,
            Some(other) => anyhow::bail!("LOG_ALL_REQUESTS must be true or false, got {}", other),
        };

        Ok(Config {
            bind_address,
            github_app_id,
            github_api_url,
            key_source,
            private_key_secret,
            policy_file,
            request_timeout,
            log_all_requests,
        })
    }
}

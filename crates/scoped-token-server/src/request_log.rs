//! Per-request event log.
//!
//! Cloud Run revision tag URLs look like
//! `https://{tag}---{service}-{hash}-{region}.a.run.app`. Requests that
//! arrive through one are logged event by event so a tagged revision can
//! be debugged without flooding the logs of the serving revision.
//! Token values and key material never appear in these events.

use axum::http::{header, HeaderMap, StatusCode};
use scoped_token_issuer::{Identity, IssuanceError, Stage, StageObserver};
use scoped_token_policy::ScopeRequest;
use std::fmt;
use std::time::Instant;

const TAG_URL_MARKER: &str = "---";

pub struct RequestLog {
    enabled: bool,
    started: Instant,
    repository: Option<String>,
}

impl RequestLog {
    /// Enabled when the request came through a tag URL, or always when
    /// `log_all` is set.
    pub fn new(headers: &HeaderMap, log_all: bool) -> Self {
        let via_tag_url = headers
            .get(header::HOST)
            .and_then(|host| host.to_str().ok())
            .is_some_and(|host| host.contains(TAG_URL_MARKER));

        Self {
            enabled: log_all || via_tag_url,
            started: Instant::now(),
            repository: None,
        }
    }

    pub fn set_repository(&mut self, identity: &Identity) {
        self.repository = Some(identity.to_string());
    }

    fn repo(&self) -> &str {
        self.repository.as_deref().unwrap_or("")
    }

    pub fn request_received(&self, request: &ScopeRequest) {
        if !self.enabled {
            return;
        }
        tracing::info!(
            event = "request_received",
            repo = self.repo(),
            scopes = ?request.scope_names()
        );
    }

    pub fn validation_failed(&self, error_type: &str, detail: &dyn fmt::Display) {
        if !self.enabled {
            return;
        }
        tracing::info!(
            event = "validation_failed",
            repo = self.repo(),
            error_type,
            detail = %detail
        );
    }

    pub fn github_api(&self, operation: &str, error: Option<&IssuanceError>) {
        if !self.enabled {
            return;
        }
        match error {
            None => tracing::info!(
                event = "github_api",
                repo = self.repo(),
                operation,
                success = true
            ),
            Some(err) => tracing::info!(
                event = "github_api",
                repo = self.repo(),
                operation,
                success = false,
                error = %err
            ),
        }
    }

    /// `granted` is the scope set handed back on success.
    pub fn response_sent(&self, status: StatusCode, granted: Option<&ScopeRequest>) {
        if !self.enabled {
            return;
        }
        let duration_ms = self.started.elapsed().as_millis() as u64;
        match granted {
            Some(scopes) => tracing::info!(
                event = "response_sent",
                repo = self.repo(),
                status = status.as_u16(),
                duration_ms,
                scopes_granted = ?scopes.scope_names()
            ),
            None => tracing::info!(
                event = "response_sent",
                repo = self.repo(),
                status = status.as_u16(),
                duration_ms
            ),
        }
    }
}

impl StageObserver for RequestLog {
    fn record(&self, stage: Stage, error: Option<&IssuanceError>) {
        self.github_api(stage.as_str(), error);
    }
}

use axum::{
    extract::{RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::SecondsFormat;
use scoped_token_issuer::{extract_identity, IssuedCredential};
use scoped_token_policy::{parse_scope_pairs, PolicyValidator, ScopeRequest};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;

use crate::error::ApiError;
use crate::extractors::BearerAssertion;
use crate::request_log::RequestLog;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: String,
    pub scopes: ScopeRequest,
}

impl From<IssuedCredential> for TokenResponse {
    fn from(credential: IssuedCredential) -> Self {
        Self {
            token: credential.token,
            expires_at: credential
                .expires_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            scopes: credential.scopes,
        }
    }
}

/// Issue a scoped installation token.
///
/// POST /token?contents=write&issues=read
/// Authorization: Bearer <workload identity JWT>
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    bearer: Result<BearerAssertion, ApiError>,
) -> Response {
    let deadline = Instant::now() + state.config.request_timeout;
    let mut log = RequestLog::new(&headers, state.config.log_all_requests);

    let result = issue(
        &state,
        &mut log,
        query.as_deref().unwrap_or_default(),
        bearer,
        deadline,
    )
    .await;

    match result {
        Ok(credential) => {
            log.response_sent(StatusCode::OK, Some(&credential.scopes));
            Json(TokenResponse::from(credential)).into_response()
        }
        Err(err) => {
            log.response_sent(err.status(), None);
            err.into_response()
        }
    }
}

async fn issue(
    state: &AppState,
    log: &mut RequestLog,
    query: &str,
    bearer: Result<BearerAssertion, ApiError>,
    deadline: Instant,
) -> Result<IssuedCredential, ApiError> {
    let BearerAssertion(assertion) = bearer.inspect_err(|e| log.validation_failed("auth", e))?;

    let request = parse_scope_pairs(url::form_urlencoded::parse(query.as_bytes()))
        .inspect_err(|e| log.validation_failed("scope", e))?;

    PolicyValidator::validate(&state.catalog, &request)
        .inspect_err(|e| log.validation_failed("scope", e))?;

    let identity = extract_identity(&assertion).inspect_err(|e| log.validation_failed("oidc", e))?;
    log.set_repository(&identity);
    log.request_received(&request);

    let credential = state
        .issuer
        .issue(&identity, &request, deadline, &*log)
        .await?;

    tracing::info!(
        repository = %identity,
        scopes = ?credential.scopes.scope_names(),
        expires_at = %credential.expires_at,
        "Installation token issued"
    );

    Ok(credential)
}

/// Any method other than POST on the token routes
pub async fn method_not_allowed(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiError {
    let log = RequestLog::new(&headers, state.config.log_all_requests);
    log.validation_failed("method", &"method not allowed");
    log.response_sent(StatusCode::METHOD_NOT_ALLOWED, None);
    ApiError::MethodNotAllowed
}

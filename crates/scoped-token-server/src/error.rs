use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scoped_token_issuer::IssuanceError;
use scoped_token_policy::PolicyError;
use serde::Serialize;
use serde_json::{json, Value};

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("missing Authorization header")]
    MissingAuthorization,

    #[error("invalid Authorization header format")]
    MalformedAuthorization,

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Issuance(#[from] IssuanceError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::MissingAuthorization | ApiError::MalformedAuthorization => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::Policy(_) => StatusCode::BAD_REQUEST,
            ApiError::Issuance(err) => match err {
                IssuanceError::MalformedAssertion(_)
                | IssuanceError::MissingIdentityClaim
                | IssuanceError::MalformedIdentity(_) => StatusCode::UNAUTHORIZED,
                IssuanceError::AppNotInstalled(_)
                | IssuanceError::InsufficientGrantedPermission
                | IssuanceError::SuspendedInstallation
                | IssuanceError::PartialGrant { .. } => StatusCode::FORBIDDEN,
                IssuanceError::SecretFetch(_)
                | IssuanceError::InvalidKeyMaterial(_)
                | IssuanceError::SigningFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
                IssuanceError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    /// Stable machine-readable classification
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ApiError::MissingAuthorization => "MISSING_AUTHORIZATION",
            ApiError::MalformedAuthorization => "MALFORMED_AUTHORIZATION",
            ApiError::Policy(err) => match err {
                PolicyError::DuplicateScope(_) => "DUPLICATE_SCOPE",
                PolicyError::InvalidPermissionLevel { .. } => "INVALID_PERMISSION_LEVEL",
                PolicyError::NoScopesRequested => "NO_SCOPES_REQUESTED",
                PolicyError::ScopeBlocked(_) => "SCOPE_BLOCKED",
                PolicyError::ScopeNotAllowed(_) => "SCOPE_NOT_ALLOWED",
                PolicyError::LevelNotPermitted { .. } => "LEVEL_NOT_PERMITTED",
                PolicyError::InvalidCatalog(_) => "INVALID_CATALOG",
            },
            ApiError::Issuance(err) => match err {
                IssuanceError::MalformedAssertion(_) => "MALFORMED_ASSERTION",
                IssuanceError::MissingIdentityClaim => "MISSING_IDENTITY_CLAIM",
                IssuanceError::MalformedIdentity(_) => "MALFORMED_IDENTITY",
                IssuanceError::SecretFetch(_) => "SECRET_FETCH_FAILED",
                IssuanceError::InvalidKeyMaterial(_) => "INVALID_KEY_MATERIAL",
                IssuanceError::SigningFailure(_) => "SIGNING_FAILURE",
                IssuanceError::AppNotInstalled(_) => "APP_NOT_INSTALLED",
                IssuanceError::InsufficientGrantedPermission => "INSUFFICIENT_GRANTED_PERMISSION",
                IssuanceError::SuspendedInstallation => "SUSPENDED_INSTALLATION",
                IssuanceError::PartialGrant { .. } => "PARTIAL_GRANT",
                IssuanceError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            },
        }
    }

    fn details(&self) -> Value {
        let mut details = json!({ "code": self.code() });
        match self {
            ApiError::Policy(err) => {
                if let Some(scope) = err.scope() {
                    details["scope"] = json!(scope);
                }
            }
            ApiError::Issuance(IssuanceError::PartialGrant { missing }) => {
                details["missing"] = json!(missing);
            }
            ApiError::Issuance(IssuanceError::AppNotInstalled(identity)) => {
                details["repository"] = json!(identity.to_string());
            }
            _ => {}
        }
        details
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Key and secret problems are operator concerns; keep them out of the body
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(code = self.code(), "Internal error: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(ErrorResponse {
            error,
            details: Some(self.details()),
        });

        (status, body).into_response()
    }
}

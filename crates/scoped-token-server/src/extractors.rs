use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;

/// Caller's workload identity assertion from `Authorization: Bearer <jwt>`.
///
/// Only the header shape is checked here. The assertion itself is
/// decoded later by the identity stage.
#[derive(Debug, Clone)]
pub struct BearerAssertion(pub String);

impl BearerAssertion {
    /// Parse an Authorization header value. The scheme is matched
    /// case-insensitively.
    pub fn parse(header: &str) -> Result<Self, ApiError> {
        let (scheme, token) = header
            .split_once(' ')
            .ok_or(ApiError::MalformedAuthorization)?;

        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(ApiError::MalformedAuthorization);
        }

        let token = token.trim();
        if token.is_empty() {
            return Err(ApiError::MalformedAuthorization);
        }

        Ok(BearerAssertion(token.to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerAssertion
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .ok_or(ApiError::MissingAuthorization)?
            .to_str()
            .map_err(|_| ApiError::MalformedAuthorization)?;

        if header.is_empty() {
            return Err(ApiError::MissingAuthorization);
        }

        BearerAssertion::parse(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bearer() {
        let bearer = BearerAssertion::parse("Bearer eyJ.abc.def").unwrap();
        assert_eq!(bearer.0, "eyJ.abc.def");

        let bearer = BearerAssertion::parse("bearer eyJ.abc.def").unwrap();
        assert_eq!(bearer.0, "eyJ.abc.def");
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        for header in ["Basic dXNlcjpwYXNz", "Bearer", "Bearer ", "eyJ.abc.def"] {
            assert!(
                matches!(
                    BearerAssertion::parse(header),
                    Err(ApiError::MalformedAuthorization)
                ),
                "{header:?} should be rejected"
            );
        }
    }
}

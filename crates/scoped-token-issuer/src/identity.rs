//! Identity extraction from the caller's assertion.
//!
//! The hosting platform has already verified the assertion's signature,
//! issuer, audience and expiry before the request reaches this service, so
//! only the payload is decoded here. No cryptographic checks are repeated.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;

use crate::errors::{IssuanceError, Result};
use crate::types::Identity;

/// Claim carrying the `owner/name` repository identifier
pub const REPOSITORY_CLAIM: &str = "repository";

/// Read the repository identity out of a pre-verified JWT assertion
pub fn extract_identity(assertion: &str) -> Result<Identity> {
    let claims = decode_payload(assertion)?;

    let repository = match claims.get(REPOSITORY_CLAIM) {
        None | Some(Value::Null) => return Err(IssuanceError::MissingIdentityClaim),
        Some(Value::String(repository)) => repository,
        Some(other) => return Err(IssuanceError::MalformedIdentity(other.to_string())),
    };

    Identity::parse(repository)
}

fn decode_payload(assertion: &str) -> Result<serde_json::Map<String, Value>> {
    let segments: Vec<&str> = assertion.split('.').collect();
    if segments.len() != 3 {
        return Err(IssuanceError::MalformedAssertion(
            "token is not a three-part JWT".to_string(),
        ));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| IssuanceError::MalformedAssertion(format!("payload encoding: {}", e)))?;

    match serde_json::from_slice(&payload) {
        Ok(Value::Object(claims)) => Ok(claims),
        Ok(_) => Err(IssuanceError::MalformedAssertion(
            "payload is not a JSON object".to_string(),
        )),
        Err(e) => Err(IssuanceError::MalformedAssertion(format!(
            "payload is not JSON: {}",
            e
        ))),
    }
}

#[cfg(test)]
pub(crate) fn unsigned_assertion(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}

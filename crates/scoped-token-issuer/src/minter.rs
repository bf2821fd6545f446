//! App assertion minting.
//!
//! The app authenticates to the upstream API with a JWT signed by its RSA
//! private key. The assertion lives exactly ten minutes, the longest the
//! upstream accepts, and is used for a single request.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::errors::{IssuanceError, Result};

/// Lifetime of an app assertion, in seconds
pub const APP_ASSERTION_TTL_SECS: i64 = 600;

/// Claims of an app assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppClaims {
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// PEM private key plus the app identifier it signs for
pub struct SigningCredential {
    key_pem: Zeroizing<Vec<u8>>,
    issuer: String,
}

impl SigningCredential {
    pub fn new(key_pem: Zeroizing<Vec<u8>>, issuer: impl Into<String>) -> Self {
        Self {
            key_pem,
            issuer: issuer.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

/// A signed app assertion, presentable as a bearer credential
pub struct AppAssertion {
    token: Zeroizing<String>,
    claims: AppClaims,
}

impl AppAssertion {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn claims(&self) -> &AppClaims {
        &self.claims
    }
}

/// Builds and signs app assertions
pub struct CredentialMinter;

impl CredentialMinter {
    /// Mint an assertion issued now
    pub fn mint(credential: &SigningCredential) -> Result<AppAssertion> {
        Self::mint_at(credential, Utc::now().timestamp())
    }

    /// Mint an assertion issued at `now` (unix seconds)
    pub fn mint_at(credential: &SigningCredential, now: i64) -> Result<AppAssertion> {
        let key = encoding_key(&credential.key_pem)?;

        let claims = AppClaims {
            iat: now,
            exp: now + APP_ASSERTION_TTL_SECS,
            iss: credential.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| IssuanceError::SigningFailure(e.to_string()))?;

        Ok(AppAssertion {
            token: Zeroizing::new(token),
            claims,
        })
    }
}

/// Parse a PEM RSA key, PKCS#1 first and PKCS#8 second.
fn encoding_key(pem: &[u8]) -> Result<EncodingKey> {
    let pem = std::str::from_utf8(pem)
        .map_err(|_| IssuanceError::InvalidKeyMaterial("private key is not PEM text".to_string()))?;

    let key = RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|e| {
            IssuanceError::InvalidKeyMaterial(format!("not an RSA private key: {}", e))
        })?;

    let der = key
        .to_pkcs1_der()
        .map_err(|e| IssuanceError::InvalidKeyMaterial(e.to_string()))?;

    Ok(EncodingKey::from_rsa_der(der.as_bytes()))
}

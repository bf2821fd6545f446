//! # scoped-token-issuer
//!
//! Turns a validated scope request and a caller identity into a short-lived
//! installation token:
//! - Identity extraction from the platform-verified assertion
//! - App assertion minting (RS256, 10 minute lifetime)
//! - Installation lookup and token request against the upstream API
//! - Grant verification: the upstream must grant every requested pair
//!
//! # Security Note
//! Signing keys are fetched per request and never cached. Key bytes and
//! app assertions are held in zeroizing buffers and dropped as soon as the
//! request completes.

#![warn(clippy::all)]

pub mod broker;
pub mod errors;
pub mod identity;
pub mod minter;
pub mod secrets;
mod service;
pub mod types;
pub mod upstream;

pub use broker::{BrokerState, UpstreamBroker};
pub use errors::{IssuanceError, Result, SecretError, UpstreamError};
pub use identity::extract_identity;
pub use minter::{AppAssertion, AppClaims, CredentialMinter, SigningCredential, APP_ASSERTION_TTL_SECS};
pub use secrets::{FileSecretSource, GcpSecretManager, SecretSource};
pub use service::{NoOpObserver, Stage, StageObserver, TokenIssuer};
pub use types::*;
pub use upstream::{GitHubClient, InstallationTokenApi};

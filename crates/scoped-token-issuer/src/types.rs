//! Per-request entities of the issuance pipeline.

use chrono::{DateTime, Utc};
use scoped_token_policy::{PermissionLevel, ScopeId, ScopeRequest};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{IssuanceError, Result};

/// Repository identity in `owner/name` form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    owner: String,
    name: String,
}

impl Identity {
    /// Parse `owner/name`. Exactly two non-empty segments are required.
    pub fn parse(repository: &str) -> Result<Self> {
        let mut parts = repository.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(IssuanceError::MalformedIdentity(repository.to_string())),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Upstream installation binding the app to an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallationId(pub u64);

impl fmt::Display for InstallationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scopes the upstream actually authorized. May exceed the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantedScopes(BTreeMap<ScopeId, PermissionLevel>);

impl GrantedScopes {
    pub fn get(&self, scope: &str) -> Option<PermissionLevel> {
        self.0.get(scope).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Requested pairs without an identical granted entry, in scope order
    pub fn missing_from(&self, request: &ScopeRequest) -> Vec<ScopeId> {
        request
            .iter()
            .filter(|(scope, level)| self.get(scope.as_str()) != Some(*level))
            .map(|(scope, _)| scope.clone())
            .collect()
    }
}

impl FromIterator<(ScopeId, PermissionLevel)> for GrantedScopes {
    fn from_iter<T: IntoIterator<Item = (ScopeId, PermissionLevel)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Token returned by the upstream for an installation
#[derive(Clone)]
pub struct InstallationToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub granted: GrantedScopes,
}

impl fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("granted", &self.granted)
            .finish()
    }
}

/// Credential handed back to the caller.
///
/// `scopes` is always the requested set, never the wider granted set.
#[derive(Clone)]
pub struct IssuedCredential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub scopes: ScopeRequest,
}

impl fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

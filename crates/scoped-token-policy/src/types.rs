//! Scope and permission types shared by the request and grant sides.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of one resource-permission category, e.g. `issues`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(String);

impl ScopeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ScopeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ScopeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Access granularity within a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Read,
    Write,
}

impl PermissionLevel {
    /// Parse the wire form. Only the exact lowercase spellings are accepted.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "read" => Some(PermissionLevel::Read),
            "write" => Some(PermissionLevel::Write),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Read => "read",
            PermissionLevel::Write => "write",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested scopes, keyed by scope.
///
/// Keys are unique by construction: the parser rejects duplicates instead
/// of merging them, so a `ScopeRequest` never holds two levels for one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ScopeRequest(BTreeMap<ScopeId, PermissionLevel>);

impl ScopeRequest {
    pub(crate) fn from_map(map: BTreeMap<ScopeId, PermissionLevel>) -> Self {
        Self(map)
    }

    pub fn get(&self, scope: &str) -> Option<PermissionLevel> {
        self.0.get(scope).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ScopeId, PermissionLevel)> {
        self.0.iter().map(|(scope, level)| (scope, *level))
    }

    /// Scope names in catalog order, for logging
    pub fn scope_names(&self) -> Vec<&str> {
        self.0.keys().map(ScopeId::as_str).collect()
    }

    pub fn as_map(&self) -> &BTreeMap<ScopeId, PermissionLevel> {
        &self.0
    }
}

impl<'a> IntoIterator for &'a ScopeRequest {
    type Item = (&'a ScopeId, &'a PermissionLevel);
    type IntoIter = std::collections::btree_map::Iter<'a, ScopeId, PermissionLevel>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

//! Request parser: raw query pairs to a [`ScopeRequest`].

use std::collections::BTreeMap;

use crate::errors::{PolicyError, Result};
use crate::types::{PermissionLevel, ScopeId, ScopeRequest};

/// Raw scope parameters, every value seen for each key
pub type RawScopes = BTreeMap<String, Vec<String>>;

/// Group `(key, value)` pairs by key and parse them.
///
/// Pairs are typically the decoded query string of the request.
pub fn parse_scope_pairs<I, K, V>(pairs: I) -> Result<ScopeRequest>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut raw = RawScopes::new();
    for (key, value) in pairs {
        raw.entry(key.into()).or_default().push(value.into());
    }
    parse_scopes(&raw)
}

/// Turn raw key → values into a scope request.
///
/// Duplicate keys are checked across the whole input before any value is
/// inspected, so a repeated scope is reported as a duplicate no matter what
/// else is wrong with the request.
pub fn parse_scopes(raw: &RawScopes) -> Result<ScopeRequest> {
    if let Some((key, _)) = raw.iter().find(|(_, values)| values.len() > 1) {
        return Err(PolicyError::DuplicateScope(ScopeId::new(key.as_str())));
    }

    let mut scopes = BTreeMap::new();
    for (key, values) in raw {
        let value = values.first().map(String::as_str).unwrap_or_default();
        let level =
            PermissionLevel::parse(value).ok_or_else(|| PolicyError::InvalidPermissionLevel {
                scope: ScopeId::new(key.as_str()),
                value: value.to_string(),
            })?;
        scopes.insert(ScopeId::new(key.as_str()), level);
    }

    if scopes.is_empty() {
        return Err(PolicyError::NoScopesRequested);
    }

    Ok(ScopeRequest::from_map(scopes))
}

//! Policy error types.

use thiserror::Error;

use crate::types::{PermissionLevel, ScopeId};

/// Errors raised while parsing or validating a scope request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// The same scope key appeared more than once
    #[error("duplicate scope '{0}' in request")]
    DuplicateScope(ScopeId),

    /// Level value other than `read` or `write`
    #[error("invalid permission '{value}' for scope '{scope}' (must be 'read' or 'write')")]
    InvalidPermissionLevel { scope: ScopeId, value: String },

    #[error("at least one scope is required")]
    NoScopesRequested,

    /// Scope is on the block-list
    #[error("scope '{0}' is blocked by policy")]
    ScopeBlocked(ScopeId),

    /// Scope is absent from the allow-list
    #[error("scope '{0}' is not allowed by policy")]
    ScopeNotAllowed(ScopeId),

    /// Scope is allowed, but not at this level
    #[error("permission '{level}' is not permitted for scope '{scope}'")]
    LevelNotPermitted {
        scope: ScopeId,
        level: PermissionLevel,
    },

    /// Catalog could not be loaded
    #[error("invalid policy catalog: {0}")]
    InvalidCatalog(String),
}

impl PolicyError {
    /// Scope the error is about, if any
    pub fn scope(&self) -> Option<&ScopeId> {
        match self {
            PolicyError::DuplicateScope(scope)
            | PolicyError::ScopeBlocked(scope)
            | PolicyError::ScopeNotAllowed(scope)
            | PolicyError::InvalidPermissionLevel { scope, .. }
            | PolicyError::LevelNotPermitted { scope, .. } => Some(scope),
            PolicyError::NoScopesRequested | PolicyError::InvalidCatalog(_) => None,
        }
    }
}

/// Result type for policy operations
pub type Result<T> = std::result::Result<T, PolicyError>;

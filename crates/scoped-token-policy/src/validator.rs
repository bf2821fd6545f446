//! Policy validator logic.

use crate::catalog::PolicyCatalog;
use crate::errors::{PolicyError, Result};
use crate::types::{PermissionLevel, ScopeId, ScopeRequest};

/// Checks requested scope/level pairs against a [`PolicyCatalog`]
pub struct PolicyValidator;

impl PolicyValidator {
    /// Validate every pair of the request.
    ///
    /// Scopes are checked in catalog order and the first failing scope is
    /// reported.
    pub fn validate(catalog: &PolicyCatalog, request: &ScopeRequest) -> Result<()> {
        for (scope, level) in request.iter() {
            Self::check_scope(catalog, scope, level)?;
        }
        Ok(())
    }

    /// Check one pair.
    ///
    /// Evaluation order:
    /// 1. Block-list (wins even if the scope is also allow-listed)
    /// 2. Allow-list membership
    /// 3. Level permitted for the scope
    pub fn check_scope(
        catalog: &PolicyCatalog,
        scope: &ScopeId,
        level: PermissionLevel,
    ) -> Result<()> {
        if catalog.is_blocked(scope.as_str()) {
            return Err(PolicyError::ScopeBlocked(scope.clone()));
        }

        let permitted = catalog
            .permitted_levels(scope.as_str())
            .ok_or_else(|| PolicyError::ScopeNotAllowed(scope.clone()))?;

        if !permitted.contains(&level) {
            return Err(PolicyError::LevelNotPermitted {
                scope: scope.clone(),
                level,
            });
        }

        Ok(())
    }
}

//! The policy catalog: allow-list with per-scope levels, plus a block-list.
//!
//! A catalog is built once at process start and shared read-only for the
//! lifetime of the process.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::errors::{PolicyError, Result};
use crate::types::{PermissionLevel, ScopeId};

use PermissionLevel::{Read, Write};

const READ_WRITE: &[PermissionLevel] = &[Read, Write];
const READ_ONLY: &[PermissionLevel] = &[Read];

/// Repository-level scopes that may be requested
const BUILTIN_ALLOW: &[(&str, &[PermissionLevel])] = &[
    ("actions", READ_WRITE),
    ("administration", READ_ONLY),
    ("attestations", READ_WRITE),
    ("checks", READ_WRITE),
    ("contents", READ_WRITE),
    ("deployments", READ_WRITE),
    ("discussions", READ_WRITE),
    ("environments", READ_WRITE),
    ("issues", READ_WRITE),
    ("merge_queues", READ_WRITE),
    ("packages", READ_WRITE),
    ("pages", READ_WRITE),
    ("projects", READ_WRITE),
    ("pull_requests", READ_WRITE),
    ("secret_scanning", READ_ONLY),
    ("statuses", READ_WRITE),
    ("workflows", READ_WRITE),
];

/// Scopes that may never be requested
const BUILTIN_BLOCK: &[&str] = &["secrets", "dependabot_secrets"];

/// On-disk form of a catalog
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    allow: BTreeMap<ScopeId, Vec<PermissionLevel>>,
    #[serde(default)]
    block: Vec<ScopeId>,
}

/// Immutable scope policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyCatalog {
    allow: BTreeMap<ScopeId, BTreeSet<PermissionLevel>>,
    block: BTreeSet<ScopeId>,
}

impl PolicyCatalog {
    /// Build a catalog, rejecting allow entries with no permitted level.
    pub fn new<A, L, B>(allow: A, block: B) -> Result<Self>
    where
        A: IntoIterator<Item = (ScopeId, L)>,
        L: IntoIterator<Item = PermissionLevel>,
        B: IntoIterator<Item = ScopeId>,
    {
        let mut entries = BTreeMap::new();
        for (scope, levels) in allow {
            let levels: BTreeSet<_> = levels.into_iter().collect();
            if levels.is_empty() {
                return Err(PolicyError::InvalidCatalog(format!(
                    "scope '{}' has no permitted levels",
                    scope
                )));
            }
            entries.insert(scope, levels);
        }

        Ok(Self {
            allow: entries,
            block: block.into_iter().collect(),
        })
    }

    /// The catalog compiled into the binary
    pub fn builtin() -> Self {
        Self {
            allow: BUILTIN_ALLOW
                .iter()
                .map(|(scope, levels)| (ScopeId::new(*scope), levels.iter().copied().collect()))
                .collect(),
            block: BUILTIN_BLOCK.iter().map(|scope| ScopeId::new(*scope)).collect(),
        }
    }

    /// Parse a JSON catalog: `{"allow": {scope: [levels]}, "block": [scopes]}`
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| PolicyError::InvalidCatalog(e.to_string()))?;
        Self::new(file.allow, file.block)
    }

    /// Load a JSON catalog from disk
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            PolicyError::InvalidCatalog(format!("failed to read {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_json(&json)?;

        tracing::debug!(
            path = %path.display(),
            allowed = catalog.allow.len(),
            blocked = catalog.block.len(),
            "Loaded policy catalog"
        );

        Ok(catalog)
    }

    pub fn is_blocked(&self, scope: &str) -> bool {
        self.block.contains(scope)
    }

    /// Levels permitted for an allow-listed scope; `None` if not allow-listed
    pub fn permitted_levels(&self, scope: &str) -> Option<&BTreeSet<PermissionLevel>> {
        self.allow.get(scope)
    }

    pub fn allowed_scopes(&self) -> impl Iterator<Item = &ScopeId> {
        self.allow.keys()
    }

    pub fn blocked_scopes(&self) -> impl Iterator<Item = &ScopeId> {
        self.block.iter()
    }
}

impl Default for PolicyCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

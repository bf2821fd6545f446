//! # scoped-token-policy
//!
//! Scope request parsing and the fixed policy catalog that decides which
//! scope/level pairs may ever be requested.

#![warn(clippy::all)]

pub mod catalog;
pub mod errors;
pub mod parser;
pub mod types;
pub mod validator;

pub use catalog::PolicyCatalog;
pub use errors::{PolicyError, Result};
pub use parser::{parse_scope_pairs, parse_scopes, RawScopes};
pub use types::*;
pub use validator::PolicyValidator;

//! Key and scope path rules
//!
//! A key is a `/`-delimited path: it starts with `/`, does not end with `/`
//! and has no empty components. A scope is written the same way, and `/` on
//! its own is the root scope. Scopes are implicit: a scope exists exactly
//! when some key lies under it.

use crate::error::{Result, StoreError};

pub const SCOPE_SEPARATOR: char = '/';

/// Check that `key` names an object
pub fn validate_key(key: &str) -> Result<()> {
    if key == "/" || !well_formed(key) {
        return Err(StoreError::BadKey(key.to_string()));
    }
    Ok(())
}

/// Check that `scope` names a scope; the root is allowed
pub fn validate_scope(scope: &str) -> Result<()> {
    if scope == "/" || well_formed(scope) {
        return Ok(());
    }
    Err(StoreError::BadKey(scope.to_string()))
}

fn well_formed(path: &str) -> bool {
    match path.strip_prefix(SCOPE_SEPARATOR) {
        Some(rest) => !rest.is_empty() && rest.split(SCOPE_SEPARATOR).all(|part| !part.is_empty()),
        None => false,
    }
}

/// Final component of a key
pub fn name_of(key: &str) -> &str {
    key.rsplit(SCOPE_SEPARATOR).next().unwrap_or(key)
}

/// Every proper ancestor scope of `key`, excluding the root, shortest first
pub fn ancestors(key: &str) -> impl Iterator<Item = &str> {
    key.char_indices()
        .skip(1)
        .filter(|(_, c)| *c == SCOPE_SEPARATOR)
        .map(move |(i, _)| &key[..i])
}

/// Prefix that every key under `scope` starts with
pub fn scope_prefix(scope: &str) -> String {
    if scope == "/" {
        scope.to_string()
    } else {
        format!("{}{}", scope, SCOPE_SEPARATOR)
    }
}

/// If `key` lies under `scope`, the part of it below the scope
pub fn relative_to<'a>(key: &'a str, scope: &str) -> Option<&'a str> {
    key.strip_prefix(scope_prefix(scope).as_str())
}

/// Case-insensitive form of [`relative_to`]
pub fn relative_to_ignore_case<'a>(key: &'a str, scope: &str) -> Option<&'a str> {
    let prefix = scope_prefix(scope);
    let head = key.get(..prefix.len())?;
    if head.to_lowercase() == prefix.to_lowercase() {
        key.get(prefix.len()..)
    } else {
        None
    }
}

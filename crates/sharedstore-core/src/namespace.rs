//! Namespaces: the identity of a store.
//!
//! A namespace is a validated, non-empty identifier. It doubles as the
//! suffix of the persistence key and of the broadcast channel name, both
//! derived with [`Namespace::storage_key`].

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Prefix separating sharedstore entries from unrelated host storage.
pub const DEFAULT_KEY_PREFIX: &str = "!store::";

/// A validated store namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Validate and wrap a namespace.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_namespace(&name)?;
        Ok(Self(name))
    }

    /// The namespace as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which this namespace is persisted and broadcast.
    pub fn storage_key(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.0)
    }
}

/// Check that `name` is usable as a namespace.
///
/// Rejects the empty string, whitespace-only names and names containing
/// control characters.
pub fn validate_namespace(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "namespace is empty"
    } else if name.trim().is_empty() {
        "namespace is whitespace only"
    } else if name.chars().any(char::is_control) {
        "namespace contains control characters"
    } else {
        return Ok(());
    };

    Err(CoreError::InvalidNamespace {
        namespace: name.to_string(),
        reason,
    })
}

impl TryFrom<String> for Namespace {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Namespace {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Namespace {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

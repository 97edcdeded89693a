//! Credential payloads.
//!
//! A [`CredentialSet`] is built once per handshake on the parent side and
//! delivered exactly once on the child side. The type is deliberately
//! non-`Clone` and non-`Serialize`: the only ways a value leaves the set are
//! an explicit borrow, [`CredentialSet::take`], or consuming iteration, which
//! keeps every copy of a secret accountable. `Debug` output redacts values.
//!
//! Zeroing values after use is the consumer's obligation — once a value has
//! been moved out the set can no longer reach it.

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

use crate::{AppError, Result};

/// A flat mapping of credential names to secret values.
///
/// Names are validated on insert; values are arbitrary strings. Inserting an
/// existing name replaces the previous value, matching JSON object semantics
/// so the two wire encodings behave identically.
#[derive(Default, PartialEq, Eq)]
pub struct CredentialSet {
    entries: BTreeMap<String, String>,
}

impl CredentialSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Whether `name` is a legal credential name.
    ///
    /// Legal names are non-empty, contain no `=` and no control characters,
    /// and do not start with `+`. The `=` and `+` exclusions keep names
    /// unambiguous under the legacy line encoding, where a name opens a
    /// `key=value` line.
    #[must_use]
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && !name.starts_with('+')
            && !name.contains('=')
            && !name.chars().any(char::is_control)
    }

    /// Insert or replace a credential.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when `name` fails
    /// [`CredentialSet::is_valid_name`]. The value is never part of the
    /// error.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        if !Self::is_valid_name(name) {
            return Err(AppError::Config(format!(
                "invalid credential name: {name:?}"
            )));
        }
        self.entries.insert(name.to_owned(), value.into());
        Ok(())
    }

    /// Borrow a credential value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Remove and return a credential value.
    ///
    /// The preferred way to consume a secret: the set drops its copy, so the
    /// caller holds the only one and can overwrite it when done.
    pub fn take(&mut self, name: &str) -> Option<String> {
        self.entries.remove(name)
    }

    /// Number of credentials in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set holds no credentials.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Credential names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Borrowing iterator over `(name, value)` pairs in sorted name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl IntoIterator for CredentialSet {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;

    /// Consume the set, yielding owned `(name, value)` pairs in sorted order.
    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Debug for CredentialSet {
    /// Names in full, values as `<redacted:N bytes>`.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in &self.entries {
            map.entry(name, &format_args!("<redacted:{} bytes>", value.len()));
        }
        map.finish()
    }
}

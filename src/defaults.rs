//! # Default Variables
//!
//! Supplies the names and values of the default variable set that the
//! restore procedure seeds into the common store.
//!
//! The set always contains `namespace`; providers may add more.

use crate::constants::NAMESPACE_VARIABLE_NAME;
use anyhow::{bail, Result};
use std::collections::HashMap;

/// Source of provider-specific default variables
pub trait DefaultVariablesProvider: Send + Sync {
    /// Names this provider contributes
    fn default_variable_names(&self) -> Vec<String>;

    /// Current values for the contributed names
    fn provide(&self) -> HashMap<String, String>;
}

/// Provider that contributes nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDefaultVariables;

impl DefaultVariablesProvider for NoopDefaultVariables {
    fn default_variable_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn provide(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Provider with a fixed set of values, in declaration order
#[derive(Debug, Clone, Default)]
pub struct StaticDefaultVariables {
    entries: Vec<(String, String)>,
}

impl StaticDefaultVariables {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parse a `key=value,key=value` list. Blank items are ignored and a
    /// repeated key keeps its last value.
    ///
    /// # Errors
    ///
    /// Returns an error for an item without `=` or with an empty key.
    pub fn parse(list: &str) -> Result<Self> {
        let mut entries: Vec<(String, String)> = Vec::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let Some((key, value)) = item.split_once('=') else {
                bail!("Invalid default variable '{item}': expected key=value");
            };
            let key = key.trim();
            if key.is_empty() {
                bail!("Invalid default variable '{item}': empty key");
            }
            entries.retain(|(existing, _)| existing != key);
            entries.push((key.to_string(), value.trim().to_string()));
        }
        Ok(Self { entries })
    }
}

impl DefaultVariablesProvider for StaticDefaultVariables {
    fn default_variable_names(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    fn provide(&self) -> HashMap<String, String> {
        self.entries.iter().cloned().collect()
    }
}

/// Immutable snapshot of default variable names, `namespace` first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultVariableSet {
    names: Vec<String>,
}

impl DefaultVariableSet {
    /// Snapshot the provider's names once; duplicates are dropped
    pub fn from_provider(provider: &dyn DefaultVariablesProvider) -> Self {
        let mut names = vec![NAMESPACE_VARIABLE_NAME.to_string()];
        for name in provider.default_variable_names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Self { names }
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

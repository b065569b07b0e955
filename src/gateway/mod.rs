//! # Secret Gateway
//!
//! Capability interface between the key/value variable model and the
//! orchestrator's Secret API.
//!
//! Implementations:
//! - [`cluster::KubeSecretGateway`] - a real cluster, reached either with the
//!   in-cluster service account or with an externally supplied dev token
//!   (see [`client`])
//! - [`memory::InMemorySecretGateway`] - local development stand-in that
//!   applies the same JSON-Patch documents to in-memory Secret objects
//!
//! The strategy is chosen once at startup from [`GatewayMode`].

use crate::error::GatewayError;
use crate::mutation::{PatchCallback, PatchHandle};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

pub mod client;
pub mod cluster;
pub mod memory;

/// Decoded contents of one Secret: key -> value
pub type SecretData = HashMap<String, String>;

/// Secret name -> decoded contents
pub type SecretsByName = HashMap<String, SecretData>;

/// Exact-match label used for discovery
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretLabel {
    pub key: String,
    pub value: String,
}

impl SecretLabel {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Label selector string (`key=value`)
    #[must_use]
    pub fn selector(&self) -> String {
        format!("{}={}", self.key, self.value)
    }
}

impl fmt::Display for SecretLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Key names of one secret with the version they were read at.
///
/// Values are never decoded, so binary entries are fine here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySnapshot {
    pub keys: BTreeSet<String>,
    pub resource_version: Option<String>,
}

impl KeySnapshot {
    #[must_use]
    pub fn of(secret: &Secret) -> Self {
        Self {
            keys: secret
                .data
                .as_ref()
                .map(|data| data.keys().cloned().collect())
                .unwrap_or_default(),
            resource_version: secret.metadata.resource_version.clone(),
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Which gateway strategy the process runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    /// In-cluster service account (production)
    Cluster,
    /// Cluster reached from outside with a bearer token
    Dev,
    /// No cluster at all; in-memory stand-in
    LocalDev,
}

impl GatewayMode {
    /// Mode from the `devmode` / `localdev` switches
    #[must_use]
    pub fn from_flags(devmode: bool, localdev: bool) -> Self {
        match (devmode, localdev) {
            (false, _) => Self::Cluster,
            (true, false) => Self::Dev,
            (true, true) => Self::LocalDev,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cluster => "cluster",
            Self::Dev => "dev",
            Self::LocalDev => "local-dev",
        }
    }
}

/// Operations on named Secrets inside one namespace.
///
/// Every write encodes the whole mutation as one JSON-Patch request and
/// returns the data map as observed by the store after the patch applied.
/// There is no in-process locking per secret name; concurrent writers rely on
/// the store's own patch semantics.
#[async_trait]
pub trait SecretGateway: Send + Sync {
    /// All secrets carrying `label`; zero matches is an empty map.
    async fn list_by_label(&self, label: &SecretLabel) -> Result<SecretsByName, GatewayError>;

    /// Soft get: `Ok(None)` when the secret does not exist. Values that are
    /// not UTF-8 come back with U+FFFD replacements.
    async fn get_by_name(&self, name: &str) -> Result<Option<SecretData>, GatewayError>;

    /// Key names only, `Ok(None)` when the secret does not exist.
    async fn key_snapshot(&self, name: &str) -> Result<Option<KeySnapshot>, GatewayError>;

    /// Hard get: absence is [`GatewayError::NotFound`].
    async fn require_by_name(&self, name: &str) -> Result<SecretData, GatewayError> {
        self.get_by_name(name)
            .await?
            .ok_or_else(|| GatewayError::NotFound {
                name: name.to_string(),
            })
    }

    /// Create a secret with `label` and seed `data`.
    ///
    /// Not idempotent: an existing secret yields [`GatewayError::Conflict`].
    async fn create(
        &self,
        name: &str,
        label: &SecretLabel,
        data: &SecretData,
    ) -> Result<(), GatewayError>;

    /// ADD every entry; with `initialize_container` the data map itself is
    /// created first, replacing whatever map is already there.
    async fn add_keys(
        &self,
        name: &str,
        entries: &[(String, String)],
        initialize_container: bool,
    ) -> Result<SecretData, GatewayError>;

    /// Create the data map and ADD every entry in one request.
    ///
    /// With `resource_version`, the request starts with a JSON-Patch `test`
    /// on `/metadata/resourceVersion`, so a secret written since that version
    /// was read rejects the whole patch instead of losing its keys.
    async fn initialize_keys(
        &self,
        name: &str,
        entries: &[(String, String)],
        resource_version: Option<&str>,
    ) -> Result<SecretData, GatewayError>;

    /// REPLACE every entry; each key must already exist.
    async fn replace_keys(
        &self,
        name: &str,
        entries: &[(String, String)],
    ) -> Result<SecretData, GatewayError>;

    /// REMOVE every key; a missing key rejects the whole patch.
    async fn remove_keys(&self, name: &str, keys: &[String]) -> Result<SecretData, GatewayError>;

    /// Non-blocking [`SecretGateway::remove_keys`].
    ///
    /// The patch is built before returning, so encoding failures surface
    /// here. The request then runs on the tokio runtime and `callback` fires
    /// exactly once with the outcome. Must be called within a tokio runtime.
    fn remove_keys_async(
        &self,
        name: &str,
        keys: &[String],
        callback: PatchCallback,
    ) -> Result<PatchHandle, GatewayError>;
}

/// Owned `(key, value)` pairs from any map, in its iteration order
pub fn entries_of<'a, I>(map: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    map.into_iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_selector() {
        let label = SecretLabel::new("app.kubernetes.io/part-of", "variables");
        assert_eq!(label.selector(), "app.kubernetes.io/part-of=variables");
        assert_eq!(label.to_string(), label.selector());
    }

    #[test]
    fn test_key_snapshot_of_secret_without_data() {
        let mut secret = Secret::default();
        secret.metadata.resource_version = Some("7".to_string());
        let snapshot = KeySnapshot::of(&secret);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.resource_version.as_deref(), Some("7"));
    }

    #[test]
    fn test_gateway_mode_from_flags() {
        assert_eq!(GatewayMode::from_flags(false, false), GatewayMode::Cluster);
        assert_eq!(GatewayMode::from_flags(false, true), GatewayMode::Cluster);
        assert_eq!(GatewayMode::from_flags(true, false), GatewayMode::Dev);
        assert_eq!(GatewayMode::from_flags(true, true), GatewayMode::LocalDev);
    }
}

//! # In-Memory Secret Gateway
//!
//! Local development stand-in for the Secret API. Secrets are kept as real
//! `Secret` objects and every write goes through the same JSON-Patch
//! documents the cluster gateway sends, so patch semantics (missing parents,
//! missing keys, root initialization) behave the way the API server does.
//!
//! A patch is applied to a copy of the stored object and swapped in only when
//! every operation succeeded. Each successful write bumps
//! `metadata.resourceVersion`, so guarded patches see stale reads.

use crate::catalog::{decode_data_lossy, materialize};
use crate::error::GatewayError;
use crate::gateway::{KeySnapshot, SecretData, SecretGateway, SecretLabel, SecretsByName};
use crate::mutation::{PatchCallback, PatchHandle};
use crate::patch::PatchBuilder;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Status reported for a patch the store refused to apply
const UNPROCESSABLE: u16 = 422;

#[derive(Debug, Clone, Default)]
pub struct InMemorySecretGateway {
    secrets: Arc<RwLock<HashMap<String, Secret>>>,
    patches: PatchBuilder,
}

impl InMemorySecretGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw Secret as-is, replacing any secret of the same name
    pub async fn insert(&self, secret: Secret) {
        let name = secret.metadata.name.clone().unwrap_or_default();
        self.secrets.write().await.insert(name, secret);
    }

    /// Raw stored object, if any
    pub async fn raw(&self, name: &str) -> Option<Secret> {
        self.secrets.read().await.get(name).cloned()
    }

    /// Remove a secret entirely
    pub async fn delete(&self, name: &str) -> bool {
        self.secrets.write().await.remove(name).is_some()
    }

    async fn apply(&self, name: &str, patch: json_patch::Patch) -> Result<SecretData, GatewayError> {
        apply_patch(&self.secrets, name, &patch).await
    }
}

fn next_version(current: Option<&str>) -> String {
    current
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(1, |v| v + 1)
        .to_string()
}

fn has_label(secret: &Secret, label: &SecretLabel) -> bool {
    secret
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(&label.key))
        .is_some_and(|value| *value == label.value)
}

async fn apply_patch(
    secrets: &RwLock<HashMap<String, Secret>>,
    name: &str,
    patch: &json_patch::Patch,
) -> Result<SecretData, GatewayError> {
    let mut secrets = secrets.write().await;
    let Some(stored) = secrets.get(name) else {
        return Err(GatewayError::NotFound {
            name: name.to_string(),
        });
    };

    let mut document = serde_json::to_value(stored)?;
    json_patch::patch(&mut document, &patch.0).map_err(|e| GatewayError::Api {
        status: Some(UNPROCESSABLE),
        message: format!("the server rejected our request due to an error in our request: {e}"),
    })?;
    let mut patched: Secret = serde_json::from_value(document)?;
    patched.metadata.resource_version =
        Some(next_version(patched.metadata.resource_version.as_deref()));
    let data = decode_data_lossy(patched.data.as_ref());

    debug!(secret = %name, operations = patch.0.len(), "Applied in-memory secret patch");
    secrets.insert(name.to_string(), patched);
    Ok(data)
}

#[async_trait]
impl SecretGateway for InMemorySecretGateway {
    async fn list_by_label(&self, label: &SecretLabel) -> Result<SecretsByName, GatewayError> {
        let secrets = self.secrets.read().await;
        Ok(materialize(
            secrets
                .values()
                .filter(|secret| has_label(secret, label))
                .cloned(),
        ))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<SecretData>, GatewayError> {
        let secrets = self.secrets.read().await;
        Ok(secrets
            .get(name)
            .map(|secret| decode_data_lossy(secret.data.as_ref())))
    }

    async fn key_snapshot(&self, name: &str) -> Result<Option<KeySnapshot>, GatewayError> {
        Ok(self.secrets.read().await.get(name).map(KeySnapshot::of))
    }

    async fn create(
        &self,
        name: &str,
        label: &SecretLabel,
        data: &SecretData,
    ) -> Result<(), GatewayError> {
        let mut secrets = self.secrets.write().await;
        if secrets.contains_key(name) {
            return Err(GatewayError::Conflict {
                name: name.to_string(),
            });
        }

        // The API server drops an empty data map on create.
        let data = (!data.is_empty()).then(|| {
            data.iter()
                .map(|(k, v)| (k.clone(), ByteString(v.as_bytes().to_vec())))
                .collect()
        });

        secrets.insert(
            name.to_string(),
            Secret {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    labels: Some(BTreeMap::from([(label.key.clone(), label.value.clone())])),
                    resource_version: Some(next_version(None)),
                    ..ObjectMeta::default()
                },
                data,
                ..Secret::default()
            },
        );
        info!(secret = %name, label = %label, "Created in-memory secret");
        Ok(())
    }

    async fn add_keys(
        &self,
        name: &str,
        entries: &[(String, String)],
        initialize_container: bool,
    ) -> Result<SecretData, GatewayError> {
        let patch = self
            .patches
            .add(entries.iter().map(|(k, v)| (k, v)), initialize_container)?;
        self.apply(name, patch).await
    }

    async fn initialize_keys(
        &self,
        name: &str,
        entries: &[(String, String)],
        resource_version: Option<&str>,
    ) -> Result<SecretData, GatewayError> {
        let patch = self.patches.add(entries.iter().map(|(k, v)| (k, v)), true)?;
        let patch = match resource_version {
            Some(version) => PatchBuilder::guarded(patch, version),
            None => patch,
        };
        self.apply(name, patch).await
    }

    async fn replace_keys(
        &self,
        name: &str,
        entries: &[(String, String)],
    ) -> Result<SecretData, GatewayError> {
        let patch = self.patches.replace(entries.iter().map(|(k, v)| (k, v)))?;
        self.apply(name, patch).await
    }

    async fn remove_keys(&self, name: &str, keys: &[String]) -> Result<SecretData, GatewayError> {
        let patch = self.patches.remove(keys);
        self.apply(name, patch).await
    }

    fn remove_keys_async(
        &self,
        name: &str,
        keys: &[String],
        callback: PatchCallback,
    ) -> Result<PatchHandle, GatewayError> {
        let patch = self.patches.remove(keys);
        let secrets = Arc::clone(&self.secrets);
        let name = name.to_string();

        Ok(PatchHandle::spawn(
            async move { apply_patch(&secrets, &name, &patch).await },
            callback,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label() -> SecretLabel {
        SecretLabel::new("variables.integration.platform/type", "secured")
    }

    fn entries(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_with_empty_data_has_no_container() {
        let gateway = InMemorySecretGateway::new();
        gateway.create("vars", &label(), &SecretData::new()).await.unwrap();

        assert!(gateway.raw("vars").await.unwrap().data.is_none());
        assert_eq!(gateway.get_by_name("vars").await.unwrap(), Some(SecretData::new()));
    }

    #[tokio::test]
    async fn test_add_without_container_is_rejected() {
        let gateway = InMemorySecretGateway::new();
        gateway.create("vars", &label(), &SecretData::new()).await.unwrap();

        let err = gateway
            .add_keys("vars", &entries(&[("a", "1")]), false)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Api { status: Some(422), .. }));

        let data = gateway
            .add_keys("vars", &entries(&[("a", "1")]), true)
            .await
            .unwrap();
        assert_eq!(data, SecretData::from([("a".to_string(), "1".to_string())]));
    }

    #[tokio::test]
    async fn test_failed_patch_leaves_secret_untouched() {
        let gateway = InMemorySecretGateway::new();
        let seed = SecretData::from([("a".to_string(), "1".to_string())]);
        gateway.create("vars", &label(), &seed).await.unwrap();

        let err = gateway
            .remove_keys("vars", &["a".to_string(), "missing".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Api { .. }));
        assert_eq!(gateway.get_by_name("vars").await.unwrap(), Some(seed));
    }

    #[tokio::test]
    async fn test_patch_on_missing_secret_is_not_found() {
        let gateway = InMemorySecretGateway::new();
        let err = gateway
            .replace_keys("absent", &entries(&[("a", "1")]))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_writes_bump_resource_version() {
        let gateway = InMemorySecretGateway::new();
        gateway.create("vars", &label(), &SecretData::new()).await.unwrap();
        let before = gateway.key_snapshot("vars").await.unwrap().unwrap();
        assert_eq!(before.resource_version.as_deref(), Some("1"));

        gateway
            .initialize_keys("vars", &entries(&[("a", "1")]), Some("1"))
            .await
            .unwrap();
        let after = gateway.key_snapshot("vars").await.unwrap().unwrap();
        assert_eq!(after.resource_version.as_deref(), Some("2"));
        assert!(after.contains("a"));
    }

    #[tokio::test]
    async fn test_stale_initializer_is_rejected() {
        let gateway = InMemorySecretGateway::new();
        gateway.create("vars", &label(), &SecretData::new()).await.unwrap();
        gateway
            .initialize_keys("vars", &entries(&[("a", "1")]), Some("1"))
            .await
            .unwrap();

        let err = gateway
            .initialize_keys("vars", &entries(&[("b", "2")]), Some("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Api { status: Some(422), .. }));
        assert_eq!(
            gateway.get_by_name("vars").await.unwrap(),
            Some(SecretData::from([("a".to_string(), "1".to_string())]))
        );
    }

    #[tokio::test]
    async fn test_key_snapshot_ignores_binary_values() {
        let gateway = InMemorySecretGateway::new();
        gateway
            .insert(Secret {
                metadata: ObjectMeta {
                    name: Some("binary".to_string()),
                    labels: Some(BTreeMap::from([(label().key, label().value)])),
                    ..ObjectMeta::default()
                },
                data: Some(BTreeMap::from([(
                    "keystore".to_string(),
                    ByteString(vec![0xff, 0xfe, 0x00]),
                )])),
                ..Secret::default()
            })
            .await;

        let snapshot = gateway.key_snapshot("binary").await.unwrap().unwrap();
        assert!(snapshot.contains("keystore"));
        let decoded = gateway.get_by_name("binary").await.unwrap().unwrap();
        assert!(decoded["keystore"].starts_with('\u{fffd}'));
        assert!(gateway.list_by_label(&label()).await.unwrap().is_empty());
        assert!(gateway.key_snapshot("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_on_exact_label() {
        let gateway = InMemorySecretGateway::new();
        gateway.create("one", &label(), &SecretData::new()).await.unwrap();
        gateway
            .create(
                "other",
                &SecretLabel::new("variables.integration.platform/type", "plain"),
                &SecretData::new(),
            )
            .await
            .unwrap();

        let listed = gateway.list_by_label(&label()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed.contains_key("one"));
    }
}

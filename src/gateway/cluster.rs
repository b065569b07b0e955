//! # Kubernetes Secret Gateway
//!
//! [`SecretGateway`] over the core/v1 Secret API of one namespace.
//!
//! This module provides:
//! - Label-selector listing (404 is an empty result)
//! - Soft reads (404 is `None`), including key-only snapshots
//! - Create with 409 classified as `Conflict`
//! - JSON-Patch writes, one request per logical mutation
//! - Async removal bound to a [`PatchHandle`]

use crate::catalog::{decode_data_lossy, materialize};
use crate::constants::KUBE_API_ERROR_MESSAGE;
use crate::error::GatewayError;
use crate::gateway::{KeySnapshot, SecretData, SecretGateway, SecretLabel, SecretsByName};
use crate::metrics;
use crate::mutation::{PatchCallback, PatchHandle};
use crate::patch::PatchBuilder;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, error, info};

/// Secret gateway backed by a Kubernetes cluster
#[derive(Clone)]
pub struct KubeSecretGateway {
    api: Api<Secret>,
    namespace: String,
    patches: PatchBuilder,
}

impl std::fmt::Debug for KubeSecretGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretGateway")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl KubeSecretGateway {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            patches: PatchBuilder::secret_data(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Log a classified failure and hand it back
fn log_failure(name: &str, error: GatewayError) -> GatewayError {
    match &error {
        GatewayError::Api { message, .. } => {
            error!(secret = %name, "{} {}", KUBE_API_ERROR_MESSAGE, message);
        }
        GatewayError::Serialization(e) => {
            error!(secret = %name, "Unable to serialize secret patch request: {}", e);
        }
        other => debug!(secret = %name, "{}", other),
    }
    error
}

/// Submit one JSON-Patch document and echo the resulting data map
async fn submit_patch(
    api: &Api<Secret>,
    name: &str,
    patch: json_patch::Patch,
    operation: &str,
) -> Result<SecretData, GatewayError> {
    let start = Instant::now();
    debug!(secret = %name, operations = patch.0.len(), "Submitting secret patch");

    let result = match api
        .patch(name, &PatchParams::default(), &Patch::Json::<()>(patch))
        .await
    {
        Ok(secret) => Ok(decode_data_lossy(secret.data.as_ref())),
        Err(e) => Err(log_failure(name, GatewayError::from_kube(name, e))),
    };

    metrics::record_gateway_operation(operation, start, &result);
    result
}

#[async_trait]
impl SecretGateway for KubeSecretGateway {
    async fn list_by_label(&self, label: &SecretLabel) -> Result<SecretsByName, GatewayError> {
        let start = Instant::now();
        let params = ListParams::default().labels(&label.selector());

        let result = match self.api.list(&params).await {
            Ok(list) => Ok(materialize(list.items)),
            Err(e) => match GatewayError::from_kube(&label.selector(), e) {
                GatewayError::NotFound { .. } => Ok(SecretsByName::new()),
                other => Err(log_failure(&label.selector(), other)),
            },
        };

        metrics::record_gateway_operation("list_by_label", start, &result);
        result
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<SecretData>, GatewayError> {
        let start = Instant::now();

        let result = match self.api.get(name).await {
            Ok(secret) => Ok(Some(decode_data_lossy(secret.data.as_ref()))),
            Err(e) => match GatewayError::from_kube(name, e) {
                GatewayError::NotFound { .. } => Ok(None),
                other => Err(log_failure(name, other)),
            },
        };

        metrics::record_gateway_operation("get_by_name", start, &result);
        result
    }

    async fn key_snapshot(&self, name: &str) -> Result<Option<KeySnapshot>, GatewayError> {
        let start = Instant::now();

        let result = match self.api.get(name).await {
            Ok(secret) => Ok(Some(KeySnapshot::of(&secret))),
            Err(e) => match GatewayError::from_kube(name, e) {
                GatewayError::NotFound { .. } => Ok(None),
                other => Err(log_failure(name, other)),
            },
        };

        metrics::record_gateway_operation("key_snapshot", start, &result);
        result
    }

    async fn create(
        &self,
        name: &str,
        label: &SecretLabel,
        data: &SecretData,
    ) -> Result<(), GatewayError> {
        let start = Instant::now();
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([(label.key.clone(), label.value.clone())])),
                ..ObjectMeta::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.clone(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Secret::default()
        };

        let result = match self.api.create(&PostParams::default(), &secret).await {
            Ok(_) => {
                info!(secret = %name, label = %label, "Created secret");
                Ok(())
            }
            Err(e) => Err(log_failure(name, GatewayError::from_kube(name, e))),
        };

        metrics::record_gateway_operation("create", start, &result);
        result
    }

    async fn add_keys(
        &self,
        name: &str,
        entries: &[(String, String)],
        initialize_container: bool,
    ) -> Result<SecretData, GatewayError> {
        let patch = self
            .patches
            .add(entries.iter().map(|(k, v)| (k, v)), initialize_container)
            .map_err(|e| log_failure(name, e))?;
        submit_patch(&self.api, name, patch, "add_keys").await
    }

    async fn initialize_keys(
        &self,
        name: &str,
        entries: &[(String, String)],
        resource_version: Option<&str>,
    ) -> Result<SecretData, GatewayError> {
        let patch = self
            .patches
            .add(entries.iter().map(|(k, v)| (k, v)), true)
            .map_err(|e| log_failure(name, e))?;
        let patch = match resource_version {
            Some(version) => PatchBuilder::guarded(patch, version),
            None => patch,
        };
        submit_patch(&self.api, name, patch, "initialize_keys").await
    }

    async fn replace_keys(
        &self,
        name: &str,
        entries: &[(String, String)],
    ) -> Result<SecretData, GatewayError> {
        let patch = self
            .patches
            .replace(entries.iter().map(|(k, v)| (k, v)))
            .map_err(|e| log_failure(name, e))?;
        submit_patch(&self.api, name, patch, "replace_keys").await
    }

    async fn remove_keys(&self, name: &str, keys: &[String]) -> Result<SecretData, GatewayError> {
        let patch = self.patches.remove(keys);
        submit_patch(&self.api, name, patch, "remove_keys").await
    }

    fn remove_keys_async(
        &self,
        name: &str,
        keys: &[String],
        callback: PatchCallback,
    ) -> Result<PatchHandle, GatewayError> {
        let patch = self.patches.remove(keys);
        let api = self.api.clone();
        let name = name.to_string();

        Ok(PatchHandle::spawn(
            async move { submit_patch(&api, &name, patch, "remove_keys_async").await },
            callback,
        ))
    }
}

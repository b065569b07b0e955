//! # Secured Variables
//!
//! Consumer-facing operations on secret-backed variables, built on a
//! [`SecretGateway`]. The service owns the name of the well-known secured
//! variables secret and the label used to discover secured secrets.

use crate::catalog::SecretCatalog;
use crate::error::GatewayError;
use crate::gateway::{
    entries_of, KeySnapshot, SecretData, SecretGateway, SecretLabel, SecretsByName,
};
use crate::mutation::{PatchCallback, PatchHandle};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct SecuredVariableService {
    gateway: Arc<dyn SecretGateway>,
    catalog: SecretCatalog,
    secret_name: String,
}

impl std::fmt::Debug for SecuredVariableService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecuredVariableService")
            .field("secret_name", &self.secret_name)
            .field("label", self.catalog.label())
            .finish_non_exhaustive()
    }
}

impl SecuredVariableService {
    pub fn new(
        gateway: Arc<dyn SecretGateway>,
        label: SecretLabel,
        secret_name: impl Into<String>,
    ) -> Self {
        Self {
            catalog: SecretCatalog::new(Arc::clone(&gateway), label),
            gateway,
            secret_name: secret_name.into(),
        }
    }

    /// Name of the well-known secured variables secret
    #[must_use]
    pub fn secured_secret_name(&self) -> &str {
        &self.secret_name
    }

    #[must_use]
    pub fn label(&self) -> &SecretLabel {
        self.catalog.label()
    }

    /// Make sure the secret exists; an existing one is left untouched.
    ///
    /// # Errors
    ///
    /// Propagates every gateway failure except `Conflict`.
    pub async fn create_secured_variables_secret(&self, name: &str) -> Result<(), GatewayError> {
        match self
            .gateway
            .create(name, self.catalog.label(), &SecretData::new())
            .await
        {
            Ok(()) => Ok(()),
            Err(GatewayError::Conflict { .. }) => {
                debug!(secret = %name, "Secured variables secret already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Every labelled secured secret with its variables
    ///
    /// # Errors
    ///
    /// Propagates gateway failures other than not-found.
    pub async fn get_all_variables(&self) -> Result<SecretsByName, GatewayError> {
        self.catalog.list().await
    }

    /// Variables of one secret; the secret must exist
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotFound`] when the secret is absent.
    pub async fn get_variables(&self, name: &str) -> Result<SecretData, GatewayError> {
        self.gateway.require_by_name(name).await
    }

    /// Add variables, creating the data map first when the secret has none.
    ///
    /// Only key names are read to make that decision. The initializing patch
    /// is guarded by the resource version that read returned, so a concurrent
    /// writer that filled the map in between makes this call fail with a 422
    /// instead of having its keys replaced.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotFound`] when the secret is absent; otherwise any
    /// rejection of the patch (for example an existing key the store refuses
    /// to overwrite, or a stale initializer).
    pub async fn add_variables(
        &self,
        name: &str,
        variables: &HashMap<String, String>,
    ) -> Result<SecretData, GatewayError> {
        let snapshot = self.require_keys(name).await?;
        let entries = entries_of(variables);
        let data = if snapshot.is_empty() {
            self.gateway
                .initialize_keys(name, &entries, snapshot.resource_version.as_deref())
                .await?
        } else {
            self.gateway.add_keys(name, &entries, false).await?
        };
        info!(secret = %name, count = variables.len(), "Added secured variables");
        Ok(data)
    }

    /// Overwrite existing variables; every key must already exist.
    ///
    /// # Errors
    ///
    /// Fails when the secret or one of the keys is absent.
    pub async fn update_variables(
        &self,
        name: &str,
        variables: &HashMap<String, String>,
    ) -> Result<SecretData, GatewayError> {
        let data = self
            .gateway
            .replace_keys(name, &entries_of(variables))
            .await?;
        info!(secret = %name, count = variables.len(), "Updated secured variables");
        Ok(data)
    }

    /// Remove variables.
    ///
    /// With `fail_if_not_exist`, every key must be present and the secret
    /// must exist. Without it, only keys currently present are removed and an
    /// absent secret yields an empty map.
    ///
    /// # Errors
    ///
    /// Propagates gateway failures; see above for absence handling.
    pub async fn delete_variables(
        &self,
        name: &str,
        keys: &[String],
        fail_if_not_exist: bool,
    ) -> Result<SecretData, GatewayError> {
        if fail_if_not_exist {
            let data = self.gateway.remove_keys(name, keys).await?;
            info!(secret = %name, keys = ?keys, "Removed secured variables");
            return Ok(data);
        }

        let Some(snapshot) = self.gateway.key_snapshot(name).await? else {
            debug!(secret = %name, "Secret absent, nothing to remove");
            return Ok(SecretData::new());
        };

        let present = present_keys(&snapshot, keys);
        if present.is_empty() {
            debug!(secret = %name, "None of the keys are present, nothing to remove");
            return self.gateway.get_by_name(name).await.map(Option::unwrap_or_default);
        }

        match self.gateway.remove_keys(name, &present).await {
            Ok(data) => {
                info!(secret = %name, keys = ?present, "Removed secured variables");
                Ok(data)
            }
            Err(GatewayError::NotFound { .. }) => Ok(SecretData::new()),
            Err(e) => Err(e),
        }
    }

    async fn require_keys(&self, name: &str) -> Result<KeySnapshot, GatewayError> {
        self.gateway
            .key_snapshot(name)
            .await?
            .ok_or_else(|| GatewayError::NotFound {
                name: name.to_string(),
            })
    }

    /// Non-blocking removal; `callback` fires exactly once.
    ///
    /// # Errors
    ///
    /// Only failures to build the request surface here; request failures go
    /// to the callback.
    pub fn delete_variables_async(
        &self,
        name: &str,
        keys: &[String],
        callback: PatchCallback,
    ) -> Result<PatchHandle, GatewayError> {
        self.gateway.remove_keys_async(name, keys, callback)
    }
}

/// Requested keys present in `current`, in request order, without repeats
fn present_keys(current: &KeySnapshot, keys: &[String]) -> Vec<String> {
    let mut present: Vec<String> = Vec::new();
    for key in keys {
        if current.contains(key) && !present.contains(key) {
            present.push(key.clone());
        }
    }
    present
}

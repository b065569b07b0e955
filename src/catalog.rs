//! # Label-Indexed Secret Catalog
//!
//! Materializes Secret objects into `name -> key/value map` form.
//!
//! A Secret is skipped (never inserted with partial or empty data) when its
//! name is missing or when one of its values is not UTF-8. Single-secret
//! reads and write responses decode lossily instead.

use crate::error::GatewayError;
use crate::gateway::{SecretData, SecretGateway, SecretLabel, SecretsByName};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decode a Secret's data map
///
/// # Errors
///
/// Returns [`GatewayError::InvalidData`] naming the first key whose value is
/// not UTF-8.
pub fn decode_data(
    name: &str,
    data: Option<&BTreeMap<String, ByteString>>,
) -> Result<SecretData, GatewayError> {
    let Some(data) = data else {
        return Ok(SecretData::new());
    };

    data.iter()
        .map(|(key, value)| {
            String::from_utf8(value.0.clone())
                .map(|decoded| (key.clone(), decoded))
                .map_err(|_not_utf8| GatewayError::InvalidData {
                    name: name.to_string(),
                    key: key.clone(),
                })
        })
        .collect()
}

/// Decode a data map, replacing invalid UTF-8 with U+FFFD
#[must_use]
pub fn decode_data_lossy(data: Option<&BTreeMap<String, ByteString>>) -> SecretData {
    data.map(|data| {
        data.iter()
            .map(|(key, value)| (key.clone(), String::from_utf8_lossy(&value.0).into_owned()))
            .collect()
    })
    .unwrap_or_default()
}

/// Decode one Secret into `(name, data)`, or `None` if it is unreadable
#[must_use]
pub fn decode_secret(secret: &Secret) -> Option<(String, SecretData)> {
    let Some(name) = secret.metadata.name.as_deref() else {
        warn!("Skipping secret without metadata.name");
        return None;
    };

    match decode_data(name, secret.data.as_ref()) {
        Ok(data) => Some((name.to_string(), data)),
        Err(e) => {
            warn!(secret = %name, "Skipping undecodable secret: {}", e);
            None
        }
    }
}

/// Decode a list of Secrets, skipping unreadable ones
pub fn materialize<I>(secrets: I) -> SecretsByName
where
    I: IntoIterator<Item = Secret>,
{
    secrets
        .into_iter()
        .filter_map(|secret| decode_secret(&secret))
        .collect()
}

/// Catalog bound to one discovery label
#[derive(Clone)]
pub struct SecretCatalog {
    gateway: Arc<dyn SecretGateway>,
    label: SecretLabel,
}

impl std::fmt::Debug for SecretCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCatalog")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl SecretCatalog {
    pub fn new(gateway: Arc<dyn SecretGateway>, label: SecretLabel) -> Self {
        Self { gateway, label }
    }

    #[must_use]
    pub fn label(&self) -> &SecretLabel {
        &self.label
    }

    /// Every secret carrying the catalog label, with its contents
    ///
    /// # Errors
    ///
    /// Propagates gateway failures other than not-found.
    pub async fn list(&self) -> Result<SecretsByName, GatewayError> {
        let secrets = self.gateway.list_by_label(&self.label).await?;
        debug!(label = %self.label, count = secrets.len(), "Listed labelled secrets");
        Ok(secrets)
    }

    /// Names of the labelled secrets, sorted
    ///
    /// # Errors
    ///
    /// Propagates gateway failures other than not-found.
    pub async fn names(&self) -> Result<Vec<String>, GatewayError> {
        let mut names: Vec<String> = self.list().await?.into_keys().collect();
        names.sort();
        Ok(names)
    }
}

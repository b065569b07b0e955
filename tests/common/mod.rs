//! Common test utilities
//!
//! Shared fixtures for the integration tests: the discovery label, entry
//! helpers, and a gateway wrapper that fails a configurable number of calls.

#![allow(dead_code, reason = "Not every test binary uses every helper")]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use variables_management::error::GatewayError;
use variables_management::gateway::memory::InMemorySecretGateway;
use variables_management::gateway::{
    KeySnapshot, SecretData, SecretGateway, SecretLabel, SecretsByName,
};
use variables_management::mutation::{PatchCallback, PatchHandle};

static TRACING_INIT: Once = Once::new();

/// Initialize a test tracing subscriber once per test binary
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "variables_management=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

pub const SECURED_SECRET: &str = "secured-variables-v2";

pub fn secured_label() -> SecretLabel {
    SecretLabel::new("variables.integration.platform/type", "secured")
}

pub fn entries(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

pub fn data(pairs: &[(&str, &str)]) -> SecretData {
    entries(pairs).into_iter().collect()
}

pub fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|k| (*k).to_string()).collect()
}

/// Gateway whose first `failures` calls fail with a 503 before delegating
#[derive(Debug, Clone)]
pub struct FlakyGateway {
    inner: InMemorySecretGateway,
    remaining_failures: Arc<AtomicU32>,
    calls: Arc<AtomicU32>,
}

impl FlakyGateway {
    pub fn new(inner: InMemorySecretGateway, failures: u32) -> Self {
        Self {
            inner,
            remaining_failures: Arc::new(AtomicU32::new(failures)),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(GatewayError::Api {
                status: Some(503),
                message: "service unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SecretGateway for FlakyGateway {
    async fn list_by_label(&self, label: &SecretLabel) -> Result<SecretsByName, GatewayError> {
        self.check()?;
        self.inner.list_by_label(label).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<SecretData>, GatewayError> {
        self.check()?;
        self.inner.get_by_name(name).await
    }

    async fn key_snapshot(&self, name: &str) -> Result<Option<KeySnapshot>, GatewayError> {
        self.check()?;
        self.inner.key_snapshot(name).await
    }

    async fn create(
        &self,
        name: &str,
        label: &SecretLabel,
        data: &SecretData,
    ) -> Result<(), GatewayError> {
        self.check()?;
        self.inner.create(name, label, data).await
    }

    async fn add_keys(
        &self,
        name: &str,
        entries: &[(String, String)],
        initialize_container: bool,
    ) -> Result<SecretData, GatewayError> {
        self.check()?;
        self.inner.add_keys(name, entries, initialize_container).await
    }

    async fn initialize_keys(
        &self,
        name: &str,
        entries: &[(String, String)],
        resource_version: Option<&str>,
    ) -> Result<SecretData, GatewayError> {
        self.check()?;
        self.inner
            .initialize_keys(name, entries, resource_version)
            .await
    }

    async fn replace_keys(
        &self,
        name: &str,
        entries: &[(String, String)],
    ) -> Result<SecretData, GatewayError> {
        self.check()?;
        self.inner.replace_keys(name, entries).await
    }

    async fn remove_keys(&self, name: &str, keys: &[String]) -> Result<SecretData, GatewayError> {
        self.check()?;
        self.inner.remove_keys(name, keys).await
    }

    fn remove_keys_async(
        &self,
        name: &str,
        keys: &[String],
        callback: PatchCallback,
    ) -> Result<PatchHandle, GatewayError> {
        self.check()?;
        self.inner.remove_keys_async(name, keys, callback)
    }
}

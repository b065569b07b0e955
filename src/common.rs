//! # Common Variables
//!
//! The non-secret variable store the restore procedure seeds defaults into.
//! Its persistence lives outside this crate; [`InMemoryCommonVariables`] is
//! the local stand-in.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[async_trait]
pub trait CommonVariablesService: Send + Sync {
    /// Bulk upsert without audit records; existing keys are overwritten.
    async fn add_variables_unlogged(&self, variables: &HashMap<String, String>) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCommonVariables {
    variables: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryCommonVariables {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.variables.read().await.clone()
    }
}

#[async_trait]
impl CommonVariablesService for InMemoryCommonVariables {
    async fn add_variables_unlogged(&self, variables: &HashMap<String, String>) -> Result<()> {
        let mut stored = self.variables.write().await;
        stored.extend(variables.iter().map(|(k, v)| (k.clone(), v.clone())));
        debug!(count = variables.len(), "Seeded common variables");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_overwrites_existing() {
        let store = InMemoryCommonVariables::new();
        store
            .add_variables_unlogged(&HashMap::from([("namespace".to_string(), "a".to_string())]))
            .await
            .unwrap();
        store
            .add_variables_unlogged(&HashMap::from([("namespace".to_string(), "b".to_string())]))
            .await
            .unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["namespace"], "b");
    }
}

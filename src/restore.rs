//! # Variable Baseline Restore
//!
//! Restores the baseline after startup or on demand:
//!
//! 1. The secured variables secret exists (an existing one counts as done).
//! 2. Default values are computed: `namespace`, overlaid by provider values.
//! 3. Defaults are upserted into the common store without audit records.
//! 4. Default keys still lingering in the secured secret are pruned.
//!
//! An attempt either completes all four steps or counts as failed. Failed
//! attempts are retried under a [`RetryPolicy`]; permanent errors are not.
//! Every step is reentrant, so repeated runs converge to the same state.

use crate::common::CommonVariablesService;
use crate::constants::{NAMESPACE_VARIABLE_NAME, RESTORE_FAILURE_ERROR_CODE};
use crate::defaults::{DefaultVariableSet, DefaultVariablesProvider};
use crate::error::RestoreError;
use crate::metrics;
use crate::retry::{retry, RetryPolicy};
use crate::secured::SecuredVariableService;
use crate::server::Readiness;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct VariablesRestorer {
    secured: SecuredVariableService,
    common: Arc<dyn CommonVariablesService>,
    provider: Arc<dyn DefaultVariablesProvider>,
    defaults: DefaultVariableSet,
    namespace: String,
    policy: RetryPolicy,
    readiness: Option<Readiness>,
}

impl std::fmt::Debug for VariablesRestorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariablesRestorer")
            .field("secured", &self.secured)
            .field("defaults", &self.defaults)
            .field("namespace", &self.namespace)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl VariablesRestorer {
    pub fn new(
        secured: SecuredVariableService,
        common: Arc<dyn CommonVariablesService>,
        provider: Arc<dyn DefaultVariablesProvider>,
        namespace: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        let defaults = DefaultVariableSet::from_provider(provider.as_ref());
        Self {
            secured,
            common,
            provider,
            defaults,
            namespace: namespace.into(),
            policy,
            readiness: None,
        }
    }

    /// Report readiness through `readiness`: not ready while a restore runs,
    /// ready once one succeeds
    #[must_use]
    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = Some(readiness);
        self
    }

    #[must_use]
    pub fn defaults(&self) -> &DefaultVariableSet {
        &self.defaults
    }

    /// Current default values: `namespace` from the deployment, then the
    /// provider's values on top
    #[must_use]
    pub fn default_common_variables(&self) -> HashMap<String, String> {
        let mut values =
            HashMap::from([(NAMESPACE_VARIABLE_NAME.to_string(), self.namespace.clone())]);
        values.extend(self.provider.provide());
        values
    }

    /// Run the restore with retry.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's error once the budget is spent, or the
    /// first permanent error.
    pub async fn restore_variables(&self) -> Result<(), RestoreError> {
        let max_attempts = self.policy.max_attempts();
        if let Some(readiness) = &self.readiness {
            readiness.mark_restoring();
        }

        let result = retry(
            &self.policy,
            "restore_variables",
            RestoreError::is_permanent,
            |attempt| async move {
                metrics::increment_restore_attempts();
                let outcome = self.restore_once().await;
                if let Err(e) = &outcome {
                    metrics::increment_restore_failures();
                    warn!(
                        error_code = RESTORE_FAILURE_ERROR_CODE,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        "Restore of default variables failed: {}",
                        e
                    );
                }
                outcome
            },
        )
        .await;

        if result.is_ok() {
            metrics::increment_restore_success();
            if let Some(readiness) = &self.readiness {
                readiness.mark_ready();
            }
        }
        result
    }

    /// One full attempt of the four restore steps
    ///
    /// # Errors
    ///
    /// The first failing step aborts the attempt.
    pub async fn restore_once(&self) -> Result<(), RestoreError> {
        let secret_name = self.secured.secured_secret_name();
        self.secured
            .create_secured_variables_secret(secret_name)
            .await?;

        let values = self.default_common_variables();
        self.common
            .add_variables_unlogged(&values)
            .await
            .map_err(RestoreError::CommonVariables)?;

        let keys = self.keys_to_prune(&values);
        self.secured
            .delete_variables(secret_name, &keys, false)
            .await?;

        info!(
            secret = %secret_name,
            count = values.len(),
            "Restored default variables"
        );
        Ok(())
    }

    /// Exactly the keys seeded into the common store, sorted
    fn keys_to_prune(&self, values: &HashMap<String, String>) -> Vec<String> {
        for name in self.defaults.names() {
            if !values.contains_key(name) {
                warn!(variable = %name, "Default variable declared without a value");
            }
        }

        let mut keys: Vec<String> = values.keys().cloned().collect();
        keys.sort();
        keys
    }
}

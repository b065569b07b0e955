//! # Configuration
//!
//! Service settings loaded from environment variables.
//!
//! All settings have defaults (see [`crate::constants`]) and can be
//! overridden via environment variables, typically populated from a
//! ConfigMap using `envFrom` in the deployment.

use crate::constants::{
    DEFAULT_METRICS_PORT, DEFAULT_NAMESPACE, DEFAULT_RESTORE_MAX_ATTEMPTS,
    DEFAULT_RESTORE_RETRY_DELAY_MS, DEFAULT_SECURED_VARIABLES_LABEL_KEY,
    DEFAULT_SECURED_VARIABLES_LABEL_VALUE, DEFAULT_SECURED_VARIABLES_SECRET_NAME,
    DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH,
};
use crate::gateway::{GatewayMode, SecretLabel};
use crate::retry::RetryPolicy;
use secrecy::SecretString;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Kubernetes connection settings
#[derive(Debug, Clone)]
pub struct KubernetesConfig {
    /// Namespace holding the secured variables secret
    pub namespace: String,
    /// Use an externally authenticated client instead of the pod's service account
    pub devmode: bool,
    /// With `devmode`, do not talk to a cluster at all
    pub localdev: bool,
    /// API server URI override
    pub cluster_uri: Option<String>,
    /// Token file used in cluster mode
    pub service_account_token_path: String,
    /// Bearer token used in dev mode
    pub cluster_token: Option<SecretString>,
}

impl KubernetesConfig {
    #[must_use]
    pub fn mode(&self) -> GatewayMode {
        GatewayMode::from_flags(self.devmode, self.localdev)
    }
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            devmode: false,
            localdev: false,
            cluster_uri: None,
            service_account_token_path: DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH.to_string(),
            cluster_token: None,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub kubernetes: KubernetesConfig,
    /// Well-known secret holding secured variables
    pub secured_secret_name: String,
    /// Discovery label key for secured-variable secrets
    pub secured_label_key: String,
    /// Discovery label value for secured-variable secrets
    pub secured_label_value: String,
    /// Restore attempt budget
    pub restore_max_attempts: u32,
    /// Delay between restore attempts (milliseconds)
    pub restore_retry_delay_ms: u64,
    /// Re-run the restore when the secured secret is deleted
    pub restore_on_secret_delete: bool,
    /// `k=v,k=v` seed for the default variables provider
    pub default_variables: Option<String>,
    /// Port for metrics and probes
    pub metrics_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            kubernetes: KubernetesConfig::default(),
            secured_secret_name: DEFAULT_SECURED_VARIABLES_SECRET_NAME.to_string(),
            secured_label_key: DEFAULT_SECURED_VARIABLES_LABEL_KEY.to_string(),
            secured_label_value: DEFAULT_SECURED_VARIABLES_LABEL_VALUE.to_string(),
            restore_max_attempts: DEFAULT_RESTORE_MAX_ATTEMPTS,
            restore_retry_delay_ms: DEFAULT_RESTORE_RETRY_DELAY_MS,
            restore_on_secret_delete: true,
            default_variables: None,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup; unset or unusable values keep
    /// their defaults
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let defaults = Self::default();

        let namespace = vars
            .non_empty("KUBERNETES_NAMESPACE")
            .or_else(|| vars.non_empty("POD_NAMESPACE"))
            .unwrap_or(defaults.kubernetes.namespace);

        Self {
            kubernetes: KubernetesConfig {
                namespace,
                devmode: vars.flag("KUBERNETES_DEVMODE", false),
                localdev: vars.flag("KUBERNETES_LOCALDEV", false),
                cluster_uri: vars.non_empty("KUBERNETES_CLUSTER_URI"),
                service_account_token_path: vars
                    .non_empty("KUBERNETES_SERVICE_ACCOUNT_TOKEN")
                    .unwrap_or(defaults.kubernetes.service_account_token_path),
                cluster_token: vars
                    .non_empty("KUBERNETES_CLUSTER_TOKEN")
                    .map(SecretString::from),
            },
            secured_secret_name: vars
                .non_empty("SECURED_VARIABLES_SECRET_NAME")
                .unwrap_or(defaults.secured_secret_name),
            secured_label_key: vars
                .non_empty("SECURED_VARIABLES_LABEL_KEY")
                .unwrap_or(defaults.secured_label_key),
            secured_label_value: vars
                .non_empty("SECURED_VARIABLES_LABEL_VALUE")
                .unwrap_or(defaults.secured_label_value),
            restore_max_attempts: vars
                .parsed("RESTORE_MAX_ATTEMPTS")
                .unwrap_or(defaults.restore_max_attempts),
            restore_retry_delay_ms: vars
                .parsed("RESTORE_RETRY_DELAY_MS")
                .unwrap_or(defaults.restore_retry_delay_ms),
            restore_on_secret_delete: vars
                .flag("RESTORE_ON_SECRET_DELETE", defaults.restore_on_secret_delete),
            default_variables: vars.non_empty("DEFAULT_VARIABLES"),
            metrics_port: vars.parsed("METRICS_PORT").unwrap_or(defaults.metrics_port),
        }
    }

    /// Discovery label for secured-variable secrets
    #[must_use]
    pub fn secured_label(&self) -> SecretLabel {
        SecretLabel::new(&self.secured_label_key, &self.secured_label_value)
    }

    /// Retry policy for the default variable restore
    #[must_use]
    pub fn restore_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.restore_max_attempts,
            Duration::from_millis(self.restore_retry_delay_ms),
        )
    }
}

/// Typed reads over a key lookup
struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn non_empty(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.non_empty(key)?;
        let value = raw.parse().ok();
        if value.is_none() {
            warn!(variable = key, value = %raw, "Ignoring unparseable setting");
        }
        value
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.non_empty(key).map(|v| v.to_ascii_lowercase()).as_deref() {
            None => default,
            Some("true" | "1" | "yes" | "on") => true,
            Some("false" | "0" | "no" | "off") => false,
            Some(other) => {
                warn!(variable = key, value = %other, "Ignoring unrecognized flag value");
                default
            }
        }
    }
}

//! # Constants
//!
//! Shared constants used throughout the service.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable (see [`crate::config`]).

/// Name of the default variable holding the deployment namespace
pub const NAMESPACE_VARIABLE_NAME: &str = "namespace";

/// Default name of the secret holding secured variables
pub const DEFAULT_SECURED_VARIABLES_SECRET_NAME: &str = "secured-variables-v2";

/// Default label key used to discover secured-variable secrets
pub const DEFAULT_SECURED_VARIABLES_LABEL_KEY: &str = "variables.integration.platform/type";

/// Default label value used to discover secured-variable secrets
pub const DEFAULT_SECURED_VARIABLES_LABEL_VALUE: &str = "secured";

/// Namespace used when neither `KUBERNETES_NAMESPACE` nor `POD_NAMESPACE` is set
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default maximum number of restore attempts
pub const DEFAULT_RESTORE_MAX_ATTEMPTS: u32 = 10;

/// Default delay between restore attempts (milliseconds)
pub const DEFAULT_RESTORE_RETRY_DELAY_MS: u64 = 5000;

/// Service account token mounted into every pod
pub const DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Diagnostic marker attached to failed restore attempts
pub const RESTORE_FAILURE_ERROR_CODE: &str = "8050";

/// Prefix of every logged Kubernetes API failure
pub const KUBE_API_ERROR_MESSAGE: &str = "Invalid k8s cluster parameters or API error.";

//! # Kubernetes Client
//!
//! Builds the `kube::Client` for the cluster-backed gateway modes.
//!
//! - Cluster: the pod's service account, optionally against an overridden
//!   API server URI and token file.
//! - Dev: an externally supplied bearer token against `KUBERNETES_CLUSTER_URI`,
//!   with certificate verification disabled. Without a token the local
//!   kubeconfig is used instead.

use crate::config::KubernetesConfig;
use crate::gateway::GatewayMode;
use anyhow::{bail, Context, Result};
use kube::{Client, Config};
use tracing::{info, warn};

/// Client configuration for `mode`
///
/// # Errors
///
/// Fails when the in-cluster environment or kubeconfig is unusable, or when
/// the configured URI does not parse.
pub async fn client_config(config: &KubernetesConfig, mode: GatewayMode) -> Result<Config> {
    match mode {
        GatewayMode::Cluster => {
            let mut client_config = Config::incluster()
                .context("Failed to load in-cluster Kubernetes configuration")?;
            if let Some(uri) = &config.cluster_uri {
                client_config.cluster_url = uri
                    .parse()
                    .with_context(|| format!("Invalid KUBERNETES_CLUSTER_URI: {uri}"))?;
            }
            client_config.auth_info.token_file = Some(config.service_account_token_path.clone());
            client_config.default_namespace.clone_from(&config.namespace);
            Ok(client_config)
        }
        GatewayMode::Dev => match (&config.cluster_uri, &config.cluster_token) {
            (Some(uri), Some(token)) => {
                let url = uri
                    .parse()
                    .with_context(|| format!("Invalid KUBERNETES_CLUSTER_URI: {uri}"))?;
                let mut client_config = Config::new(url);
                client_config.auth_info.token = Some(token.clone());
                client_config.accept_invalid_certs = true;
                client_config.default_namespace.clone_from(&config.namespace);
                warn!(cluster = %uri, "Dev mode: TLS certificate verification is disabled");
                Ok(client_config)
            }
            _ => {
                info!("Dev mode without cluster URI and token, inferring configuration");
                Config::infer()
                    .await
                    .context("Failed to infer Kubernetes configuration")
            }
        },
        GatewayMode::LocalDev => bail!("Local dev mode does not use a Kubernetes client"),
    }
}

/// Client for `mode`
///
/// # Errors
///
/// See [`client_config`]; also fails if the client cannot be constructed.
pub async fn build_client(config: &KubernetesConfig, mode: GatewayMode) -> Result<Client> {
    let client_config = client_config(config, mode).await?;
    info!(
        mode = mode.as_str(),
        cluster = %client_config.cluster_url,
        "Creating Kubernetes client"
    );
    Client::try_from(client_config).context("Failed to create Kubernetes client")
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::{ExposeSecret, SecretString};

    #[tokio::test]
    async fn test_dev_mode_uses_token_and_skips_verification() {
        let config = KubernetesConfig {
            namespace: "team-a".to_string(),
            devmode: true,
            cluster_uri: Some("https://10.0.0.1:6443".to_string()),
            cluster_token: Some(SecretString::from("dev-token".to_string())),
            ..KubernetesConfig::default()
        };

        let client_config = client_config(&config, GatewayMode::Dev).await.unwrap();
        assert!(client_config.accept_invalid_certs);
        assert_eq!(client_config.default_namespace, "team-a");
        assert_eq!(client_config.cluster_url.host(), Some("10.0.0.1"));
        assert_eq!(client_config.cluster_url.port_u16(), Some(6443));
        assert_eq!(
            client_config.auth_info.token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("dev-token".to_string())
        );
    }

    #[tokio::test]
    async fn test_local_dev_has_no_client() {
        let config = KubernetesConfig::default();
        assert!(client_config(&config, GatewayMode::LocalDev).await.is_err());
    }
}

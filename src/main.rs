//! # Variables Management
//!
//! Long-running service that restores the default variable baseline and
//! keeps it in place.
//!
//! Startup:
//! 1. rustls crypto provider, tracing, metrics
//! 2. HTTP server for `/metrics`, `/healthz`, `/readyz`
//! 3. Gateway selection from `KUBERNETES_DEVMODE` / `KUBERNETES_LOCALDEV`
//! 4. Restore of default variables (readiness follows the restore)
//! 5. Deletion watch on the secured variables secret (cluster modes)
//!
//! Restored defaults land in the in-process common variables store, which
//! lives as long as the process does.

use anyhow::{anyhow, Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info, warn};
use variables_management::common::InMemoryCommonVariables;
use variables_management::config::AppConfig;
use variables_management::defaults::{
    DefaultVariablesProvider, NoopDefaultVariables, StaticDefaultVariables,
};
use variables_management::gateway::client::build_client;
use variables_management::gateway::cluster::KubeSecretGateway;
use variables_management::gateway::memory::InMemorySecretGateway;
use variables_management::gateway::{GatewayMode, SecretGateway};
use variables_management::metrics;
use variables_management::restore::VariablesRestorer;
use variables_management::secured::SecuredVariableService;
use variables_management::server::{start_server, Readiness};
use variables_management::watch::start_secured_secret_watch;

fn default_variables_provider(config: &AppConfig) -> Result<Arc<dyn DefaultVariablesProvider>> {
    let provider: Arc<dyn DefaultVariablesProvider> = match &config.default_variables {
        Some(list) => Arc::new(
            StaticDefaultVariables::parse(list).context("Invalid DEFAULT_VARIABLES")?,
        ),
        None => Arc::new(NoopDefaultVariables),
    };
    Ok(provider)
}

async fn gateway_for(
    config: &AppConfig,
    mode: GatewayMode,
) -> Result<(Arc<dyn SecretGateway>, Option<Client>)> {
    if mode == GatewayMode::LocalDev {
        warn!("Local dev mode: secured variables are kept in memory only");
        let gateway: Arc<dyn SecretGateway> = Arc::new(InMemorySecretGateway::new());
        return Ok((gateway, None));
    }

    let client = build_client(&config.kubernetes, mode).await?;
    let gateway: Arc<dyn SecretGateway> = Arc::new(KubeSecretGateway::new(
        client.clone(),
        &config.kubernetes.namespace,
    ));
    Ok((gateway, Some(client)))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must happen before any TLS connection is made
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_existing| anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "variables_management=info".into()),
        )
        .init();

    info!("Starting Variables Management");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let config = AppConfig::from_env();
    let mode = config.kubernetes.mode();
    info!(
        namespace = %config.kubernetes.namespace,
        mode = mode.as_str(),
        secret = %config.secured_secret_name,
        "Loaded configuration"
    );

    metrics::register_metrics()?;

    let readiness = Readiness::default();
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn({
        let readiness = readiness.clone();
        async move {
            if let Err(e) = start_server(server_port, readiness).await {
                error!("HTTP server error: {}", e);
            }
        }
    });

    let (gateway, client) = gateway_for(&config, mode).await?;
    let secured = SecuredVariableService::new(
        gateway,
        config.secured_label(),
        config.secured_secret_name.clone(),
    );
    let common = Arc::new(InMemoryCommonVariables::new());
    let restorer = Arc::new(
        VariablesRestorer::new(
            secured,
            common,
            default_variables_provider(&config)?,
            config.kubernetes.namespace.clone(),
            config.restore_policy(),
        )
        .with_readiness(readiness),
    );

    restorer
        .restore_variables()
        .await
        .context("Failed to restore default variables")?;

    let watch_handle = match client {
        Some(client) if config.restore_on_secret_delete => Some(start_secured_secret_watch(
            client,
            &config.kubernetes.namespace,
            &config.secured_secret_name,
            Arc::clone(&restorer),
        )),
        _ => None,
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    if let Some(handle) = watch_handle {
        handle.abort();
    }
    server_handle.abort();

    Ok(())
}

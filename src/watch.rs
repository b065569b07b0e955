//! # Secured Secret Watch
//!
//! Watches the secured variables secret and re-runs the restore when it is
//! deleted, so the baseline comes back without a process restart.

use crate::restore::VariablesRestorer;
use futures::{pin_mut, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use kube_runtime::watcher;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Whether `event` means the watched secret is gone
#[must_use]
pub fn is_restore_trigger(event: &watcher::Event<Secret>, secret_name: &str) -> bool {
    match event {
        watcher::Event::Delete(secret) => secret.metadata.name.as_deref() == Some(secret_name),
        watcher::Event::Apply(_)
        | watcher::Event::Init
        | watcher::Event::InitApply(_)
        | watcher::Event::InitDone => false,
    }
}

/// Spawn the watch loop for `secret_name` in `namespace`
pub fn start_secured_secret_watch(
    client: Client,
    namespace: &str,
    secret_name: &str,
    restorer: Arc<VariablesRestorer>,
) -> JoinHandle<()> {
    let secrets: Api<Secret> = Api::namespaced(client, namespace);
    let secret_name = secret_name.to_string();
    let namespace = namespace.to_string();

    tokio::spawn(async move {
        let config = watcher::Config::default().fields(&format!("metadata.name={secret_name}"));
        info!(
            secret = %secret_name,
            namespace = %namespace,
            "Starting watch for secured variables secret"
        );

        let stream = watcher(secrets, config);
        pin_mut!(stream);

        while let Some(event_result) = stream.next().await {
            match event_result {
                Ok(event) if is_restore_trigger(&event, &secret_name) => {
                    warn!(
                        secret = %secret_name,
                        namespace = %namespace,
                        "Secured variables secret was deleted, restoring default variables"
                    );
                    if let Err(e) = restorer.restore_variables().await {
                        error!(secret = %secret_name, "Restore after deletion failed: {}", e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    // The watcher re-lists on its own; errors are transient.
                    warn!("Error watching secured variables secret: {}", e);
                }
            }
        }

        warn!(secret = %secret_name, "Secured variables secret watch stream ended");
    })
}

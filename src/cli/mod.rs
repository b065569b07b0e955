//! # VARCTL CLI
//!
//! Operator CLI for secret-backed variables. Talks to the cluster through the
//! same gateway the service uses, so every write is one JSON-Patch request.
//!
//! ## Usage
//!
//! ```bash
//! # List secured-variable secrets (by discovery label)
//! varctl list
//!
//! # Show one secret's variables
//! varctl get secured-variables-v2
//!
//! # Create a labelled secret, optionally seeded
//! varctl create my-vars region=eu-west
//!
//! # Add, replace or remove keys
//! varctl add my-vars tier=gold --init
//! varctl replace my-vars tier=silver
//! varctl remove my-vars tier --async
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use kube::Client;
use std::sync::Arc;
use variables_management::constants::{
    DEFAULT_SECURED_VARIABLES_LABEL_KEY, DEFAULT_SECURED_VARIABLES_LABEL_VALUE,
};
use variables_management::gateway::cluster::KubeSecretGateway;
use variables_management::gateway::{SecretData, SecretGateway, SecretLabel, SecretsByName};
use variables_management::mutation::channel_callback;

/// Secret-backed variables CLI
#[derive(Parser)]
#[command(name = "varctl")]
#[command(about = "Manage secret-backed variables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to current context namespace)
    #[arg(short, long, global = true, env = "KUBERNETES_NAMESPACE")]
    namespace: Option<String>,

    /// Discovery label key
    #[arg(long, global = true, default_value = DEFAULT_SECURED_VARIABLES_LABEL_KEY)]
    label_key: String,

    /// Discovery label value
    #[arg(long, global = true, default_value = DEFAULT_SECURED_VARIABLES_LABEL_VALUE)]
    label_value: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List secrets carrying the discovery label, with their keys
    List {
        /// Print values as well as keys
        #[arg(long)]
        show_values: bool,
    },
    /// Show the variables of one secret
    Get {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Create a labelled secret
    Create {
        #[arg(value_name = "NAME")]
        name: String,
        /// Seed entries
        #[arg(value_name = "KEY=VALUE", value_parser = parse_entry)]
        entries: Vec<(String, String)>,
    },
    /// Add keys to a secret
    Add {
        #[arg(value_name = "NAME")]
        name: String,
        #[arg(value_name = "KEY=VALUE", required = true, value_parser = parse_entry)]
        entries: Vec<(String, String)>,
        /// Create the data map first (for secrets without data)
        #[arg(long)]
        init: bool,
    },
    /// Replace existing keys of a secret
    Replace {
        #[arg(value_name = "NAME")]
        name: String,
        #[arg(value_name = "KEY=VALUE", required = true, value_parser = parse_entry)]
        entries: Vec<(String, String)>,
    },
    /// Remove keys from a secret
    Remove {
        #[arg(value_name = "NAME")]
        name: String,
        #[arg(value_name = "KEY", required = true)]
        keys: Vec<String>,
        /// Submit without blocking and report through the completion callback
        #[arg(long = "async")]
        non_blocking: bool,
    },
}

fn parse_entry(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        bail!("empty key in '{raw}'");
    }
    Ok((key.to_string(), value.to_string()))
}

fn print_data(data: &SecretData) {
    let mut entries: Vec<_> = data.iter().collect();
    entries.sort();
    for (key, value) in entries {
        println!("{key}={value}");
    }
}

fn print_catalog(secrets: &SecretsByName, show_values: bool) {
    if secrets.is_empty() {
        println!("No secrets found");
        return;
    }
    let mut names: Vec<_> = secrets.keys().collect();
    names.sort();
    for name in names {
        let data = &secrets[name];
        println!("{name} ({} keys)", data.len());
        let mut keys: Vec<_> = data.keys().collect();
        keys.sort();
        for key in keys {
            if show_values {
                println!("  {key}={}", data[key]);
            } else {
                println!("  {key}");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_existing| anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "varctl=warn,variables_management=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;
    let namespace = cli
        .namespace
        .unwrap_or_else(|| client.default_namespace().to_string());
    let gateway: Arc<dyn SecretGateway> = Arc::new(KubeSecretGateway::new(client, &namespace));
    let label = SecretLabel::new(cli.label_key, cli.label_value);

    match cli.command {
        Commands::List { show_values } => {
            let secrets = gateway.list_by_label(&label).await?;
            print_catalog(&secrets, show_values);
        }
        Commands::Get { name } => {
            print_data(&gateway.require_by_name(&name).await?);
        }
        Commands::Create { name, entries } => {
            gateway
                .create(&name, &label, &entries.into_iter().collect())
                .await?;
            println!("Created secret {namespace}/{name} ({label})");
        }
        Commands::Add {
            name,
            entries,
            init,
        } => {
            print_data(&gateway.add_keys(&name, &entries, init).await?);
        }
        Commands::Replace { name, entries } => {
            print_data(&gateway.replace_keys(&name, &entries).await?);
        }
        Commands::Remove {
            name,
            keys,
            non_blocking,
        } => {
            if non_blocking {
                let (callback, completion) = channel_callback();
                let handle = gateway.remove_keys_async(&name, &keys, callback)?;
                println!("Submitted removal of {} key(s) from {name}", keys.len());
                let data = completion
                    .await
                    .context("Completion callback was dropped")??;
                handle.join().await;
                print_data(&data);
            } else {
                print_data(&gateway.remove_keys(&name, &keys).await?);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry() {
        assert_eq!(
            parse_entry("region=eu-west").unwrap(),
            ("region".to_string(), "eu-west".to_string())
        );
        assert_eq!(
            parse_entry("url=a=b").unwrap(),
            ("url".to_string(), "a=b".to_string())
        );
        assert!(parse_entry("novalue").is_err());
        assert!(parse_entry("=x").is_err());
    }

    #[test]
    fn test_cli_parses_async_remove() {
        let cli = Cli::try_parse_from(["varctl", "-n", "team-a", "remove", "vars", "a", "b", "--async"])
            .unwrap();
        assert_eq!(cli.namespace.as_deref(), Some("team-a"));
        match cli.command {
            Commands::Remove {
                name,
                keys,
                non_blocking,
            } => {
                assert_eq!(name, "vars");
                assert_eq!(keys, vec!["a", "b"]);
                assert!(non_blocking);
            }
            _ => panic!("Expected remove command"),
        }
    }
}

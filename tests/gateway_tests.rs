//! Gateway behaviour against the in-memory Secret store
//!
//! The in-memory gateway applies the same JSON-Patch documents the cluster
//! gateway submits, so these tests pin down the observable contract.

mod common;

use base64::Engine;
use common::{data, entries, keys, secured_label};
use variables_management::error::GatewayError;
use variables_management::gateway::memory::InMemorySecretGateway;
use variables_management::gateway::{SecretData, SecretGateway, SecretLabel};
use variables_management::mutation::{channel_callback, PatchCallback};
use variables_management::patch::PatchBuilder;

async fn gateway_with(name: &str, seed: &[(&str, &str)]) -> InMemorySecretGateway {
    common::init_tracing();
    let gateway = InMemorySecretGateway::new();
    gateway
        .create(name, &secured_label(), &data(seed))
        .await
        .unwrap();
    gateway
}

#[tokio::test]
async fn test_add_keys_then_get_returns_added_and_existing() {
    let gateway = gateway_with("vars", &[("existing", "keep")]).await;

    let returned = gateway
        .add_keys("vars", &entries(&[("a", "1"), ("b", "2")]), false)
        .await
        .unwrap();
    let stored = gateway.get_by_name("vars").await.unwrap().unwrap();

    assert_eq!(returned, stored);
    assert_eq!(stored, data(&[("existing", "keep"), ("a", "1"), ("b", "2")]));
}

#[tokio::test]
async fn test_add_keys_with_init_on_empty_secret() {
    let gateway = gateway_with("vars", &[]).await;

    let stored = gateway
        .add_keys("vars", &entries(&[("region", "eu-west")]), true)
        .await
        .unwrap();
    assert_eq!(stored, data(&[("region", "eu-west")]));
}

#[tokio::test]
async fn test_values_are_stored_base64_encoded() {
    let gateway = gateway_with("vars", &[]).await;
    gateway
        .add_keys("vars", &entries(&[("token", "s3cr3t")]), true)
        .await
        .unwrap();

    let raw = gateway.raw("vars").await.unwrap();
    let document = serde_json::to_value(&raw).unwrap();
    let encoded = document["data"]["token"].as_str().unwrap();
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .unwrap();
    assert_eq!(decoded, b"s3cr3t");
}

#[tokio::test]
async fn test_create_twice_conflicts_without_touching_original() {
    let gateway = gateway_with("vars", &[("a", "1")]).await;

    let err = gateway
        .create("vars", &secured_label(), &data(&[("b", "2")]))
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(err.http_status().as_u16(), 409);
    assert_eq!(
        gateway.get_by_name("vars").await.unwrap(),
        Some(data(&[("a", "1")]))
    );
}

#[tokio::test]
async fn test_remove_missing_key_rejects_whole_patch() {
    let gateway = gateway_with("vars", &[("a", "1"), ("b", "2")]).await;

    let err = gateway
        .remove_keys("vars", &keys(&["a", "missing"]))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Api { .. }));
    assert_eq!(
        gateway.get_by_name("vars").await.unwrap(),
        Some(data(&[("a", "1"), ("b", "2")]))
    );
}

#[tokio::test]
async fn test_replace_requires_existing_keys() {
    let gateway = gateway_with("vars", &[("a", "1")]).await;

    let updated = gateway
        .replace_keys("vars", &entries(&[("a", "2")]))
        .await
        .unwrap();
    assert_eq!(updated, data(&[("a", "2")]));

    let err = gateway
        .replace_keys("vars", &entries(&[("a", "3"), ("new", "x")]))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Api { .. }));
    assert_eq!(
        gateway.get_by_name("vars").await.unwrap(),
        Some(data(&[("a", "2")]))
    );
}

#[tokio::test]
async fn test_keys_with_slashes_address_one_member() {
    let gateway = gateway_with("vars", &[]).await;

    let stored = gateway
        .add_keys("vars", &entries(&[("tls/ca.crt", "pem"), ("a~b", "x")]), true)
        .await
        .unwrap();
    assert_eq!(stored, data(&[("tls/ca.crt", "pem"), ("a~b", "x")]));

    let stored = gateway
        .remove_keys("vars", &keys(&["tls/ca.crt"]))
        .await
        .unwrap();
    assert_eq!(stored, data(&[("a~b", "x")]));
}

#[tokio::test]
async fn test_soft_and_hard_get_on_missing_secret() {
    let gateway = gateway_with("vars", &[]).await;

    assert_eq!(gateway.get_by_name("absent").await.unwrap(), None);

    let err = gateway.require_by_name("absent").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.http_status().as_u16(), 404);
}

#[tokio::test]
async fn test_list_by_label_with_no_matches_is_empty() {
    let gateway = gateway_with("vars", &[("a", "1")]).await;

    let listed = gateway
        .list_by_label(&SecretLabel::new("variables.integration.platform/type", "none"))
        .await
        .unwrap();
    assert!(listed.is_empty());

    let listed = gateway.list_by_label(&secured_label()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed["vars"], data(&[("a", "1")]));
}

#[tokio::test]
async fn test_async_remove_of_missing_key_fails_exactly_once() {
    let gateway = gateway_with("vars", &[("a", "1")]).await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let callback: PatchCallback = Box::new(move |result| {
        let _ = tx.send(result);
    });

    let handle = gateway
        .remove_keys_async("vars", &keys(&["a", "missing"]), callback)
        .unwrap();
    handle.join().await;

    let first = rx.recv().await.unwrap();
    assert!(first.is_err());
    // Sender dropped with the callback: no second delivery.
    assert!(rx.recv().await.is_none());
    assert_eq!(
        gateway.get_by_name("vars").await.unwrap(),
        Some(data(&[("a", "1")]))
    );
}

#[tokio::test]
async fn test_async_remove_delivers_resulting_data() {
    let gateway = gateway_with("vars", &[("a", "1"), ("b", "2")]).await;

    let (callback, completion) = channel_callback();
    let handle = gateway
        .remove_keys_async("vars", &keys(&["a"]), callback)
        .unwrap();

    let remaining = completion.await.unwrap().unwrap();
    handle.join().await;
    assert_eq!(remaining, data(&[("b", "2")]));
}

#[tokio::test]
async fn test_concurrent_adds_to_distinct_keys_all_land() {
    let gateway = gateway_with("vars", &[("seed", "0")]).await;

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                gateway
                    .add_keys("vars", &[(format!("k{i}"), i.to_string())], false)
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stored = gateway.get_by_name("vars").await.unwrap().unwrap();
    assert_eq!(stored.len(), 9);
    assert_eq!(stored["k7"], "7");
}

#[test]
fn test_patch_ordering_follows_input() {
    let patch = PatchBuilder::secret_data()
        .add([("a", "1"), ("b", "2"), ("c", "3")], true)
        .unwrap();
    let paths: Vec<String> = patch
        .0
        .iter()
        .map(|op| serde_json::to_value(op).unwrap()["path"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(paths, vec!["/data", "/data/a", "/data/b", "/data/c"]);

    let empty = SecretData::new();
    assert!(PatchBuilder::secret_data().replace(&empty).unwrap().0.is_empty());
}

//! Shared setup for cluster-backed tests

use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;

use hello_operator::crd::{HelloApp, HelloAppSpec};
use hello_operator::retry::RetryPolicy;
use hello_operator::startup;

/// Namespace every integration test works in
pub const TEST_NAMESPACE: &str = "hello-operator-test";

/// Connect to the cluster, install the CRD and create the test namespace
pub async fn ensure_test_cluster() -> Result<Client, String> {
    let policy = RetryPolicy::with_max_attempts(3);
    let client = startup::connect(&policy)
        .await
        .map_err(|e| format!("no cluster reachable: {e}"))?;
    startup::ensure_crd_installed(&client, &policy)
        .await
        .map_err(|e| format!("failed to install CRD: {e}"))?;
    wait_for_crd(&client).await?;
    ensure_namespace(&client).await?;
    Ok(client)
}

async fn wait_for_crd(client: &Client) -> Result<(), String> {
    let api: Api<HelloApp> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    for _ in 0..30 {
        if api.list(&ListParams::default().limit(1)).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    Err("HelloApp CRD never became established".to_string())
}

async fn ensure_namespace(client: &Client) -> Result<(), String> {
    let api: Api<Namespace> = Api::all(client.clone());
    if api
        .get_opt(TEST_NAMESPACE)
        .await
        .map_err(|e| e.to_string())?
        .is_some()
    {
        return Ok(());
    }
    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(TEST_NAMESPACE.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    api.create(&PostParams::default(), &namespace)
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

/// A HelloApp in the test namespace
pub fn sample_app(name: &str, message: &str, replicas: i32) -> HelloApp {
    let mut app = HelloApp::new(
        name,
        HelloAppSpec {
            message: message.to_string(),
            replicas,
        },
    );
    app.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    app
}

/// Delete a HelloApp and its Deployment, ignoring absence
pub async fn cleanup(client: &Client, name: &str) {
    let apps: Api<HelloApp> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let _ = apps.delete(name, &DeleteParams::default()).await;
    let _ = deployments.delete(name, &DeleteParams::default()).await;
    for _ in 0..20 {
        if matches!(apps.get_opt(name).await, Ok(None)) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

//! Stories about creating HelloApps through the Kubernetes API
//!
//! The operator relies on the API server to enforce field bounds, so these
//! tests check the generated schema does that job.

use kube::api::{Api, PostParams};

use hello_operator::crd::HelloApp;

use super::helpers::{cleanup, ensure_test_cluster, sample_app, TEST_NAMESPACE};

/// Story: a HelloApp without replicas is stored with one replica
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_user_creates_app_with_default_replicas() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<HelloApp> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-defaults";
    cleanup(&client, name).await;

    let app: HelloApp = serde_json::from_value(serde_json::json!({
        "apiVersion": "hello.example.com/v1alpha1",
        "kind": "HelloApp",
        "metadata": { "name": name, "namespace": TEST_NAMESPACE },
        "spec": { "message": "hi" },
    }))
    .expect("valid HelloApp");
    let created = api
        .create(&PostParams::default(), &app)
        .await
        .expect("failed to create HelloApp");

    assert_eq!(created.spec.replicas, 1);
    assert_eq!(created.spec.message, "hi");

    cleanup(&client, name).await;
}

/// Story: out-of-range replica counts are rejected by the API server
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_api_server_rejects_too_many_replicas() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<HelloApp> = Api::namespaced(client.clone(), TEST_NAMESPACE);

    let result = api
        .create(&PostParams::default(), &sample_app("crd-too-many", "hi", 11))
        .await;

    match result {
        Err(kube::Error::Api(response)) => assert_eq!(response.code, 422),
        other => panic!("expected validation failure, got {other:?}"),
    }
}

/// Story: an empty greeting is rejected by the API server
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_api_server_rejects_empty_message() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<HelloApp> = Api::namespaced(client.clone(), TEST_NAMESPACE);

    let result = api
        .create(&PostParams::default(), &sample_app("crd-empty", "", 1))
        .await;

    assert!(
        matches!(result, Err(kube::Error::Api(ref response)) if response.code == 422),
        "expected validation failure, got {result:?}"
    );
}

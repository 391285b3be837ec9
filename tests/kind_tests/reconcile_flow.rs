//! Stories about reconcile passes against a live API server
//!
//! Passes are driven by hand instead of through the Controller so each step
//! can be asserted.

use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, Patch, PatchParams, PostParams};
use tokio_util::sync::CancellationToken;

use hello_operator::controller::{
    reconcile_key, Context, ObjectKey, Requeue, CONDITION_AVAILABLE,
};
use hello_operator::crd::{ConditionStatus, HelloApp};

use super::helpers::{cleanup, ensure_test_cluster, sample_app, TEST_NAMESPACE};

/// Story: a new HelloApp gets an owned Deployment and becomes Available
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_new_app_converges() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let apps: Api<HelloApp> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "flow-converge";
    cleanup(&client, name).await;

    let created = apps
        .create(&PostParams::default(), &sample_app(name, "hi", 2))
        .await
        .expect("failed to create HelloApp");
    let ctx = Context::builder(client.clone()).build();
    let key = ObjectKey::new(TEST_NAMESPACE, name);
    let cancel = CancellationToken::new();

    let first = reconcile_key(&key, &ctx, &cancel).await.expect("first pass");
    assert_eq!(first, Requeue::Immediately);

    let deployment = deployments.get(name).await.expect("Deployment created");
    assert_eq!(deployment.spec.as_ref().unwrap().replicas, Some(2));
    let owner = &deployment.metadata.owner_references.as_ref().unwrap()[0];
    assert_eq!(owner.kind, "HelloApp");
    assert_eq!(Some(owner.uid.clone()), created.metadata.uid);

    let second = reconcile_key(&key, &ctx, &cancel).await.expect("second pass");
    assert_eq!(second, Requeue::Never);

    let app = apps.get(name).await.expect("HelloApp still exists");
    let condition = app
        .status
        .as_ref()
        .and_then(|s| s.condition(CONDITION_AVAILABLE))
        .expect("Available condition");
    assert_eq!(condition.status, ConditionStatus::True);

    cleanup(&client, name).await;
}

/// Story: a user scales a running HelloApp and the Deployment follows
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_scaling_updates_deployment() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let apps: Api<HelloApp> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "flow-scale";
    cleanup(&client, name).await;

    apps.create(&PostParams::default(), &sample_app(name, "hi", 1))
        .await
        .expect("failed to create HelloApp");
    let ctx = Context::builder(client.clone()).build();
    let key = ObjectKey::new(TEST_NAMESPACE, name);
    let cancel = CancellationToken::new();
    for _ in 0..3 {
        if reconcile_key(&key, &ctx, &cancel).await.expect("pass") == Requeue::Never {
            break;
        }
    }

    apps.patch(
        name,
        &PatchParams::default(),
        &Patch::Merge(serde_json::json!({ "spec": { "replicas": 3 } })),
    )
    .await
    .expect("failed to scale HelloApp");

    let requeue = reconcile_key(&key, &ctx, &cancel).await.expect("scale pass");
    assert_eq!(requeue, Requeue::Immediately);
    let deployment = deployments.get(name).await.expect("Deployment exists");
    assert_eq!(deployment.spec.as_ref().unwrap().replicas, Some(3));

    cleanup(&client, name).await;
}

/// Story: a deleted HelloApp ends the pass without error
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_missing_app_is_ignored() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let ctx = Context::builder(client).build();
    let key = ObjectKey::new(TEST_NAMESPACE, "flow-never-created");

    let requeue = reconcile_key(&key, &ctx, &CancellationToken::new())
        .await
        .expect("missing app is not an error");
    assert_eq!(requeue, Requeue::Never);
}

//! Kubernetes Events emitted while reconciling HelloApps
//!
//! Events surface Deployment creation, drift correction and ownership
//! failures in `kubectl describe helloapp`. Publishing never fails a pass: a
//! rejected event is logged and dropped.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Action recorded on every event from the reconcile loop
pub const RECONCILE_ACTION: &str = "Reconcile";

/// Event reason strings, shown in the REASON column
pub mod reasons {
    /// Deployment did not exist and was created
    pub const DEPLOYMENT_CREATED: &str = "DeploymentCreated";
    /// Deployment drifted from the HelloApp and was updated
    pub const DEPLOYMENT_UPDATED: &str = "DeploymentUpdated";
    /// Owner reference could not be built for the Deployment
    pub const OWNERSHIP_LINK_FAILED: &str = "OwnershipLinkFailed";
}

/// Publishes Kubernetes Events about a HelloApp
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event on `regarding`. Never returns an error.
    async fn publish(
        &self,
        regarding: &ObjectReference,
        type_: EventType,
        reason: &str,
        note: String,
    );
}

/// Publisher backed by the kube-runtime event recorder
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller`
    pub fn new(client: Client, controller: &str) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        regarding: &ObjectReference,
        type_: EventType,
        reason: &str,
        note: String,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: RECONCILE_ACTION.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, regarding).await {
            warn!(
                reason,
                object = regarding.name.as_deref().unwrap_or_default(),
                error = %e,
                "failed to publish event"
            );
        }
    }
}

/// Publisher that drops every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _regarding: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _note: String,
    ) {
    }
}

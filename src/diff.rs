//! Drift detection between the observed and desired Deployment
//!
//! Only two fields are owned by the operator after creation: the replica
//! count and the environment of the first container. Everything else the API
//! server or other controllers may default or mutate freely.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, EnvVar};

/// A single tracked field whose observed value differs from the desired one
#[derive(Clone, Debug, PartialEq)]
pub enum Drift {
    /// `spec.replicas` differs
    Replicas {
        /// Value currently stored
        observed: Option<i32>,
        /// Value the HelloApp asks for
        desired: Option<i32>,
    },
    /// Env of the first container differs
    Env {
        /// Value currently stored
        observed: Vec<EnvVar>,
        /// Value the HelloApp asks for
        desired: Vec<EnvVar>,
    },
}

impl Drift {
    /// Short field name for logging
    pub fn field(&self) -> &'static str {
        match self {
            Self::Replicas { .. } => "replicas",
            Self::Env { .. } => "env",
        }
    }
}

/// Compare the tracked fields of `observed` against `desired`
pub fn detect_drift(observed: &Deployment, desired: &Deployment) -> Vec<Drift> {
    [replicas_drift(observed, desired), env_drift(observed, desired)]
        .into_iter()
        .flatten()
        .collect()
}

/// Replica count comparison. Drift only when desired is set and observed is
/// unset or different; an unset desired count leaves the stored one alone.
pub fn replicas_drift(observed: &Deployment, desired: &Deployment) -> Option<Drift> {
    let observed = replicas(observed);
    let desired = replicas(desired);
    match (observed, desired) {
        (None, Some(_)) => Some(Drift::Replicas { observed, desired }),
        (Some(o), Some(d)) if o != d => Some(Drift::Replicas { observed, desired }),
        _ => None,
    }
}

/// Structural comparison of the first container's env list. A missing list
/// and an empty list compare equal.
pub fn env_drift(observed: &Deployment, desired: &Deployment) -> Option<Drift> {
    let observed = first_container_env(observed);
    let desired = first_container_env(desired);
    (observed != desired).then_some(Drift::Env { observed, desired })
}

/// Write the desired side of every drift onto `observed`
pub fn apply_drift(observed: &mut Deployment, drifts: &[Drift]) {
    for drift in drifts {
        match drift {
            Drift::Replicas { desired, .. } => {
                observed.spec.get_or_insert_with(Default::default).replicas = *desired;
            }
            Drift::Env { desired, .. } => {
                if let Some(container) = first_container_mut(observed) {
                    container.env = (!desired.is_empty()).then(|| desired.clone());
                }
            }
        }
    }
}

fn replicas(deployment: &Deployment) -> Option<i32> {
    deployment.spec.as_ref().and_then(|spec| spec.replicas)
}

fn first_container_env(deployment: &Deployment) -> Vec<EnvVar> {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .and_then(|pod| pod.containers.first())
        .and_then(|container| container.env.clone())
        .unwrap_or_default()
}

fn first_container_mut(deployment: &mut Deployment) -> Option<&mut Container> {
    deployment
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .and_then(|pod| pod.containers.first_mut())
}

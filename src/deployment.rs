//! Deployment construction for HelloApp
//!
//! Maps a HelloApp onto the single Deployment it owns. The pod shape is fixed
//! policy: one unprivileged nginx container listening on 8080 with the
//! greeting injected as an environment variable. Building never touches the
//! API server; the owner link comes from an [`OwnerRegistrar`].

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, SeccompProfile,
    SecurityContext,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
#[cfg(test)]
use mockall::automock;

use crate::crd::HelloApp;
use crate::{Error, Result, CONTROLLER_NAME};

/// Name of the only container in the pod template
pub const CONTAINER_NAME: &str = "hello-app";

/// Image serving the greeting; runs as non-root on 8080
pub const CONTAINER_IMAGE: &str = "nginxinc/nginx-unprivileged:alpine";

/// Port the container listens on
pub const CONTAINER_PORT: i32 = 8080;

/// Environment variable carrying the greeting
pub const MESSAGE_ENV_VAR: &str = "HELLO_MESSAGE";

/// Label key holding the HelloApp name
pub const APP_LABEL: &str = "app";

/// Label key marking objects this operator manages
pub const MANAGED_BY_LABEL: &str = "managed-by";

/// Label selector matching every Deployment this operator manages
pub fn managed_selector() -> String {
    format!("{MANAGED_BY_LABEL}={CONTROLLER_NAME}")
}

/// Produces the controller owner reference stamped onto dependents
#[cfg_attr(test, automock)]
pub trait OwnerRegistrar: Send + Sync {
    /// Build a controller owner reference pointing at `owner`
    fn owner_reference(&self, owner: &HelloApp) -> Result<OwnerReference>;
}

/// Owner registrar backed by an explicit set of known owner kinds
///
/// A kind must be registered before it can own anything. The default
/// registrar knows `HelloApp`.
#[derive(Clone, Debug)]
pub struct SchemeRegistrar {
    kinds: BTreeSet<(String, String)>,
}

impl SchemeRegistrar {
    /// A registrar with no kinds registered
    pub fn empty() -> Self {
        Self {
            kinds: BTreeSet::new(),
        }
    }

    /// Register a statically typed kind as a valid owner
    pub fn register<K: Resource<DynamicType = ()>>(mut self) -> Self {
        self.kinds
            .insert((K::api_version(&()).into_owned(), K::kind(&()).into_owned()));
        self
    }

    /// Whether the given apiVersion/kind pair may own dependents
    pub fn is_registered(&self, api_version: &str, kind: &str) -> bool {
        self.kinds
            .contains(&(api_version.to_string(), kind.to_string()))
    }
}

impl Default for SchemeRegistrar {
    fn default() -> Self {
        Self::empty().register::<HelloApp>()
    }
}

impl OwnerRegistrar for SchemeRegistrar {
    fn owner_reference(&self, owner: &HelloApp) -> Result<OwnerReference> {
        let api_version = HelloApp::api_version(&());
        let kind = HelloApp::kind(&());
        if !self.is_registered(&api_version, &kind) {
            return Err(Error::ownership_link(format!(
                "no kind {kind} is registered for version {api_version}"
            )));
        }

        owner.controller_owner_ref(&()).ok_or_else(|| {
            Error::ownership_link(format!(
                "{kind} {} has no name or uid assigned",
                owner.name_any()
            ))
        })
    }
}

/// Labels shared by the Deployment, its selector and its pods
pub fn labels_for(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), name.to_string()),
        (MANAGED_BY_LABEL.to_string(), CONTROLLER_NAME.to_string()),
    ])
}

/// Build the desired Deployment for a HelloApp.
///
/// The Deployment shares the HelloApp's name and namespace and is
/// controller-owned by it. Fails with [`Error::OwnershipLink`] when the
/// registrar cannot produce an owner reference; no partial object is returned.
pub fn build_deployment(app: &HelloApp, registrar: &dyn OwnerRegistrar) -> Result<Deployment> {
    let owner = registrar.owner_reference(app)?;
    let name = app.name_any();
    let labels = labels_for(&name);

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(CONTAINER_IMAGE.to_string()),
        env: Some(vec![EnvVar {
            name: MESSAGE_ENV_VAR.to_string(),
            value: Some(app.spec.message.clone()),
            ..Default::default()
        }]),
        ports: Some(vec![ContainerPort {
            container_port: CONTAINER_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        security_context: Some(restricted_security_context()),
        ..Default::default()
    };

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: app.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(app.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Container security context satisfying the restricted pod security profile
fn restricted_security_context() -> SecurityContext {
    SecurityContext {
        allow_privilege_escalation: Some(false),
        run_as_non_root: Some(true),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            ..Default::default()
        }),
        seccomp_profile: Some(SeccompProfile {
            type_: "RuntimeDefault".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

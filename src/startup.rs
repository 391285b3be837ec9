//! Startup steps that run before the controller
//!
//! Both steps retry transient API failures through [`crate::retry`].

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};
use tracing::info;

use crate::crd::HelloApp;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::{Result, CONTROLLER_NAME};

/// Build a client from the in-cluster config or the local kubeconfig
pub async fn connect(policy: &RetryPolicy) -> Result<Client> {
    retry_with_backoff(policy, "create kube client", || async {
        Ok(Client::try_default().await?)
    })
    .await
}

/// Install or update the HelloApp CRD with server-side apply
pub async fn ensure_crd_installed(client: &Client, policy: &RetryPolicy) -> Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(CONTROLLER_NAME).force();
    let crd = HelloApp::crd();
    let name = HelloApp::crd_name();
    let (crds, params, crd) = (&crds, &params, &crd);

    retry_with_backoff(policy, "install HelloApp CRD", || async move {
        crds.patch(name, params, &Patch::Apply(crd)).await?;
        Ok(())
    })
    .await?;

    info!(crd = name, "HelloApp CRD installed");
    Ok(())
}

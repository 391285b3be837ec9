//! HelloApp controller implementation
//!
//! One pass reads the HelloApp, makes sure its status has an availability
//! condition, builds the desired Deployment, then creates it, corrects drift
//! on it, or reports its availability back onto the HelloApp. Convergence
//! comes from the returned [`Requeue`] directive; a pass never loops.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::crd::{Condition, ConditionStatus, HelloApp};
use crate::deployment::{build_deployment, OwnerRegistrar, SchemeRegistrar};
use crate::diff::{apply_drift, detect_drift};
use crate::events::{reasons, EventPublisher, KubeEventPublisher};
use crate::metrics::ReconcileMetrics;
use crate::{Error, Result, CONTROLLER_NAME};

/// Condition type reporting whether the Deployment is serving
pub const CONDITION_AVAILABLE: &str = "Available";

/// Reason used on every availability condition this controller writes
pub const REASON_RECONCILING: &str = "Reconciling";

/// Default deadline for one reconcile pass
pub const DEFAULT_PASS_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay before retrying a failed pass
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Namespace/name identity of a namespaced object
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    /// Namespace of the object
    pub namespace: String,
    /// Name of the object
    pub name: String,
}

impl ObjectKey {
    /// Create a key from its parts
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Read the identity of a namespaced object
    pub fn from_resource<K: Resource<DynamicType = ()>>(obj: &K) -> Result<Self> {
        let kind = K::kind(&());
        let meta = obj.meta();
        let name = meta
            .name
            .clone()
            .ok_or_else(|| Error::missing_identity(format!("{kind} has no name")))?;
        let namespace = meta.namespace.clone().ok_or_else(|| {
            Error::missing_identity(format!("{kind} {name} has no namespace"))
        })?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// What the dispatcher should do once a pass succeeds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requeue {
    /// Wait for the next change notification
    Never,
    /// Run another pass right away
    Immediately,
    /// Run another pass after the given delay
    After(Duration),
}

impl From<Requeue> for Action {
    fn from(requeue: Requeue) -> Self {
        match requeue {
            Requeue::Never => Action::await_change(),
            Requeue::Immediately => Action::requeue(Duration::ZERO),
            Requeue::After(delay) => Action::requeue(delay),
        }
    }
}

/// Object store operations the controller depends on
///
/// Gets return `Ok(None)` when the object does not exist. Writes carry the
/// resourceVersion that was read, so a concurrent modification is rejected
/// with [`Error::Conflict`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HelloKubeClient: Send + Sync {
    /// Fetch a HelloApp
    async fn get_app(&self, key: &ObjectKey) -> Result<Option<HelloApp>>;

    /// Persist the status sub-resource of a HelloApp
    async fn update_app_status(&self, app: &HelloApp) -> Result<()>;

    /// Fetch the Deployment sharing the HelloApp's key
    async fn get_deployment(&self, key: &ObjectKey) -> Result<Option<Deployment>>;

    /// Create a Deployment
    async fn create_deployment(&self, deployment: &Deployment) -> Result<()>;

    /// Replace an existing Deployment
    async fn update_deployment(&self, deployment: &Deployment) -> Result<()>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn apps(&self, namespace: &str) -> Api<HelloApp> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map HTTP 409 onto [`Error::Conflict`], everything else onto [`Error::Kube`]
fn store_error(err: kube::Error, what: &str, key: &ObjectKey) -> Error {
    match err {
        kube::Error::Api(response) if response.code == 409 => {
            Error::conflict(format!("{what} {key}: {}", response.message))
        }
        other => Error::Kube(other),
    }
}

#[async_trait]
impl HelloKubeClient for KubeClientImpl {
    async fn get_app(&self, key: &ObjectKey) -> Result<Option<HelloApp>> {
        Ok(self.apps(&key.namespace).get_opt(&key.name).await?)
    }

    async fn update_app_status(&self, app: &HelloApp) -> Result<()> {
        let key = ObjectKey::from_resource(app)?;
        // resourceVersion in a merge patch is enforced as a precondition
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": app.resource_version() },
            "status": app.status,
        });
        self.apps(&key.namespace)
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| store_error(e, "update status of HelloApp", &key))?;
        Ok(())
    }

    async fn get_deployment(&self, key: &ObjectKey) -> Result<Option<Deployment>> {
        Ok(self.deployments(&key.namespace).get_opt(&key.name).await?)
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<()> {
        let key = ObjectKey::from_resource(deployment)?;
        self.deployments(&key.namespace)
            .create(&PostParams::default(), deployment)
            .await
            .map_err(|e| store_error(e, "create Deployment", &key))?;
        Ok(())
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<()> {
        let key = ObjectKey::from_resource(deployment)?;
        self.deployments(&key.namespace)
            .replace(&key.name, &PostParams::default(), deployment)
            .await
            .map_err(|e| store_error(e, "update Deployment", &key))?;
        Ok(())
    }
}

/// Controller context shared by every reconcile pass
pub struct Context {
    /// Object store access (trait object for testability)
    pub kube: Arc<dyn HelloKubeClient>,
    /// Produces owner references for Deployments
    pub registrar: Arc<dyn OwnerRegistrar>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Reconcile counters
    pub metrics: Arc<ReconcileMetrics>,
    /// Process shutdown; each pass runs under a child token
    pub shutdown: CancellationToken,
    /// Deadline for one pass
    pub pass_timeout: Duration,
    /// Delay before a failed pass is retried
    pub error_backoff: Duration,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with a custom store
    ///
    /// Uses the default owner registrar and drops all events.
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn HelloKubeClient>) -> Self {
        Self {
            kube,
            registrar: Arc::new(SchemeRegistrar::default()),
            events: Arc::new(crate::events::NoopEventPublisher),
            metrics: Arc::new(ReconcileMetrics::new()),
            shutdown: CancellationToken::new(),
            pass_timeout: DEFAULT_PASS_TIMEOUT,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }
}

/// Builder for constructing [`Context`] instances
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .pass_timeout(Duration::from_secs(10))
///     .shutdown(token.clone())
///     .build();
/// ```
pub struct ContextBuilder {
    client: Client,
    kube: Option<Arc<dyn HelloKubeClient>>,
    registrar: Option<Arc<dyn OwnerRegistrar>>,
    events: Option<Arc<dyn EventPublisher>>,
    metrics: Option<Arc<ReconcileMetrics>>,
    shutdown: CancellationToken,
    pass_timeout: Duration,
    error_backoff: Duration,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            kube: None,
            registrar: None,
            events: None,
            metrics: None,
            shutdown: CancellationToken::new(),
            pass_timeout: DEFAULT_PASS_TIMEOUT,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }

    /// Override the store client (primarily for testing)
    pub fn kube_client(mut self, kube: Arc<dyn HelloKubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Override the owner registrar
    pub fn registrar(mut self, registrar: Arc<dyn OwnerRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    /// Override the event publisher
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Share a metrics instance with the probe server
    pub fn metrics(mut self, metrics: Arc<ReconcileMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Tie passes to a process-wide shutdown token
    pub fn shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Set the deadline for a single pass
    pub fn pass_timeout(mut self, timeout: Duration) -> Self {
        self.pass_timeout = timeout;
        self
    }

    /// Set the delay before a failed pass is retried
    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            kube: self
                .kube
                .unwrap_or_else(|| Arc::new(KubeClientImpl::new(self.client.clone()))),
            registrar: self
                .registrar
                .unwrap_or_else(|| Arc::new(SchemeRegistrar::default())),
            events: self
                .events
                .unwrap_or_else(|| Arc::new(KubeEventPublisher::new(self.client, CONTROLLER_NAME))),
            metrics: self.metrics.unwrap_or_default(),
            shutdown: self.shutdown,
            pass_timeout: self.pass_timeout,
            error_backoff: self.error_backoff,
        }
    }
}

/// Cancellation and deadline applied to every store call in a pass
struct Pass<'a> {
    cancel: &'a CancellationToken,
    deadline: Instant,
    timeout: Duration,
}

impl<'a> Pass<'a> {
    fn new(cancel: &'a CancellationToken, timeout: Duration) -> Self {
        Self {
            cancel,
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    async fn call<T>(&self, operation: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::cancelled(operation.to_string())),
            outcome = tokio::time::timeout_at(self.deadline, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(Error::timeout(format!(
                    "{operation} exceeded pass deadline of {:?}",
                    self.timeout
                ))),
            },
        }
    }

    /// Run a fire-and-forget side effect under the same cancel and deadline.
    /// Expiry drops the effect without failing the pass.
    async fn best_effort(&self, operation: &str, call: impl Future<Output = ()>) {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!(operation, "pass cancelled, dropping side effect");
            }
            outcome = tokio::time::timeout_at(self.deadline, call) => {
                if outcome.is_err() {
                    warn!(operation, timeout = ?self.timeout, "side effect dropped at pass deadline");
                }
            }
        }
    }
}

fn available_condition(status: ConditionStatus, generation: i64, message: String) -> Condition {
    Condition::new(CONDITION_AVAILABLE, status, REASON_RECONCILING, message)
        .with_generation(generation)
}

/// Reconcile a HelloApp resource
///
/// Adapts [`reconcile_key`] to `kube::runtime`. The watched object only
/// supplies the identity; state is always re-read from the store.
#[instrument(
    skip(app, ctx),
    fields(name = %app.name_any(), namespace = %app.namespace().unwrap_or_default())
)]
pub async fn reconcile(app: Arc<HelloApp>, ctx: Arc<Context>) -> Result<Action> {
    let key = ObjectKey::from_resource(app.as_ref())?;
    let cancel = ctx.shutdown.child_token();
    let requeue = reconcile_key(&key, &ctx, &cancel).await?;
    Ok(requeue.into())
}

/// Run one reconcile pass for the HelloApp at `key`.
///
/// Every store call is abandoned with [`Error::Cancelled`] once `cancel`
/// fires, or with [`Error::Timeout`] once the context's pass deadline passes.
/// Any store error ends the pass immediately.
pub async fn reconcile_key(
    key: &ObjectKey,
    ctx: &Context,
    cancel: &CancellationToken,
) -> Result<Requeue> {
    let pass = Pass::new(cancel, ctx.pass_timeout);
    ctx.metrics.record_pass();

    let Some(mut app) = pass
        .call("get HelloApp", ctx.kube.get_app(key))
        .await
        .inspect_err(|e| error!(error = %e, "failed to get HelloApp"))?
    else {
        info!("HelloApp not found, ignoring since it must have been deleted");
        return Ok(Requeue::Never);
    };

    if app.needs_initial_status() {
        let generation = app.generation();
        app.status_mut().set_condition(available_condition(
            ConditionStatus::Unknown,
            generation,
            "Starting reconciliation".to_string(),
        ));
        pass.call("update HelloApp status", ctx.kube.update_app_status(&app))
            .await
            .inspect_err(|e| error!(error = %e, "failed to update HelloApp status"))?;
        ctx.metrics.record_status_update();

        app = match pass
            .call("re-fetch HelloApp", ctx.kube.get_app(key))
            .await
            .inspect_err(|e| error!(error = %e, "failed to re-fetch HelloApp"))?
        {
            Some(app) => app,
            None => {
                info!("HelloApp deleted after status initialization");
                return Ok(Requeue::Never);
            }
        };
    }

    let desired = match build_deployment(&app, ctx.registrar.as_ref()) {
        Ok(deployment) => deployment,
        Err(e) => {
            error!(error = %e, "failed to define Deployment for HelloApp");
            let generation = app.generation();
            let message = format!("Failed to create Deployment: {e}");
            let changed = app.status_mut().set_condition(available_condition(
                ConditionStatus::False,
                generation,
                message.clone(),
            ));
            if changed {
                pass.call("update HelloApp status", ctx.kube.update_app_status(&app))
                    .await
                    .inspect_err(|e| error!(error = %e, "failed to update HelloApp status"))?;
                ctx.metrics.record_status_update();
                pass.best_effort(
                    "publish ownership failure event",
                    ctx.events.publish(
                        &app.object_ref(&()),
                        EventType::Warning,
                        reasons::OWNERSHIP_LINK_FAILED,
                        message,
                    ),
                )
                .await;
            }
            return Err(e);
        }
    };

    let Some(mut observed) = pass
        .call("get Deployment", ctx.kube.get_deployment(key))
        .await
        .inspect_err(|e| error!(error = %e, "failed to get Deployment"))?
    else {
        info!(
            deployment.namespace = %key.namespace,
            deployment.name = %key.name,
            "creating a new Deployment"
        );
        pass.call("create Deployment", ctx.kube.create_deployment(&desired))
            .await
            .inspect_err(|e| error!(error = %e, "failed to create new Deployment"))?;
        ctx.metrics.record_created();
        pass.best_effort(
            "publish create event",
            ctx.events.publish(
                &app.object_ref(&()),
                EventType::Normal,
                reasons::DEPLOYMENT_CREATED,
                format!("Created Deployment {key}"),
            ),
        )
        .await;
        return Ok(Requeue::Immediately);
    };

    let drifts = detect_drift(&observed, &desired);
    if !drifts.is_empty() {
        let fields: Vec<&str> = drifts.iter().map(|d| d.field()).collect();
        info!(?fields, "updating Deployment to match HelloApp");
        apply_drift(&mut observed, &drifts);
        pass.call("update Deployment", ctx.kube.update_deployment(&observed))
            .await
            .inspect_err(|e| error!(error = %e, "failed to update Deployment"))?;
        ctx.metrics.record_updated();
        pass.best_effort(
            "publish update event",
            ctx.events.publish(
                &app.object_ref(&()),
                EventType::Normal,
                reasons::DEPLOYMENT_UPDATED,
                format!("Updated {} of Deployment {key}", fields.join(", ")),
            ),
        )
        .await;
        return Ok(Requeue::Immediately);
    }

    let available_replicas = observed
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or_default();
    let generation = app.generation();
    let name = app.name_any();
    let status = app.status_mut();
    let condition_changed = status.set_condition(available_condition(
        ConditionStatus::True,
        generation,
        format!("Deployment for HelloApp ({name}) created successfully"),
    ));
    let replicas_changed = status.set_available_replicas(available_replicas);

    if condition_changed || replicas_changed {
        pass.call("update HelloApp status", ctx.kube.update_app_status(&app))
            .await
            .inspect_err(|e| error!(error = %e, "failed to update HelloApp status"))?;
        ctx.metrics.record_status_update();
        info!(available_replicas, "HelloApp status updated");
    } else {
        debug!("status unchanged, skipping update");
    }

    Ok(Requeue::Never)
}

/// Error policy for the HelloApp controller
///
/// Retryable failures come back after the configured back-off; anything else
/// waits for the object to change.
pub fn error_policy(app: Arc<HelloApp>, error: &Error, ctx: Arc<Context>) -> Action {
    ctx.metrics.record_error();
    if error.is_retryable() {
        warn!(
            error = %error,
            name = %app.name_any(),
            namespace = %app.namespace().unwrap_or_default(),
            "reconciliation failed, retrying"
        );
        Action::requeue(ctx.error_backoff)
    } else {
        error!(
            error = %error,
            name = %app.name_any(),
            namespace = %app.namespace().unwrap_or_default(),
            "reconciliation failed, waiting for a change"
        );
        Action::await_change()
    }
}

//! Wires the HelloApp reconciler into `kube::runtime`
//!
//! The dispatcher (watch, queue, per-object serialization, requeue timers)
//! is the kube-runtime `Controller`. This module only configures it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::controller::Config as ControllerConfig;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::OperatorConfig;
use crate::controller::{error_policy, reconcile, Context};
use crate::crd::HelloApp;
use crate::deployment::managed_selector;

/// Watcher timeout (seconds); must stay below the client read timeout (30s)
/// so idle watches are closed by the API server first.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the HelloApp controller future
///
/// Deployments carrying the `managed-by` label are watched as owned objects,
/// so any change to them re-triggers their HelloApp. The future completes
/// once `shutdown` fires and in-flight passes have returned.
pub fn build_hello_app_controller(
    client: Client,
    config: &OperatorConfig,
    ctx: Arc<Context>,
    shutdown: CancellationToken,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let (apps, deployments): (Api<HelloApp>, Api<Deployment>) = match &config.watch_namespace {
        Some(namespace) => {
            info!(%namespace, "watching a single namespace");
            (
                Api::namespaced(client.clone(), namespace),
                Api::namespaced(client, namespace),
            )
        }
        None => (Api::all(client.clone()), Api::all(client)),
    };

    Box::pin(
        Controller::new(apps, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .owns(
                deployments,
                WatcherConfig::default()
                    .timeout(WATCH_TIMEOUT_SECS)
                    .labels(&managed_selector()),
            )
            .with_config(ControllerConfig::default().concurrency(config.concurrency))
            .graceful_shutdown_on(shutdown.cancelled_owned())
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("HelloApp")),
    )
}

/// Cancel `shutdown` on SIGINT or SIGTERM
pub async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(object) => tracing::debug!(?object, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_on_signal_returns_when_token_cancelled() {
        let token = CancellationToken::new();
        let waiter = tokio::spawn(cancel_on_signal(token.clone()));
        token.cancel();
        waiter.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn log_reconcile_result_accepts_both_outcomes() {
        let log = log_reconcile_result::<&str, &str>("HelloApp");
        futures::executor::block_on(log(Ok("default/demo")));
        futures::executor::block_on(log(Err("boom")));
    }
}

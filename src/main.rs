//! hello-operator - Kubernetes operator for HelloApp resources

use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::CustomResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use hello_operator::config::OperatorConfig;
use hello_operator::controller::Context;
use hello_operator::controller_runner::{build_hello_app_controller, cancel_on_signal};
use hello_operator::crd::HelloApp;
use hello_operator::metrics::ReconcileMetrics;
use hello_operator::probes::{self, ProbeState};
use hello_operator::retry::RetryPolicy;
use hello_operator::startup;
use hello_operator::telemetry::init_tracing;

/// hello-operator - keeps a Deployment in sync with every HelloApp
#[derive(Parser, Debug)]
#[command(name = "hello-operator", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the HelloApp CRD as YAML and exit
    Crd,

    /// Run the controller (default mode)
    Run(OperatorConfig),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Crd) => {
            let crd = serde_yaml::to_string(&HelloApp::crd())
                .map_err(|e| anyhow::anyhow!("failed to serialize CRD: {}", e))?;
            println!("{crd}");
            Ok(())
        }
        Some(Commands::Run(config)) => run_controller(config).await,
        None => run_controller(OperatorConfig::parse_from(["hello-operator"])).await,
    }
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    init_tracing(config.log_format)?;
    config.validate()?;
    info!(?config, "starting hello-operator");

    let policy = RetryPolicy::default();
    let client = startup::connect(&policy).await?;
    if config.install_crd {
        startup::ensure_crd_installed(&client, &policy).await?;
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let metrics = Arc::new(ReconcileMetrics::new());
    let probe_state = ProbeState::new(metrics.clone());
    let probe_server = tokio::spawn(probes::serve(
        config.probe_addr,
        probe_state.clone(),
        shutdown.clone(),
    ));

    let ctx = Arc::new(
        Context::builder(client.clone())
            .metrics(metrics)
            .shutdown(shutdown.clone())
            .pass_timeout(config.reconcile_timeout())
            .error_backoff(config.error_backoff())
            .build(),
    );

    let controller = build_hello_app_controller(client, &config, ctx, shutdown.clone());
    probe_state.set_ready(true);
    info!("HelloApp controller running");
    controller.await;

    probe_state.set_ready(false);
    shutdown.cancel();
    match probe_server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "probe server exited with error"),
        Err(e) => error!(error = %e, "probe server task failed"),
    }

    info!("hello-operator stopped");
    Ok(())
}

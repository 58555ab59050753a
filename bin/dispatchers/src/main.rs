use anyhow::{Context, Result};
use clap::Parser;
use dispatcher_binrpc::BinRpcNotifier;
use dispatcher_core::{DefinitionDefaults, Supervisor, SupervisorOutcome};
use dispatcher_kube::{EndpointsSetFactory, KubeClient};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod runner;

use config::{Cli, Config};
use runner::Runner;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let defaults = DefinitionDefaults::from_env()?;
    let config = Arc::new(Config::from_cli(cli, &defaults)?);

    info!(
        "Starting dispatchers with {} sets, exporting to {}",
        config.definitions.len(),
        config.output.display()
    );

    let client = KubeClient::connect(config.kubeconfig.as_deref())
        .await
        .context("failed to create k8s client")?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let runner = Runner::new(
        config.clone(),
        Arc::new(EndpointsSetFactory::new(client.clone_client())),
        Arc::new(BinRpcNotifier::new(config.rpc_host.clone(), config.rpc_port)),
    );

    let mut supervisor = Supervisor::new(config.min_runtime, config.max_short_failures);
    let outcome = supervisor.run(&cancel, || runner.run_once(&cancel)).await;

    match &outcome {
        SupervisorOutcome::Shutdown => info!("Shutdown complete"),
        SupervisorOutcome::CrashLoop { short_failures } => {
            error!("Too many short-term deaths ({}), exiting", short_failures)
        }
        SupervisorOutcome::Fatal(reason) => error!("Exiting after fatal error: {}", reason),
    }

    std::process::exit(outcome.exit_code());
}

/// Cancel `cancel` on SIGINT or SIGTERM
async fn cancel_on_signal(cancel: CancellationToken) {
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }

    info!("Shutdown signal received, stopping...");
    cancel.cancel();
}

//! Labspace - multi-tenant lab environment provisioner for Kubernetes

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use labspace::control::KubeControlPlane;
use labspace::rbac;
use labspace::retry::RetryConfig;
use labspace::server::{router, AppState};

/// Labspace - provisions per-tenant lab environments in a shared cluster
#[derive(Parser, Debug)]
#[command(name = "labspace", version, about, long_about = None)]
struct Cli {
    /// Address to serve the HTTP API on
    #[arg(long, env = "LABSPACE_LISTEN", default_value = "0.0.0.0:3000")]
    listen: SocketAddr,

    /// Maximum attempts when waiting for a tenant's token secret
    #[arg(long, env = "LABSPACE_CREDENTIAL_ATTEMPTS", default_value = "20")]
    credential_attempts: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // In-cluster configuration when running as a pod, kubeconfig otherwise.
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {e}"))?;

    // The one process-wide control-plane handle; shared by reference, never
    // reassigned.
    let control = Arc::new(KubeControlPlane::new(client));

    // The cluster-wide namespace read role is bootstrapped once per process
    // start, not per request.
    rbac::ensure_cluster_read_role(control.as_ref()).await?;

    let retry = RetryConfig::with_max_attempts(cli.credential_attempts);
    let state = AppState::new(control, retry);

    tracing::info!(listen = %cli.listen, "Labspace listening");
    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

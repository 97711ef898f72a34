//! `callframe` echo server.
//!
//! Serves the `Echo` service over TCP until interrupted.

mod cli;

use std::sync::Arc;

use callframe::{
    config::CallConfig,
    echo::EchoService,
    server::{self, ServeConfig},
};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    install_metrics_exporter(&cli)?;

    let config = ServeConfig {
        call: CallConfig::default()
            .with_max_sidecars(cli.max_sidecars)
            .with_log_all_traces(cli.log_all_traces),
        max_frame_len: cli.max_frame_len,
    };
    let listener = TcpListener::bind(cli.bind).await?;
    info!(address = %listener.local_addr()?, "serving Echo");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "unable to listen for ctrl-c");
            return;
        }
        info!("shutting down");
        signal.cancel();
    });

    server::serve(listener, Arc::new(EchoService), config, shutdown).await?;
    Ok(())
}

#[cfg(feature = "prometheus")]
fn install_metrics_exporter(cli: &cli::Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(address) = cli.metrics_bind {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(address)
            .install()?;
        info!(%address, "serving Prometheus metrics");
    }
    Ok(())
}

#[cfg(not(feature = "prometheus"))]
fn install_metrics_exporter(cli: &cli::Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.metrics_bind.is_some() {
        warn!("--metrics-bind ignored: built without the prometheus feature");
    }
    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use stream_relay::config::AppConfig;
use stream_relay::controller::RelayController;
use stream_relay::logging::init_logging;
use stream_relay::probe::{HttpPublisherSource, ReconciliationProbe};
use stream_relay::registry::RelayRegistry;
use stream_relay::server::ApiServer;

/// RTSP to RTMP relay control API
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overrides the configured one
    #[arg(long, env = "RELAY_LOG_LEVEL")]
    log_level: Option<String>,

    /// API bind address, overrides the configured one
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    init_logging(&config.logging)?;

    let server_config = config.server_config()?;
    let registry = Arc::new(RelayRegistry::with_config(config.registry_config()));

    let probe_config = config.probe_config();
    let source = Arc::new(HttpPublisherSource::new(
        probe_config.url.clone(),
        probe_config.request_timeout,
    )?);
    let probe = Arc::new(ReconciliationProbe::new(
        Arc::clone(&registry),
        source,
        probe_config,
    ));

    let controller = Arc::new(RelayController::new(
        registry,
        probe,
        config.controller_config(),
    ));

    tracing::info!(
        relay_host = %config.relay.host,
        app = %config.relay.app,
        transcoder = %config.transcoder.binary,
        "Starting stream relay"
    );

    ApiServer::new(server_config, controller)
        .run_until(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

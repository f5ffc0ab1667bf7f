//! Relay from the coilcast Modbus server to HTTP and WebSocket clients.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::Parser;
use coilcast_common::{LoggingConfig, SamplePair};
use coilcast_relay::{AppState, HttpServer, RelayConfig, SessionLog};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Relay epoch time and sin(t) coils to web clients.
#[derive(Parser, Debug)]
#[command(name = "coilcast-relay")]
#[command(about = "Serve coilcast samples over HTTP and WebSocket")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Modbus server host (overrides config).
    #[arg(long)]
    modbus_host: Option<String>,

    /// Poll the server continuously and log samples instead of serving HTTP.
    #[arg(long)]
    standalone: bool,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => RelayConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => RelayConfig::default(),
    };

    if let Some(listen) = args.listen {
        config.http.listen = listen;
    }
    if let Some(host) = args.modbus_host {
        config.modbus.host = host;
    }
    config.validate()?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    coilcast_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!(
        host = %config.modbus.host,
        port = config.modbus.port,
        "Starting coilcast-relay"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let session_log = Arc::new(SessionLog::new(config.session_log.directory.clone()));

    let task = if args.standalone {
        let client = coilcast_relay::PollingClient::new(
            config.modbus.connector(),
            config.modbus.settings(),
        );
        let log = session_log.clone();
        tokio::spawn(client.run(
            config.modbus.poll_interval(),
            shutdown_rx,
            move |sample| {
                info!(
                    time = %wall_clock(&sample),
                    epoch_time = sample.epoch_time,
                    sin_value = sample.sin_value,
                    "Sample"
                );
                if let Err(e) = log.record(&sample) {
                    warn!(error = %e, "Session log write failed");
                }
            },
        ))
    } else {
        let state = AppState::new(
            config.modbus.connector(),
            config.modbus.settings(),
            session_log,
        );
        let listen_addr = config.http.listen_addr()?;
        let server = HttpServer::bind(listen_addr, state, config.http.cors_origins.clone())
            .await
            .with_context(|| format!("Failed to bind HTTP relay to {}", listen_addr))?;

        tokio::spawn(async move {
            if let Err(e) = server.run(shutdown_rx).await {
                error!("HTTP relay error: {}", e);
            }
        })
    };

    coilcast_common::shutdown_signal().await;

    // Signal shutdown
    let _ = shutdown_tx.send(true);

    // Wait for the task to complete
    let _ = tokio::time::timeout(Duration::from_secs(5), task).await;

    info!("coilcast-relay stopped");
    Ok(())
}

/// Local date and time of a sample, for display.
fn wall_clock(sample: &SamplePair) -> String {
    let secs = sample.epoch_time.floor();
    let nanos = ((sample.epoch_time - secs) * 1e9) as u32;

    match Local.timestamp_opt(secs as i64, nanos).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => format!("<invalid time {}>", sample.epoch_time),
    }
}

//! Modbus/TCP coil server.
//!
//! Publishes epoch time and sin(epoch time) as coils on port 5020.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use coilcast_common::{CoilBank, LoggingConfig};
use coilcast_server::{CoilPublisher, ModbusServer, ServerConfig};
use tokio::sync::watch;
use tracing::{error, info};

/// Modbus/TCP server publishing epoch time and its sine as coils.
#[derive(Parser, Debug)]
#[command(name = "coilcast-server")]
#[command(about = "Publishes epoch time and sin(t) over Modbus/TCP coils")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Modbus listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => ServerConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => ServerConfig::default(),
    };

    if let Some(listen) = args.listen {
        config.modbus.listen = listen;
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

    info!("Starting coilcast-server");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let bank = CoilBank::new();

    // Publish a first sample before accepting any client
    let publisher = CoilPublisher::new(bank.clone(), config.modbus.update_interval());
    publisher.tick();

    let listen_addr = config.modbus.listen_addr()?;
    let server = ModbusServer::bind(listen_addr, bank)
        .await
        .with_context(|| format!("Failed to bind Modbus server to {}", listen_addr))?;

    let publisher_task = tokio::spawn(publisher.run(shutdown_rx.clone()));
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run(shutdown_rx).await {
            error!("Modbus server error: {}", e);
        }
    });

    coilcast_common::shutdown_signal().await;

    // Signal shutdown
    let _ = shutdown_tx.send(true);

    // Wait for tasks to complete
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = publisher_task.await;
        let _ = server_task.await;
    })
    .await;

    info!("coilcast-server stopped");
    Ok(())
}

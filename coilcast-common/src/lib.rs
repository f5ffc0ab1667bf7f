//! Coilcast Common Library
//!
//! Shared pieces of the coilcast server and relay:
//!
//! - [`codec`] - IEEE-754 floats to and from MSB-first coil arrays
//! - [`coil`] - The coil bank, its fixed region layout and [`SamplePair`]
//! - [`config`] - Logging settings shared by both configurations
//! - [`error`] - Error types

pub mod codec;
pub mod coil;
pub mod config;
pub mod error;

// Re-export commonly used types at the crate root
pub use codec::{decode_f32, decode_f64, encode_f32, encode_f64};
pub use coil::{
    BANK_SIZE, CoilBank, CoilError, SIN_COUNT, SIN_OFFSET, SamplePair, TIME_COUNT, TIME_OFFSET,
};
pub use config::{LogFormat, LoggingConfig};
pub use error::{Error, Result};

/// Default Modbus/TCP port. Non-standard so it can be bound without privileges.
pub const DEFAULT_MODBUS_PORT: u16 = 5020;

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over `config.level` when set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}

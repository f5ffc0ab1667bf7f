//! Modbus-to-web relay for coilcast.
//!
//! Reads the epoch time and sine coils from a coilcast server and hands them
//! to browsers over HTTP and WebSocket, recording every sample in a session
//! log file.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  Modbus server  │────>│  PollingClient  │────>│   HTTP relay    │
//! │  (coils 0..96)  │     │ (reconnecting)  │     │  (/, /reset,    │
//! └─────────────────┘     └─────────────────┘     │   /ws)          │
//!                                  │               └─────────────────┘
//!                                  v
//!                         ┌─────────────────┐
//!                         │   SessionLog    │
//!                         └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! coilcast-relay --config relay.json5
//! coilcast-relay --standalone
//! ```
//!
//! See [`config::RelayConfig`] for configuration options.

pub mod config;
pub mod http;
pub mod poller;
pub mod session_log;
pub mod transport;
pub mod ws;

pub use config::RelayConfig;
pub use http::{AppState, HttpServer, cors_layer, create_router};
pub use poller::{ClientSettings, ClientState, CycleError, PollingClient};
pub use session_log::{SessionLog, SharedSessionLog};
pub use transport::TcpConnector;

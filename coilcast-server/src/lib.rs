//! Modbus/TCP coil server for coilcast.
//!
//! Publishes the current epoch time and its sine into a shared coil bank on a
//! fixed interval and serves Read Coils requests against that bank.
//!
//! # Coil layout
//!
//! ```text
//! 0..64   epoch seconds, f64, MSB first
//! 64..96  sin(epoch seconds), f32, MSB first
//! ```

pub mod config;
pub mod publisher;
pub mod server;
pub mod service;

pub use config::ServerConfig;
pub use publisher::{Clock, CoilPublisher, SystemClock};
pub use server::ModbusServer;
pub use service::CoilService;

//! Modbus/TCP transport for the polling client.

use std::net::SocketAddr;

use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::debug;

use crate::poller::{CoilTransport, Connector, CycleError};

/// Connects to a Modbus/TCP server by host name and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConnector {
    host: String,
    port: u16,
    unit_id: u8,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, unit_id: u8) -> Self {
        Self {
            host: host.into(),
            port,
            unit_id,
        }
    }

    /// Connector for a resolved socket address.
    pub fn from_addr(addr: SocketAddr, unit_id: u8) -> Self {
        Self::new(addr.ip().to_string(), addr.port(), unit_id)
    }

    async fn resolve(&self) -> Result<SocketAddr, CycleError> {
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| CycleError::TransportGone(format!("Invalid address: {}", e)))?
            .next()
            .ok_or_else(|| {
                CycleError::TransportGone(format!("No address for {}:{}", self.host, self.port))
            })
    }
}

impl Connector for TcpConnector {
    type Transport = ModbusTransport;

    async fn connect(&self) -> Result<ModbusTransport, CycleError> {
        let addr = self.resolve().await?;
        debug!(addr = %addr, unit_id = self.unit_id, "Connecting to Modbus server");

        let ctx = tcp::connect_slave(addr, Slave(self.unit_id))
            .await
            .map_err(|e| CycleError::TransportGone(e.to_string()))?;

        Ok(ModbusTransport { ctx })
    }
}

/// An open Modbus/TCP client context.
pub struct ModbusTransport {
    ctx: Context,
}

impl CoilTransport for ModbusTransport {
    async fn read_coils(&mut self, addr: u16, cnt: u16) -> Result<Vec<bool>, CycleError> {
        self.ctx
            .read_coils(addr, cnt)
            .await
            .map_err(classify)?
            .map_err(|code| CycleError::Protocol(format!("Exception: {:?}", code)))
    }
}

fn classify(err: tokio_modbus::Error) -> CycleError {
    match err {
        tokio_modbus::Error::Transport(e) => CycleError::TransportGone(e.to_string()),
        other => CycleError::Protocol(other.to_string()),
    }
}

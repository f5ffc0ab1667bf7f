//! Modbus/TCP endpoint serving the coil bank.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use coilcast_common::CoilBank;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_modbus::server::tcp::Server;
use tracing::{debug, error, info};

use crate::service::CoilService;

/// A bound Modbus/TCP server.
///
/// Every accepted connection gets its own [`CoilService`] over the shared bank.
pub struct ModbusServer {
    listener: TcpListener,
    bank: CoilBank,
}

impl ModbusServer {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr, bank: CoilBank) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, bank })
    }

    /// The address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the shutdown signal is received.
    ///
    /// The listening socket is released when this returns, and every accepted
    /// connection sees end-of-stream and is closed by its connection task.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let local_addr = self.listener.local_addr()?;
        let bank = self.bank;
        let server = Server::new(self.listener);
        let connection_shutdown = shutdown.clone();

        let on_connected = move |stream: TcpStream, socket_addr: SocketAddr| {
            let service = CoilService::new(bank.clone());
            let stream = ConnectionStream::new(stream, connection_shutdown.clone());
            async move {
                debug!(peer = %socket_addr, "Modbus client connected");
                Ok::<_, io::Error>(Some((service, stream)))
            }
        };
        let on_process_error = |err: io::Error| {
            error!(error = %err, "Modbus connection error");
        };

        info!(addr = %local_addr, "Modbus server listening");

        tokio::select! {
            result = server.serve(&on_connected, on_process_error) => {
                result.map_err(|e| anyhow::anyhow!("Modbus server error: {}", e))?;
            }
            _ = shutdown.wait_for(|stop| *stop) => {
                info!("Modbus server shutting down");
            }
        }

        info!("Modbus server stopped");
        Ok(())
    }
}

/// A connection that reads as end-of-stream once shutdown is signalled.
///
/// The Modbus connection loop treats end-of-stream as the peer leaving, so it
/// returns and drops the socket.
struct ConnectionStream<S> {
    inner: S,
    shutdown: Pin<Box<dyn Future<Output = ()> + Send>>,
    closed: bool,
}

impl<S> ConnectionStream<S> {
    fn new(inner: S, mut shutdown: watch::Receiver<bool>) -> Self {
        Self {
            inner,
            shutdown: Box::pin(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            }),
            closed: false,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for ConnectionStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if !this.closed && this.shutdown.as_mut().poll(cx).is_ready() {
            this.closed = true;
        }
        if this.closed {
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ConnectionStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

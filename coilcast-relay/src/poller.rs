//! Reconnecting Modbus coil poller.
//!
//! A [`PollingClient`] moves through these states:
//!
//! ```text
//!  Disconnected ──> Connecting ──> Reading ──┐ sample / timeout
//!       ^               │            │  ^    │
//!       │          fault│       fault│  └────┘
//!       │               v            v
//!       └────backoff─── Faulted <────┘
//!
//!  any state ──stop──> Stopped
//! ```
//!
//! Transport faults never escape as raw errors: a caller only sees a
//! [`SamplePair`] or a [`CycleError`] classifying why this cycle produced none.

use std::future::Future;
use std::time::Duration;

use coilcast_common::{SIN_COUNT, SIN_OFFSET, SamplePair, TIME_COUNT, TIME_OFFSET};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Why a cycle produced no sample.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CycleError {
    #[error("Transport gone: {0}")]
    TransportGone(String),
    #[error("Read timed out")]
    Timeout,
    #[error("Protocol violation: {0}")]
    Protocol(String),
    #[error("Cycle cancelled")]
    Cancelled,
}

impl CycleError {
    /// Short classification, safe to hand to external consumers.
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::TransportGone(_) => "modbus transport unavailable",
            CycleError::Timeout => "modbus read timed out",
            CycleError::Protocol(_) => "modbus protocol violation",
            CycleError::Cancelled => "read cancelled",
        }
    }

    /// Whether the connection must be torn down and rebuilt.
    fn is_fatal(&self) -> bool {
        matches!(self, CycleError::TransportGone(_) | CycleError::Protocol(_))
    }
}

/// Connection state of a [`PollingClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Reading,
    Faulted,
    Stopped,
}

/// A live connection able to read coils.
pub trait CoilTransport: Send {
    /// Read `cnt` coils starting at `addr`.
    fn read_coils(
        &mut self,
        addr: u16,
        cnt: u16,
    ) -> impl Future<Output = Result<Vec<bool>, CycleError>> + Send;
}

/// Opens new [`CoilTransport`]s.
pub trait Connector: Send + Sync {
    type Transport: CoilTransport;

    fn connect(&self) -> impl Future<Output = Result<Self::Transport, CycleError>> + Send;
}

/// Timing parameters of a polling client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    /// Deadline for establishing a connection.
    pub connect_timeout: Duration,
    /// Deadline for each coil read request.
    pub read_timeout: Duration,
    /// Backoff after a failed cycle.
    pub retry_delay: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Reads [`SamplePair`]s over a [`Connector`], reconnecting after faults.
///
/// Reads from one client are strictly sequential. The connection is owned by
/// the client and is never shared with another one.
pub struct PollingClient<C: Connector> {
    connector: C,
    settings: ClientSettings,
    transport: Option<C::Transport>,
    state: ClientState,
}

impl<C: Connector> PollingClient<C> {
    pub fn new(connector: C, settings: ClientSettings) -> Self {
        Self {
            connector,
            settings,
            transport: None,
            state: ClientState::Disconnected,
        }
    }

    /// Current state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Timing parameters in use.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Run one read-decode cycle, connecting first if needed.
    ///
    /// No backoff is applied; see [`PollingClient::poll_once`].
    pub async fn cycle(&mut self) -> Result<SamplePair, CycleError> {
        if self.state == ClientState::Stopped {
            return Err(CycleError::Cancelled);
        }

        if self.transport.is_none() {
            self.connect().await?;
        }

        match self.read_sample().await {
            Ok(sample) => Ok(sample),
            Err(e) => {
                if e.is_fatal() {
                    self.fault(&e);
                } else {
                    debug!(error = %e, "Cycle failed, keeping connection");
                }
                Err(e)
            }
        }
    }

    /// Run one cycle; on failure back off before reporting it.
    ///
    /// After a fault the backoff also discards the stale connection, so the
    /// next call starts from [`ClientState::Disconnected`].
    pub async fn poll_once(&mut self) -> Result<SamplePair, CycleError> {
        let result = self.cycle().await;
        if let Err(ref e) = result {
            if *e != CycleError::Cancelled {
                tokio::time::sleep(self.settings.retry_delay).await;
                self.after_backoff();
            }
        }
        result
    }

    /// Poll continuously until shutdown, handing each sample to `on_sample`.
    ///
    /// Successful cycles are spaced by `interval`, failed ones by the retry
    /// delay. Shutdown abandons any in-flight read without emitting a sample.
    pub async fn run<F>(
        mut self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
        mut on_sample: F,
    ) where
        F: FnMut(SamplePair) + Send,
    {
        info!(interval_ms = interval.as_millis() as u64, "Poller started");

        loop {
            let outcome = tokio::select! {
                result = self.cycle() => result,
                _ = shutdown.wait_for(|stop| *stop) => break,
            };

            let pause = match outcome {
                Ok(sample) => {
                    on_sample(sample);
                    interval
                }
                Err(CycleError::Cancelled) => break,
                Err(e) => {
                    debug!(error = %e, "No sample this cycle");
                    self.settings.retry_delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => self.after_backoff(),
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }

        self.stop();
        info!("Poller stopped");
    }

    /// Drop the connection and refuse further cycles.
    pub fn stop(&mut self) {
        self.transport = None;
        self.transition(ClientState::Stopped);
    }

    async fn connect(&mut self) -> Result<(), CycleError> {
        self.transition(ClientState::Connecting);

        let attempt = tokio::time::timeout(self.settings.connect_timeout, self.connector.connect());
        let connected = match attempt.await {
            Ok(result) => result,
            Err(_) => Err(CycleError::TransportGone("connect timed out".to_string())),
        };

        match connected {
            Ok(transport) => {
                self.transport = Some(transport);
                self.transition(ClientState::Reading);
                Ok(())
            }
            Err(e) => {
                self.fault(&e);
                Err(e)
            }
        }
    }

    async fn read_sample(&mut self) -> Result<SamplePair, CycleError> {
        let time_bits = self.read_region(TIME_OFFSET, TIME_COUNT).await?;
        let sin_bits = self.read_region(SIN_OFFSET, SIN_COUNT).await?;

        SamplePair::from_coils(&time_bits, &sin_bits)
            .ok_or_else(|| CycleError::Protocol("coil regions have the wrong width".to_string()))
    }

    async fn read_region(&mut self, addr: u16, cnt: u16) -> Result<Vec<bool>, CycleError> {
        let read_timeout = self.settings.read_timeout;
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| CycleError::TransportGone("no connection".to_string()))?;

        let bits = tokio::time::timeout(read_timeout, transport.read_coils(addr, cnt))
            .await
            .map_err(|_| CycleError::Timeout)??;

        if bits.len() != usize::from(cnt) {
            return Err(CycleError::Protocol(format!(
                "expected {} coils at {}, got {}",
                cnt,
                addr,
                bits.len()
            )));
        }

        Ok(bits)
    }

    fn fault(&mut self, error: &CycleError) {
        warn!(error = %error, "Modbus connection faulted");
        self.transport = None;
        self.transition(ClientState::Faulted);
    }

    fn after_backoff(&mut self) {
        if self.state == ClientState::Faulted {
            self.transport = None;
            self.transition(ClientState::Disconnected);
        }
    }

    fn transition(&mut self, next: ClientState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Client state change");
            self.state = next;
        }
    }
}

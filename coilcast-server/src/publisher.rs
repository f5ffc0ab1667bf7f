//! Periodic publishing of the current time and its sine into the coil bank.

use std::time::Duration;

use coilcast_common::{CoilBank, SamplePair};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, trace};

/// Source of wall-clock time, in seconds since the Unix epoch.
pub trait Clock: Send + Sync + 'static {
    fn epoch_secs(&self) -> f64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_secs(&self) -> f64 {
        chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Keeps the coil bank current.
///
/// Each tick samples the clock once and rewrites both coil regions under the
/// bank lock, so a tick is never observed half-applied.
pub struct CoilPublisher<C: Clock = SystemClock> {
    bank: CoilBank,
    clock: C,
    interval: Duration,
}

impl CoilPublisher<SystemClock> {
    /// Create a publisher driven by the system clock.
    pub fn new(bank: CoilBank, interval: Duration) -> Self {
        Self::with_clock(bank, interval, SystemClock)
    }
}

impl<C: Clock> CoilPublisher<C> {
    /// Create a publisher driven by `clock`.
    pub fn with_clock(bank: CoilBank, interval: Duration, clock: C) -> Self {
        Self {
            bank,
            clock,
            interval,
        }
    }

    /// The bank this publisher writes to.
    pub fn bank(&self) -> &CoilBank {
        &self.bank
    }

    /// Perform a single tick and return the sample written.
    pub fn tick(&self) -> SamplePair {
        let sample = SamplePair::at(self.clock.epoch_secs());
        self.bank.publish(&sample);
        sample
    }

    /// Tick every interval until shutdown is signalled.
    ///
    /// A slow tick delays the following ones instead of bursting to catch up.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Coil publisher started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let sample = self.tick();
                    trace!(
                        epoch_time = sample.epoch_time,
                        sin_value = sample.sin_value,
                        "Published sample"
                    );
                }
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }

        info!("Coil publisher stopped");
    }
}

//! The shared coil bank and its fixed region layout.
//!
//! # Layout
//!
//! | Offset    | Length | Content                                   |
//! |-----------|--------|-------------------------------------------|
//! | `0..64`   | 64     | epoch seconds as `f64`, MSB first          |
//! | `64..96`  | 32     | `sin(epoch seconds)` as `f32`, MSB first   |
//!
//! Addresses at and beyond [`BANK_SIZE`] are not part of the protocol.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{self, F32_BITS, F64_BITS};

/// First coil of the epoch time region.
pub const TIME_OFFSET: u16 = 0;
/// Number of coils in the epoch time region.
pub const TIME_COUNT: u16 = F64_BITS as u16;
/// First coil of the sine region.
pub const SIN_OFFSET: u16 = TIME_OFFSET + TIME_COUNT;
/// Number of coils in the sine region.
pub const SIN_COUNT: u16 = F32_BITS as u16;
/// Total number of coils served.
pub const BANK_SIZE: usize = (SIN_OFFSET + SIN_COUNT) as usize;

/// Errors raised by out-of-range bank access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoilError {
    #[error("coil range {offset}+{count} is outside the coil bank")]
    OutOfRange { offset: u16, count: usize },
}

/// One published sample: the epoch time and its sine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePair {
    /// Wall-clock time in seconds since the Unix epoch.
    pub epoch_time: f64,
    /// `sin(epoch_time)` truncated to single precision.
    pub sin_value: f32,
}

impl SamplePair {
    /// Build the sample published at `epoch_time`.
    pub fn at(epoch_time: f64) -> Self {
        Self {
            epoch_time,
            sin_value: epoch_time.sin() as f32,
        }
    }

    /// Decode a sample from the raw contents of both regions.
    ///
    /// Returns `None` if either slice has the wrong number of coils.
    pub fn from_coils(time_bits: &[bool], sin_bits: &[bool]) -> Option<Self> {
        let time_bits: &[bool; F64_BITS] = time_bits.try_into().ok()?;
        let sin_bits: &[bool; F32_BITS] = sin_bits.try_into().ok()?;

        Some(Self {
            epoch_time: codec::decode_f64(time_bits),
            sin_value: codec::decode_f32(sin_bits),
        })
    }
}

/// Fixed-size coil storage shared between the publisher and server connections.
///
/// Every access takes the same lock, so a read never mixes regions written by
/// two different ticks.
#[derive(Debug, Clone)]
pub struct CoilBank {
    cells: Arc<Mutex<[bool; BANK_SIZE]>>,
}

impl Default for CoilBank {
    fn default() -> Self {
        Self::new()
    }
}

impl CoilBank {
    /// Create a bank with every coil cleared.
    pub fn new() -> Self {
        Self {
            cells: Arc::new(Mutex::new([false; BANK_SIZE])),
        }
    }

    /// Overwrite both regions with `sample` in a single critical section.
    pub fn publish(&self, sample: &SamplePair) {
        let time_bits = codec::encode_f64(sample.epoch_time);
        let sin_bits = codec::encode_f32(sample.sin_value);

        let mut cells = self.cells.lock();
        cells[region(TIME_OFFSET, TIME_COUNT)].copy_from_slice(&time_bits);
        cells[region(SIN_OFFSET, SIN_COUNT)].copy_from_slice(&sin_bits);
    }

    /// Overwrite `bits.len()` coils starting at `offset`.
    pub fn write(&self, offset: u16, bits: &[bool]) -> Result<(), CoilError> {
        let range = checked_range(offset, bits.len())?;
        self.cells.lock()[range].copy_from_slice(bits);
        Ok(())
    }

    /// Read `count` coils starting at `offset`.
    pub fn read(&self, offset: u16, count: u16) -> Result<Vec<bool>, CoilError> {
        let range = checked_range(offset, usize::from(count))?;
        Ok(self.cells.lock()[range].to_vec())
    }

    /// Decode the sample currently held by the bank.
    pub fn snapshot(&self) -> SamplePair {
        let cells = *self.cells.lock();
        let time_bits: [bool; F64_BITS] = std::array::from_fn(|i| cells[i]);
        let sin_bits: [bool; F32_BITS] = std::array::from_fn(|i| cells[SIN_OFFSET as usize + i]);

        SamplePair {
            epoch_time: codec::decode_f64(&time_bits),
            sin_value: codec::decode_f32(&sin_bits),
        }
    }
}

fn region(offset: u16, count: u16) -> std::ops::Range<usize> {
    usize::from(offset)..usize::from(offset) + usize::from(count)
}

fn checked_range(offset: u16, count: usize) -> Result<std::ops::Range<usize>, CoilError> {
    let start = usize::from(offset);
    match start.checked_add(count) {
        Some(end) if end <= BANK_SIZE => Ok(start..end),
        _ => Err(CoilError::OutOfRange { offset, count }),
    }
}

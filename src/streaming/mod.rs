//! Block streaming with back-pressure.
//!
//! The renderer produces one block per call; this module buffers those
//! blocks towards a consumer that pulls at its own pace (the audio device,
//! or anything else driving a [`RingBuffer`]). The producer checks
//! [`RingBuffer::available_write`] and simply renders later when the
//! consumer is behind.

mod audio_device;

pub use audio_device::AudioDevice;

use crate::{Mp2kError, Result};

/// Single-producer single-consumer sample FIFO.
///
/// Plain index arithmetic under an external lock; the streaming path wraps
/// it in `parking_lot::Mutex` and shares it between the render loop and the
/// device callback.
#[derive(Debug)]
pub struct RingBuffer {
    data: Vec<f32>,
    read_pos: usize,
    write_pos: usize,
    /// Distinguishes full from empty when read_pos == write_pos
    filled: usize,
}

impl RingBuffer {
    /// Create a buffer holding up to `capacity` samples.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Mp2kError::Config("ring buffer capacity must be > 0".into()));
        }
        Ok(RingBuffer {
            data: vec![0.0; capacity],
            read_pos: 0,
            write_pos: 0,
            filled: 0,
        })
    }

    /// Samples available for reading.
    pub fn available_read(&self) -> usize {
        self.filled
    }

    /// Free space in samples.
    pub fn available_write(&self) -> usize {
        self.data.len() - self.filled
    }

    /// Append as many samples as fit; returns how many were taken.
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let count = samples.len().min(self.available_write());
        for &s in &samples[..count] {
            self.data[self.write_pos] = s;
            self.write_pos = (self.write_pos + 1) % self.data.len();
        }
        self.filled += count;
        count
    }

    /// Pop up to `out.len()` samples; returns how many were produced.
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        let count = out.len().min(self.filled);
        for o in &mut out[..count] {
            *o = self.data[self.read_pos];
            self.read_pos = (self.read_pos + 1) % self.data.len();
        }
        self.filled -= count;
        count
    }

    /// Drop all buffered samples.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.filled = 0;
    }
}

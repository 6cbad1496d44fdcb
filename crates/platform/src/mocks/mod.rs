//! Mock implementations for testing
//!
//! [`MockOutput`] stands in for the DAC/I2S channel. It is moved into the
//! audio track, so tests observe it through the [`OutputProbe`] returned
//! alongside it.

#![cfg(any(test, feature = "std"))]
// Test doubles: plain arithmetic and slicing on recorded state.
#![allow(clippy::arithmetic_side_effects, clippy::indexing_slicing)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::vec::Vec;

use crate::audio::{AudioOutput, Half, OutputError, OutputParams};
use crate::tws::TwsObserver;

/// Everything the mock output has been asked to do.
#[derive(Debug, Default, Clone)]
pub struct MockOutputState {
    /// Parameters from the last successful `open`.
    pub params: Option<OutputParams>,
    /// `open` succeeded and `close` has not been called.
    pub opened: bool,
    /// `close` has been called.
    pub closed: bool,
    /// DMA running.
    pub started: bool,
    /// Number of `start` calls.
    pub start_calls: usize,
    /// Hardware mute state.
    pub muted: bool,
    /// Last PA gain written.
    pub pa_mdb: Option<i32>,
    /// Last L/R enable written.
    pub lr_enable: Option<(bool, bool)>,
    /// Last thresholds written.
    pub threshold: Option<(u32, u32)>,
    /// Every byte handed to the hardware, in order.
    pub delivered: Vec<u8>,
    /// Length of each `write_data` call.
    pub writes: Vec<usize>,
    /// `(half, len)` of each `commit_reload` call.
    pub reloads: Vec<(Half, usize)>,
    /// Simulated DMA FIFO fill, in samples.
    pub fifo_samples: usize,
    /// Simulated DMA FIFO size, in samples.
    pub fifo_capacity: usize,
    /// Samples "played" by [`OutputProbe::drain`].
    pub played_samples: u32,
    /// Make the next `open` fail.
    pub fail_open: bool,
    /// Accept at most this many bytes per `write_data`.
    pub write_limit: Option<usize>,
}

impl MockOutputState {
    fn bytes_per_sample(&self) -> usize {
        self.params.map_or(2, |p| p.format.bytes_per_sample())
    }
}

/// Mock hardware output channel.
pub struct MockOutput {
    state: Arc<Mutex<MockOutputState>>,
}

/// Test-side view of a [`MockOutput`].
#[derive(Clone)]
pub struct OutputProbe {
    state: Arc<Mutex<MockOutputState>>,
}

impl MockOutput {
    /// A mock with a FIFO of `fifo_capacity` samples.
    pub fn new(fifo_capacity: usize) -> (Self, OutputProbe) {
        let state = Arc::new(Mutex::new(MockOutputState {
            fifo_capacity,
            ..MockOutputState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            OutputProbe { state },
        )
    }

    /// A mock whose `open` fails.
    pub fn failing() -> (Self, OutputProbe) {
        let (out, probe) = Self::new(0);
        probe.lock().fail_open = true;
        (out, probe)
    }

    fn lock(&self) -> MutexGuard<'_, MockOutputState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl OutputProbe {
    /// Lock the recorded state.
    pub fn lock(&self) -> MutexGuard<'_, MockOutputState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Copy of every delivered byte.
    pub fn delivered(&self) -> Vec<u8> {
        self.lock().delivered.clone()
    }

    /// Delivered bytes as 16-bit samples.
    pub fn delivered_i16(&self) -> Vec<i16> {
        self.lock()
            .delivered
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    /// Simulate the DMA engine playing up to `samples` samples from the FIFO.
    pub fn drain(&self, samples: usize) {
        let mut s = self.lock();
        let n = samples.min(s.fifo_samples);
        s.fifo_samples -= n;
        s.played_samples = s.played_samples.wrapping_add(u32::try_from(n).unwrap_or(u32::MAX));
    }

    /// Limit how many bytes each `write_data` accepts.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.lock().write_limit = limit;
    }
}

impl AudioOutput for MockOutput {
    fn open(&mut self, params: &OutputParams) -> Result<(), OutputError> {
        let mut s = self.lock();
        if s.fail_open {
            return Err(OutputError::OpenFailed);
        }
        s.params = Some(*params);
        s.opened = true;
        s.pa_mdb = Some(params.initial_pa_mdb);
        Ok(())
    }

    fn close(&mut self) {
        let mut s = self.lock();
        s.opened = false;
        s.closed = true;
        s.started = false;
    }

    fn start(&mut self) {
        let mut s = self.lock();
        s.started = true;
        s.start_calls += 1;
    }

    fn stop(&mut self) {
        self.lock().started = false;
    }

    fn write_data(&mut self, data: &[u8]) -> usize {
        let mut s = self.lock();
        let n = s.write_limit.map_or(data.len(), |l| l.min(data.len()));
        s.delivered.extend_from_slice(&data[..n]);
        s.writes.push(n);
        let bps = s.bytes_per_sample();
        s.fifo_samples += n / bps;
        n
    }

    fn commit_reload(&mut self, half: Half, data: &[u8]) {
        let mut s = self.lock();
        s.delivered.extend_from_slice(data);
        s.reloads.push((half, data.len()));
    }

    fn set_threshold(&mut self, half_empty: u32, half_full: u32) {
        self.lock().threshold = Some((half_empty, half_full));
    }

    fn buffer_space(&self) -> usize {
        let s = self.lock();
        s.fifo_capacity.saturating_sub(s.fifo_samples)
    }

    fn buffer_size(&self) -> usize {
        self.lock().fifo_capacity
    }

    fn mute_ctl(&mut self, mute: bool) {
        self.lock().muted = mute;
    }

    fn set_pa_vol_level(&mut self, milli_db: i32) {
        self.lock().pa_mdb = Some(milli_db);
    }

    fn lr_channel_enable(&mut self, left: bool, right: bool) {
        self.lock().lr_enable = Some((left, right));
    }

    fn sample_count(&self) -> u32 {
        self.lock().played_samples
    }
}

/// Fixed-clock TWS observer.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockTws {
    /// Value returned by `play_time_us`.
    pub play_time_us: u64,
    /// Value returned by `peer_clock_us`.
    pub peer_clock_us: u64,
}

impl TwsObserver for MockTws {
    fn play_time_us(&self) -> u64 {
        self.play_time_us
    }

    fn peer_clock_us(&self) -> u64 {
        self.peer_clock_us
    }
}

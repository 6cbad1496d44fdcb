//! Shared fixtures for the audio-track integration tests.
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use audio_track::{AudioSystem, AudioTrack, MixSource, OpenMode, TrackCell, TrackParams};
use embedded_hal_async::delay::DelayNs;
use platform::mocks::{MockOutput, OutputProbe};
use platform::{AudioMode, OutputRouting, RefillReason, SampleRateHz, StreamType, TablePolicy};

pub type Track = AudioTrack<'static, MockOutput>;

pub fn region(len: usize) -> &'static mut [u8] {
    Box::leak(vec![0u8; len].into_boxed_slice())
}

pub fn cell() -> &'static TrackCell<MockOutput> {
    Box::leak(Box::new(TrackCell::new()))
}

pub fn system(policy: TablePolicy) -> &'static AudioSystem<'static> {
    let policy: &'static TablePolicy = Box::leak(Box::new(policy));
    Box::leak(Box::new(AudioSystem::new(policy)))
}

pub fn policy(mode: AudioMode) -> TablePolicy {
    TablePolicy {
        mode,
        ..TablePolicy::default()
    }
}

pub fn reload_policy(mode: AudioMode) -> TablePolicy {
    TablePolicy {
        mode,
        routing: OutputRouting {
            channel_type: 0,
            channel_id: 0,
            reload: true,
        },
        ..TablePolicy::default()
    }
}

pub fn params() -> TrackParams {
    TrackParams::new(StreamType::Music, SampleRateHz::HZ_48000)
}

pub fn nonblocking() -> TrackParams {
    TrackParams {
        open_mode: OpenMode::NonBlocking,
        ..params()
    }
}

/// Ring-backed track over a caller buffer of `capacity` bytes.
pub fn ring_track(
    policy: TablePolicy,
    params: TrackParams,
    capacity: usize,
) -> (Track, &'static TrackCell<MockOutput>, OutputProbe) {
    let cell = cell();
    let (out, probe) = MockOutput::new(1 << 16);
    let track = AudioTrack::create(system(policy), cell, params, out, Some(region(capacity))).unwrap();
    (track, cell, probe)
}

pub fn pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Non-zero, non-repeating test signal.
pub fn ramp(n: usize) -> Vec<i16> {
    (0..n).map(|i| ((i % 2000) as i16 + 1) * 8).collect()
}

/// In-memory overlay source.
pub struct Clip {
    samples: Vec<i16>,
    pos: usize,
}

impl Clip {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples, pos: 0 }
    }

    pub fn leak(samples: Vec<i16>) -> &'static mut Self {
        Box::leak(Box::new(Self::new(samples)))
    }
}

impl MixSource for Clip {
    fn read(&mut self, out: &mut [i16]) -> usize {
        let n = out.len().min(self.samples.len() - self.pos);
        out[..n].copy_from_slice(&self.samples[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    fn is_finished(&self) -> bool {
        self.pos >= self.samples.len()
    }
}

/// Delay that stands in for time passing: every sleep plays the FIFO dry
/// and fires one refill interrupt, alternating the reload halves.
pub struct PumpDelay {
    cell: &'static TrackCell<MockOutput>,
    probe: Option<OutputProbe>,
    pump: bool,
    next: RefillReason,
    pub sleeps: u32,
}

impl PumpDelay {
    pub fn new(cell: &'static TrackCell<MockOutput>) -> Self {
        Self {
            cell,
            probe: None,
            pump: true,
            next: RefillReason::HalfConsumed,
            sleeps: 0,
        }
    }

    /// Also drain the mock FIFO on every sleep.
    pub fn draining(mut self, probe: OutputProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Time passes but the hardware is wedged.
    pub fn stalled(cell: &'static TrackCell<MockOutput>) -> Self {
        Self {
            pump: false,
            ..Self::new(cell)
        }
    }

    fn tick(&mut self) {
        self.sleeps += 1;
        if !self.pump {
            return;
        }
        if let Some(probe) = &self.probe {
            probe.drain(usize::MAX);
        }
        self.cell.on_refill(self.next);
        self.next = match self.next {
            RefillReason::HalfConsumed => RefillReason::FullConsumed,
            RefillReason::FullConsumed => RefillReason::HalfConsumed,
        };
    }
}

impl DelayNs for PumpDelay {
    async fn delay_ns(&mut self, _ns: u32) {
        self.tick();
    }

    async fn delay_us(&mut self, _us: u32) {
        self.tick();
    }

    async fn delay_ms(&mut self, _ms: u32) {
        self.tick();
    }
}

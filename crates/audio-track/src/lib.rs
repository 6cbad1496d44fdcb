//! Audio track engine: PCM buffering between a producer and a DMA-driven DAC
//!
//! A producer (A2DP/HFP decoder, tone generator) pushes raw PCM into an
//! [`AudioTrack`]; the board's DMA interrupt pulls it back out through the
//! track's [`TrackCell`]. In between the track applies fades, overlays a
//! secondary stream, and inserts or drops frames to keep two TWS earbuds in
//! lock-step.
//!
//! # Backends
//!
//! - [`BackendKind::Ring`]: software ring over pool or caller memory, copied
//!   out by the refill interrupt (single-shot or reload DMA).
//! - [`BackendKind::ZeroCopy`]: writes go straight to the DMA FIFO and the
//!   occupancy is read back from the hardware.
//!
//! # Features
//!
//! - `defmt`: log through defmt (hardware builds)
//! - `tracing`: log through tracing (host builds)
//! - `std`: enables `platform/std`
//!
//! # Example
//!
//! ```no_run
//! use audio_track::{AudioSystem, AudioTrack, TrackCell, TrackParams};
//! use platform::mocks::MockOutput;
//! use platform::{RefillReason, SampleRateHz, StreamType, TablePolicy};
//!
//! static CELL: TrackCell<MockOutput> = TrackCell::new();
//!
//! let policy = TablePolicy::default();
//! let system = AudioSystem::new(&policy);
//! let buffer = Box::leak(vec![0u8; 8192].into_boxed_slice());
//! let (output, _probe) = MockOutput::new(4096);
//! let params = TrackParams::new(StreamType::Music, SampleRateHz::HZ_48000);
//! let mut track = AudioTrack::create(&system, &CELL, params, output, Some(buffer))?;
//! track.try_write(&[0u8; 4096]);
//! CELL.on_refill(RefillReason::FullConsumed); // from the DMA interrupt
//! # Ok::<(), audio_track::TrackError>(())
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

// Must come first: the logging macros are textually scoped.
#[macro_use]
mod fmt;

mod sample;

pub mod dma_ring;
pub mod fader;
pub mod mixer;
pub mod pcm_buffer;
pub mod refill;
pub mod registry;
pub mod resampler;
pub mod ring_buffer;
pub mod state;
pub mod track;
pub mod volume;

pub use fader::FadeMode;
pub use mixer::{MixError, MixSource};
pub use pcm_buffer::BackendKind;
pub use refill::{DeliveryMode, TrackCell};
pub use registry::{AudioSystem, TrackId, TrackRegistry};
pub use state::TrackState;
pub use track::{AudioTrack, FlushOutcome, OpenMode, PresentationTime, TrackError, TrackEvent, TrackParams};

//! Hardware Abstraction Layer (HAL) for the audio output path
//!
//! This crate provides the trait-based seams the audio-track engine talks
//! through, so the engine can be developed and tested without a DAC.
//!
//! # Architecture Layers
//!
//! ```text
//! Stream sources (A2DP, HFP, tones, local decode)
//!         ↓
//! audio-track (PCM buffering, fades, mixing, DMA refill)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Vendor DAC / I2S driver
//! ```
//!
//! # Seams
//!
//! - [`AudioOutput`] - DAC/I2S channel with DMA refill
//! - [`AudioPolicy`] - routing, buffer sizing and volume tables
//! - [`TwsObserver`] - true-wireless-stereo clock source
//! - [`PcmPool`] - static per-stream PCM memory partitions
//!
//! # Features
//!
//! - `std`: Enable standard library support and the [`mocks`] module
//! - `defmt`: Enable defmt logging
//!
//! # Example
//!
//! ```no_run
//! use platform::{AudioPolicy, StreamType, TablePolicy};
//!
//! let policy = TablePolicy::default();
//! let mdb = policy.pa_volume_mdb(StreamType::Music, policy.stream_volume(StreamType::Music));
//! assert!(mdb <= 0);
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this audio HAL crate:
#![allow(clippy::doc_markdown)] // register and codec names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors, callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod audio;
pub mod audio_types;
pub mod memory;
pub mod mocks;
pub mod policy;
pub mod tws;

// Re-export the output seam
pub use audio::{AudioOutput, Half, OutputError, OutputParams, RefillReason};

// Re-export domain newtypes
pub use audio_types::{AudioFormat, AudioMode, OutOfRangeError, SampleRateHz, StreamType, VolumeLevel};

// Re-export policy and services
pub use memory::PcmPool;
pub use policy::{AudioPolicy, OutputRouting, TablePolicy, DEFAULT_MUTE_FLOOR_MDB};
pub use tws::TwsObserver;

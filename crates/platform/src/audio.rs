//! Audio output abstraction
//!
//! [`AudioOutput`] is the boundary between the audio-track engine and the
//! vendor DAC/I2S driver. Every method is synchronous: the refill path runs at
//! interrupt priority and cannot await.
//!
//! # Delivery modes
//!
//! ```text
//! single-shot:  refill(FullConsumed) -> write_data(frame)
//! reload:       DMA cycles [ First | Second ] in place
//!               refill(HalfConsumed) -> refill First  -> commit_reload(First)
//!               refill(FullConsumed) -> refill Second -> commit_reload(Second)
//! zero-copy:    write_data() feeds the DMA FIFO directly;
//!               buffer_space()/buffer_size() report FIFO occupancy
//! ```

use crate::audio_types::{AudioFormat, SampleRateHz};

/// Why the hardware fired the refill callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RefillReason {
    /// The first half of the reload region has been consumed.
    HalfConsumed,
    /// The whole region (or the single-shot frame) has been consumed.
    FullConsumed,
}

/// One half of the in-place reload region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Half {
    /// Bytes `0..len/2`.
    First,
    /// Bytes `len/2..len`.
    Second,
}

impl Half {
    /// The half the hardware has just finished with for a given callback reason.
    pub fn consumed_by(reason: RefillReason) -> Self {
        match reason {
            RefillReason::HalfConsumed => Self::First,
            RefillReason::FullConsumed => Self::Second,
        }
    }
}

/// Errors reported by an [`AudioOutput`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputError {
    /// The channel could not be opened with the requested parameters.
    OpenFailed,
    /// An operation was issued before `open` or after `close`.
    NotOpen,
    /// The hardware does not support the requested mode.
    Unsupported,
}

impl core::fmt::Display for OutputError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OpenFailed => f.write_str("audio output open failed"),
            Self::NotOpen => f.write_str("audio output not open"),
            Self::Unsupported => f.write_str("unsupported audio output mode"),
        }
    }
}

/// Parameters for [`AudioOutput::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputParams {
    /// Output sample rate.
    pub sample_rate: SampleRateHz,
    /// Interleaved channel count (1 or 2).
    pub channels: u8,
    /// Sample width on the wire.
    pub format: AudioFormat,
    /// Vendor channel type (DAC, I2S, ...), opaque to the engine.
    pub channel_type: u8,
    /// Vendor FIFO id, opaque to the engine.
    pub channel_id: u8,
    /// `Some(len)` selects reload mode with a `len`-byte region split in two halves.
    pub reload_len: Option<usize>,
    /// Initial PA gain in milli-dB.
    pub initial_pa_mdb: i32,
    /// Force the hardware automute circuit on.
    pub automute_force: bool,
}

/// Hardware output channel.
///
/// `close` must disable the refill interrupt before it returns: once it has
/// returned no further refill callback may reference the channel.
pub trait AudioOutput {
    /// Open the channel and arm the refill interrupt.
    fn open(&mut self, params: &OutputParams) -> Result<(), OutputError>;

    /// Synchronously disable the interrupt and release the channel.
    fn close(&mut self);

    /// Start the DMA engine.
    fn start(&mut self);

    /// Stop the DMA engine.
    fn stop(&mut self);

    /// Queue PCM bytes for output. Returns how many bytes were accepted.
    fn write_data(&mut self, data: &[u8]) -> usize;

    /// A reload half has been refilled in place and is ready for DMA.
    ///
    /// Cache-maintained targets clean `data` here; others may ignore it.
    fn commit_reload(&mut self, half: Half, data: &[u8]);

    /// Program the half-empty / half-full FIFO thresholds (in samples).
    fn set_threshold(&mut self, half_empty: u32, half_full: u32);

    /// Free FIFO space, in samples across all channels.
    fn buffer_space(&self) -> usize;

    /// Total FIFO size, in samples across all channels.
    fn buffer_size(&self) -> usize;

    /// Hardware mute.
    fn mute_ctl(&mut self, mute: bool);

    /// PA gain in milli-dB.
    fn set_pa_vol_level(&mut self, milli_db: i32);

    /// Enable or disable the left / right output channels.
    fn lr_channel_enable(&mut self, left: bool, right: bool);

    /// Samples played since open, across all channels.
    fn sample_count(&self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_follows_refill_reason() {
        assert_eq!(Half::consumed_by(RefillReason::HalfConsumed), Half::First);
        assert_eq!(Half::consumed_by(RefillReason::FullConsumed), Half::Second);
    }

    #[test]
    fn output_error_display_is_not_empty() {
        let s = format!("{}", OutputError::OpenFailed);
        assert!(!s.is_empty());
    }
}

//! Secondary-stream overlay mixing.
//!
//! A [`MixSession`] pulls 16-bit PCM from a [`MixSource`] (a prompt tone, a
//! TTS clip), converts it to the track's rate when the rates differ, and adds
//! it onto the primary data before it is committed to the PCM buffer:
//!
//! ```text
//! pcm16:  out = primary / 2 + secondary / 2
//! pcm32:  out = primary / 2 + ((secondary / 2) << 16)
//! ```
//!
//! A mono source is duplicated across a stereo track; a stereo source mixed
//! into a mono track is averaged. Resampled output that the current write did
//! not need is kept for the next one.

use platform::{AudioFormat, SampleRateHz, StreamType};

use crate::resampler::{LinearResampler, MAX_RATIO};
use crate::sample::{frame_size, read_i16, read_i32, whole_frames, write_i16, write_i32};

/// Output frames produced per resampler pass.
pub const MIX_CHUNK_FRAMES: usize = 16;

#[allow(clippy::arithmetic_side_effects)] // Safety: compile-time constants
const INPUT_SAMPLES: usize = 2 * (MIX_CHUNK_FRAMES * MAX_RATIO as usize + 2);
#[allow(clippy::arithmetic_side_effects)] // Safety: compile-time constant
const PENDING_SAMPLES: usize = 2 * MIX_CHUNK_FRAMES;

/// Producer of the overlay stream.
pub trait MixSource {
    /// Fill `out` with interleaved 16-bit samples and return how many were
    /// written. Only whole frames are used; a trailing partial frame is
    /// dropped. Returning 0 means nothing is available right now.
    fn read(&mut self, out: &mut [i16]) -> usize;

    /// `true` once the source will never produce more data.
    fn is_finished(&self) -> bool;
}

/// Why a mix stream could not be attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MixError {
    /// The rate ratio needs more input per chunk than the scratch holds.
    ScratchTooSmall,
    /// Only mono and stereo sources are supported.
    UnsupportedChannels,
}

impl core::fmt::Display for MixError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ScratchTooSmall => f.write_str("mix resample scratch too small"),
            Self::UnsupportedChannels => f.write_str("unsupported mix channel count"),
        }
    }
}

/// An attached overlay stream.
pub struct MixSession<'a> {
    source: &'a mut dyn MixSource,
    rate: SampleRateHz,
    channels: u8,
    tag: StreamType,
    resampler: Option<LinearResampler>,
    input: [i16; INPUT_SAMPLES],
    in_pos: usize,
    in_len: usize,
    pending: [i16; PENDING_SAMPLES],
    pend_pos: usize,
    pend_len: usize,
    tail_fed: bool,
}

impl<'a> MixSession<'a> {
    /// Build a session mixing `source` (at `rate`, `channels`) into a track
    /// running at `track_rate`.
    pub fn new(
        source: &'a mut dyn MixSource,
        rate: SampleRateHz,
        channels: u8,
        tag: StreamType,
        track_rate: SampleRateHz,
    ) -> Result<Self, MixError> {
        if !(1..=2).contains(&channels) {
            return Err(MixError::UnsupportedChannels);
        }
        let resampler = if rate == track_rate {
            None
        } else {
            Some(LinearResampler::new(rate, track_rate, channels).ok_or(MixError::ScratchTooSmall)?)
        };
        Ok(Self {
            source,
            rate,
            channels,
            tag,
            resampler,
            input: [0; INPUT_SAMPLES],
            in_pos: 0,
            in_len: 0,
            pending: [0; PENDING_SAMPLES],
            pend_pos: 0,
            pend_len: 0,
            tail_fed: false,
        })
    }

    /// Source sample rate.
    pub fn rate(&self) -> SampleRateHz {
        self.rate
    }

    /// Source channel count.
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Stream type the overlay was attached as.
    pub fn tag(&self) -> StreamType {
        self.tag
    }

    /// `true` when the source converts through the resampler.
    pub fn is_resampling(&self) -> bool {
        self.resampler.is_some()
    }

    /// Converted frames waiting for the next write.
    #[allow(clippy::arithmetic_side_effects)] // Safety: pend_pos ≤ pend_len; channels ≥ 1
    pub fn remainder_frames(&self) -> usize {
        (self.pend_len - self.pend_pos) / usize::from(self.channels)
    }

    /// The source has ended and nothing converted is left.
    pub fn is_exhausted(&self) -> bool {
        self.pend_pos >= self.pend_len
            && self.in_pos >= self.in_len
            && self.source.is_finished()
            && (self.resampler.is_none() || self.tail_fed)
    }

    /// Mix into `pcm` (interleaved, `format`, `channels`) in place.
    ///
    /// Returns the number of frames that received overlay data. Frames past
    /// the point where the source ran dry pass through untouched.
    #[allow(clippy::arithmetic_side_effects)] // Safety: mixed counts frames of a bounded slice
    pub fn mix_into(&mut self, pcm: &mut [u8], format: AudioFormat, channels: u8) -> usize {
        let fs = frame_size(format, channels);
        if fs == 0 {
            return 0;
        }
        let bps = format.bytes_per_sample();
        let mut mixed = 0;
        for frame in pcm.chunks_exact_mut(fs) {
            let Some([left, right]) = self.next_frame() else {
                break;
            };
            if channels == 1 {
                let s = if self.channels == 2 { average(left, right) } else { left };
                mix_sample(frame, format, s);
            } else {
                let mut samples = frame.chunks_exact_mut(bps);
                if let Some(l) = samples.next() {
                    mix_sample(l, format, left);
                }
                if let Some(r) = samples.next() {
                    mix_sample(r, format, right);
                }
            }
            mixed += 1;
        }
        mixed
    }

    /// Next source frame as `[left, right]` (mono is duplicated).
    #[allow(clippy::arithmetic_side_effects)] // Safety: pend_pos + channels ≤ pend_len checked by get()
    fn next_frame(&mut self) -> Option<[i16; 2]> {
        if self.pend_pos >= self.pend_len && !self.refill() {
            return None;
        }
        let ch = usize::from(self.channels);
        let frame = self.pending.get(self.pend_pos..self.pend_pos + ch)?;
        let out = match frame {
            [l, r] => [*l, *r],
            [m] => [*m, *m],
            _ => return None,
        };
        self.pend_pos += ch;
        Some(out)
    }

    /// Produce the next batch of converted frames into `pending`.
    #[allow(clippy::arithmetic_side_effects)] // Safety: positions advance by amounts bounded by the buffers
    fn refill(&mut self) -> bool {
        let ch = usize::from(self.channels);
        self.pend_pos = 0;
        self.pend_len = 0;

        let Some(resampler) = self.resampler.as_mut() else {
            let want = whole_frames(PENDING_SAMPLES, ch);
            let Some(dst) = self.pending.get_mut(..want) else {
                return false;
            };
            let n = whole_frames(self.source.read(dst).min(want), ch);
            self.pend_len = n;
            return n > 0;
        };

        loop {
            if self.in_pos >= self.in_len {
                let want = whole_frames(INPUT_SAMPLES, ch);
                let Some(dst) = self.input.get_mut(..want) else {
                    return false;
                };
                let mut n = whole_frames(self.source.read(dst).min(want), ch);
                if n == 0 {
                    // The last source frame still owes its interpolation
                    // span; play it out by holding that frame once more.
                    if self.tail_fed || !self.source.is_finished() {
                        return false;
                    }
                    self.tail_fed = true;
                    let last = resampler.last_frame();
                    for (slot, &s) in dst.iter_mut().zip(last.iter()).take(ch) {
                        *slot = s;
                    }
                    n = ch;
                }
                self.in_pos = 0;
                self.in_len = n;
            }
            let input = self.input.get(self.in_pos..self.in_len).unwrap_or(&[]);
            let (used, made) = resampler.process(input, &mut self.pending);
            self.in_pos += used * ch;
            self.pend_len = made * ch;
            if made > 0 {
                return true;
            }
        }
    }
}

#[allow(clippy::arithmetic_side_effects)] // Safety: sum of two i16 fits i32
#[allow(clippy::cast_possible_truncation)] // Safety: mean of two i16 is an i16
fn average(a: i16, b: i16) -> i16 {
    ((i32::from(a) + i32::from(b)) / 2) as i16
}

#[allow(clippy::arithmetic_side_effects)] // Safety: halves of two samples cannot overflow the sample width
fn mix_sample(sample: &mut [u8], format: AudioFormat, secondary: i16) {
    match format {
        AudioFormat::Pcm16 => {
            let p = read_i16(sample);
            write_i16(sample, p / 2 + secondary / 2);
        }
        AudioFormat::Pcm32 => {
            let p = read_i32(sample);
            write_i32(sample, (p / 2).wrapping_add(i32::from(secondary / 2) << 16));
        }
    }
}

//! Linear fade in / fade out.
//!
//! Gains are Q15 fixed point and advance once per frame, so every channel of
//! a frame gets the same gain. A completed fade-in returns to
//! [`FadeMode::None`]; a completed fade-out holds silence until the next
//! fade-in.

use platform::{AudioFormat, SampleRateHz};

use crate::sample::{frame_size, read_i16, read_i32, write_i16, write_i32};

const UNITY: i64 = 1 << 15;

/// Active fade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FadeMode {
    /// Unity gain.
    #[default]
    None,
    /// Ramping up from silence.
    In,
    /// Ramping down to silence.
    Out,
}

/// Per-track fade state.
#[derive(Debug, Clone)]
pub struct Fader {
    mode: FadeMode,
    total_frames: u32,
    remaining_frames: u32,
    format: AudioFormat,
    channels: u8,
}

impl Fader {
    /// A fader at unity gain.
    pub const fn new(format: AudioFormat, channels: u8) -> Self {
        Self {
            mode: FadeMode::None,
            total_frames: 0,
            remaining_frames: 0,
            format,
            channels,
        }
    }

    /// Current direction.
    pub fn mode(&self) -> FadeMode {
        self.mode
    }

    /// Frames left in the current ramp.
    pub fn remaining_frames(&self) -> u32 {
        self.remaining_frames
    }

    /// Start a fade-in over `ms`. Returns `false` if already fading in.
    pub fn fade_in(&mut self, ms: u32, rate: SampleRateHz) -> bool {
        self.begin(FadeMode::In, ms, rate)
    }

    /// Start a fade-out over `ms`. Returns `false` if already fading out.
    pub fn fade_out(&mut self, ms: u32, rate: SampleRateHz) -> bool {
        self.begin(FadeMode::Out, ms, rate)
    }

    /// Apply the ramp to interleaved PCM in place.
    ///
    /// Trailing bytes that do not make up a whole frame are left untouched.
    pub fn apply(&mut self, pcm: &mut [u8]) {
        if self.mode == FadeMode::None {
            return;
        }
        let fs = frame_size(self.format, self.channels);
        if fs == 0 {
            return;
        }
        let bps = self.format.bytes_per_sample();
        for frame in pcm.chunks_exact_mut(fs) {
            let gain = self.gain();
            for sample in frame.chunks_exact_mut(bps) {
                scale(sample, self.format, gain);
            }
            self.advance();
        }
    }

    #[allow(clippy::arithmetic_side_effects)] // Safety: ms ≤ u32::MAX and rate ≤ 96 kHz fit in u64
    fn begin(&mut self, mode: FadeMode, ms: u32, rate: SampleRateHz) -> bool {
        if self.mode == mode {
            return false;
        }
        let frames = u64::from(ms) * u64::from(rate.get()) / 1000;
        let frames = u32::try_from(frames).unwrap_or(u32::MAX);
        self.mode = if mode == FadeMode::In && frames == 0 {
            FadeMode::None
        } else {
            mode
        };
        self.total_frames = frames;
        self.remaining_frames = frames;
        true
    }

    #[allow(clippy::arithmetic_side_effects)] // Safety: remaining ≤ total; products < 2^48
    fn gain(&self) -> i64 {
        let total = i64::from(self.total_frames);
        let remaining = i64::from(self.remaining_frames);
        match self.mode {
            FadeMode::None => UNITY,
            FadeMode::In if total == 0 => UNITY,
            FadeMode::In => UNITY - remaining * UNITY / total,
            FadeMode::Out if total == 0 => 0,
            FadeMode::Out => remaining * UNITY / total,
        }
    }

    fn advance(&mut self) {
        self.remaining_frames = self.remaining_frames.saturating_sub(1);
        if self.remaining_frames == 0 && self.mode == FadeMode::In {
            self.mode = FadeMode::None;
            self.total_frames = 0;
        }
    }
}

#[allow(clippy::arithmetic_side_effects)] // Safety: |sample| · gain < 2^31 · 2^15, fits i64
#[allow(clippy::cast_possible_truncation)] // Safety: gain ≤ UNITY so the result fits the sample width
fn scale(sample: &mut [u8], format: AudioFormat, gain: i64) {
    match format {
        AudioFormat::Pcm16 => {
            let v = i64::from(read_i16(sample));
            write_i16(sample, ((v * gain) >> 15) as i16);
        }
        AudioFormat::Pcm32 => {
            let v = i64::from(read_i32(sample));
            write_i32(sample, ((v * gain) >> 15) as i32);
        }
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pcm16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn samples16(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    fn rate_1k() -> SampleRateHz {
        SampleRateHz::new(8_000).unwrap()
    }

    #[test]
    fn fade_in_ramps_up_then_ends() {
        let mut f = Fader::new(AudioFormat::Pcm16, 1);
        // 1 ms at 8 kHz = 8 frames
        assert!(f.fade_in(1, rate_1k()));
        let mut buf = pcm16(&[1000; 10]);
        f.apply(&mut buf);
        let out = samples16(&buf);
        assert_eq!(out[0], 0);
        assert!(out.windows(2).take(8).all(|w| w[0] <= w[1]));
        assert_eq!(out[8], 1000);
        assert_eq!(f.mode(), FadeMode::None);
    }

    #[test]
    fn fade_out_reaches_and_holds_silence() {
        let mut f = Fader::new(AudioFormat::Pcm16, 2);
        assert!(f.fade_out(1, rate_1k()));
        let mut buf = pcm16(&[2000; 24]);
        f.apply(&mut buf);
        let out = samples16(&buf);
        assert_eq!(out[0], 2000);
        assert_eq!(out[1], 2000, "both channels of a frame share a gain");
        assert!(out[16..].iter().all(|&s| s == 0));
        assert_eq!(f.mode(), FadeMode::Out);
        assert_eq!(f.remaining_frames(), 0);
    }

    #[test]
    fn repeated_request_is_ignored() {
        let mut f = Fader::new(AudioFormat::Pcm16, 2);
        assert!(f.fade_out(10, rate_1k()));
        assert!(!f.fade_out(10, rate_1k()));
        assert!(f.fade_in(10, rate_1k()));
        assert!(!f.fade_in(5, rate_1k()));
    }

    #[test]
    fn zero_length_fade_in_is_unity() {
        let mut f = Fader::new(AudioFormat::Pcm32, 1);
        f.fade_out(0, rate_1k());
        f.fade_in(0, rate_1k());
        assert_eq!(f.mode(), FadeMode::None);
        let mut buf = 123_456i32.to_le_bytes().to_vec();
        f.apply(&mut buf);
        assert_eq!(i32::from_le_bytes(buf.try_into().unwrap()), 123_456);
    }
}

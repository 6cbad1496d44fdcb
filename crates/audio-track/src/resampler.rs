//! Streaming linear-interpolation resampler for the mix path.
//!
//! Interleaved `i16` in, interleaved `i16` out, 16.16 fixed-point phase.
//! State (the two frames bracketing the current phase) carries across calls,
//! so input can be fed in arbitrary chunks without clicks at the seams.

use platform::SampleRateHz;

const ONE: u32 = 1 << 16;

/// Largest supported input/output rate ratio.
pub const MAX_RATIO: u32 = 6;

/// Linear resampler state.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    step: u32,
    phase: u32,
    prev: [i16; 2],
    cur: [i16; 2],
    channels: usize,
}

impl LinearResampler {
    /// Convert `from` → `to` for `channels` (1 or 2) interleaved channels.
    ///
    /// Returns `None` when `from / to` exceeds [`MAX_RATIO`].
    #[allow(clippy::arithmetic_side_effects)] // Safety: rates ≤ 96 kHz; ≪ 2^32 after the shift
    #[allow(clippy::cast_possible_truncation)] // Safety: step ≤ MAX_RATIO · ONE
    pub fn new(from: SampleRateHz, to: SampleRateHz, channels: u8) -> Option<Self> {
        if from.get() > to.get().saturating_mul(MAX_RATIO) {
            return None;
        }
        let step = (u64::from(from.get()) << 16) / u64::from(to.get());
        Some(Self {
            step: step as u32,
            // Two frames must load before the first output.
            phase: 2 * ONE,
            prev: [0; 2],
            cur: [0; 2],
            channels: usize::from(channels.clamp(1, 2)),
        })
    }

    /// The most recently loaded input frame (`[left, right]`, mono in
    /// `left`).
    pub fn last_frame(&self) -> [i16; 2] {
        self.cur
    }

    /// Resample as much as possible.
    ///
    /// Returns `(input_frames_consumed, output_frames_produced)`. Stops when
    /// either the input runs out or `output` is full.
    #[allow(clippy::arithmetic_side_effects)] // Safety: phase < ONE + step ≤ 7 · ONE; interpolation in i32 on i16 inputs
    #[allow(clippy::cast_possible_truncation)] // Safety: interpolated value lies between two i16 samples
    #[allow(clippy::cast_possible_wrap)] // Safety: phase & 0xFFFF < 2^16
    pub fn process(&mut self, input: &[i16], output: &mut [i16]) -> (usize, usize) {
        let ch = self.channels;
        let mut frames_in = input.chunks_exact(ch);
        let mut frames_out = output.chunks_exact_mut(ch);
        let mut consumed = 0;
        let mut produced = 0;

        loop {
            while self.phase >= ONE {
                let Some(frame) = frames_in.next() else {
                    return (consumed, produced);
                };
                self.prev = self.cur;
                for (slot, &s) in self.cur.iter_mut().zip(frame) {
                    *slot = s;
                }
                consumed += 1;
                self.phase -= ONE;
            }
            let Some(out) = frames_out.next() else {
                return (consumed, produced);
            };
            let frac = (self.phase & (ONE - 1)) as i32;
            for ((dst, &a), &b) in out.iter_mut().zip(&self.prev).zip(&self.cur) {
                let a = i32::from(a);
                let b = i32::from(b);
                *dst = (a + (((b - a) * frac) >> 16)) as i16;
            }
            produced += 1;
            self.phase += self.step;
        }
    }
}

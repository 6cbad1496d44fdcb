//! Little-endian PCM sample access over raw byte buffers.

use platform::AudioFormat;

/// Read one 16-bit sample from the front of `b` (0 if too short).
pub(crate) fn read_i16(b: &[u8]) -> i16 {
    match b {
        [lo, hi, ..] => i16::from_le_bytes([*lo, *hi]),
        _ => 0,
    }
}

/// Read one 32-bit sample from the front of `b` (0 if too short).
pub(crate) fn read_i32(b: &[u8]) -> i32 {
    match b {
        [b0, b1, b2, b3, ..] => i32::from_le_bytes([*b0, *b1, *b2, *b3]),
        _ => 0,
    }
}

/// Store `v` into the front of `b`; short buffers are left untouched.
pub(crate) fn write_i16(b: &mut [u8], v: i16) {
    if let Some(dst) = b.get_mut(..2) {
        dst.copy_from_slice(&v.to_le_bytes());
    }
}

/// Store `v` into the front of `b`; short buffers are left untouched.
pub(crate) fn write_i32(b: &mut [u8], v: i32) {
    if let Some(dst) = b.get_mut(..4) {
        dst.copy_from_slice(&v.to_le_bytes());
    }
}

/// Bytes per frame (one sample per channel).
#[allow(clippy::arithmetic_side_effects)] // Safety: channels ≤ 2, bytes_per_sample ≤ 4
pub(crate) fn frame_size(format: AudioFormat, channels: u8) -> usize {
    usize::from(channels) * format.bytes_per_sample()
}

/// Round `len` down to a whole number of frames.
pub(crate) fn whole_frames(len: usize, frame_size: usize) -> usize {
    match len.checked_rem(frame_size) {
        Some(rem) => len.saturating_sub(rem),
        None => 0,
    }
}

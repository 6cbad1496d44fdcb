//! TWS timing observer
//!
//! Two earbuds play the same stream on independent crystals. The
//! synchronisation layer compares the local play clock with the peer's
//! Bluetooth clock and steers the audio track through
//! `compensate_samples`. This trait is the read side of that loop.

/// Clock source for synchronised (TWS) playback.
pub trait TwsObserver {
    /// Local playback clock in microseconds.
    fn play_time_us(&self) -> u64;

    /// Shared (peer / piconet) clock in microseconds.
    fn peer_clock_us(&self) -> u64;
}

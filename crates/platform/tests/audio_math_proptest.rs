//! Property-based tests for audio domain math.
//! Verifies invariants hold for ALL valid inputs, not just fixed examples.

use platform::audio_types::{SampleRateHz, StreamType, VolumeLevel};
use platform::policy::{AudioPolicy, TablePolicy};

proptest::proptest! {
    /// VolumeLevel::new never panics for any u8 input (clamps to MAX).
    #[test]
    fn volume_level_new_never_panics(level in 0u8..=255u8) {
        let v = VolumeLevel::new(level);
        assert!(v.get() <= VolumeLevel::MAX);
    }

    /// Higher level → higher or equal PA gain (monotone table).
    #[test]
    fn pa_gain_is_monotone_in_level(a in 0u8..=31u8, b in 0u8..=31u8) {
        let p = TablePolicy::default();
        let ga = p.pa_volume_mdb(StreamType::Music, VolumeLevel::new(a));
        let gb = p.pa_volume_mdb(StreamType::Music, VolumeLevel::new(b));
        if a > b {
            assert!(ga >= gb, "level {} → {} mdB should be >= level {} → {} mdB", a, ga, b, gb);
        } else if a < b {
            assert!(ga <= gb, "level {} → {} mdB should be <= level {} → {} mdB", a, ga, b, gb);
        }
    }

    /// Reverse lookup never panics and stays in range for any dB value.
    #[test]
    fn level_by_db_never_panics(db in i32::MIN..=i32::MAX) {
        let p = TablePolicy::default();
        let level = p.volume_level_by_db(StreamType::Voice, db);
        assert!(level.get() <= VolumeLevel::MAX);
    }

    /// SampleRateHz::new never panics for any u32 input.
    #[test]
    fn sample_rate_hz_new_never_panics(hz in 0u32..=u32::MAX) {
        // May return Err but must not panic
        let _ = SampleRateHz::new(hz);
    }

    /// SampleRateHz valid range [8000, 96000] always succeeds.
    #[test]
    fn sample_rate_hz_valid_range_always_ok(hz in 8000u32..=96_000u32) {
        assert!(SampleRateHz::new(hz).is_ok(),
            "SampleRateHz::new({}) should be Ok within [8000, 96000]", hz);
    }

    /// SampleRateHz out of range always fails.
    #[test]
    fn sample_rate_hz_out_of_range_always_err(hz in 96_001u32..=u32::MAX) {
        assert!(SampleRateHz::new(hz).is_err(),
            "SampleRateHz::new({}) should be Err above 96000", hz);
    }
}

//! Volume level → PA gain mapping.
//!
//! The policy table maps a user-facing [`VolumeLevel`] to a PA gain in
//! milli-dB. Gains at or below the policy's mute floor cannot be reached by
//! the amplifier, so the output is muted in hardware instead:
//!
//! | `pa_mdb`            | Hardware writes                 |
//! |---------------------|---------------------------------|
//! | `> floor`           | set PA gain, then unmute        |
//! | `<= floor`          | mute, then set PA gain (floor)  |
//!
//! Ordering matters: muting first (or unmuting last) keeps the gain step
//! from being audible.

use platform::{AudioOutput, AudioPolicy, StreamType, VolumeLevel};

/// A resolved PA setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PaGain {
    /// PA gain in milli-dB.
    pub milli_db: i32,
    /// The gain is at or below the mute floor.
    pub hw_mute: bool,
}

/// Map a [`VolumeLevel`] through the policy table.
///
/// # Arguments
///
/// * `policy` — the board's volume policy.
/// * `stream` — stream type whose table applies.
/// * `level` — a [`VolumeLevel`] in `0..=31` (enforced by the type).
pub fn level_to_gain(policy: &dyn AudioPolicy, stream: StreamType, level: VolumeLevel) -> PaGain {
    let milli_db = policy.pa_volume_mdb(stream, level);
    PaGain {
        milli_db,
        hw_mute: milli_db <= policy.mute_floor_mdb(),
    }
}

/// Write `gain` to the hardware in click-free order.
pub fn apply_gain<O: AudioOutput>(out: &mut O, gain: PaGain) {
    if gain.hw_mute {
        out.mute_ctl(true);
        out.set_pa_vol_level(gain.milli_db);
    } else {
        out.set_pa_vol_level(gain.milli_db);
        out.mute_ctl(false);
    }
}

/// Level that best matches a raw PA gain (whole-dB resolution).
#[allow(clippy::arithmetic_side_effects)] // Safety: division by a non-zero constant
pub fn gain_to_level(policy: &dyn AudioPolicy, stream: StreamType, milli_db: i32) -> VolumeLevel {
    policy.volume_level_by_db(stream, milli_db / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::mocks::MockOutput;
    use platform::{TablePolicy, DEFAULT_MUTE_FLOOR_MDB};

    #[test]
    fn test_level_zero_is_hardware_mute() {
        let p = TablePolicy::default();
        let g = level_to_gain(&p, StreamType::Music, VolumeLevel::new(0));
        assert!(g.hw_mute);
        assert_eq!(g.milli_db, DEFAULT_MUTE_FLOOR_MDB);
    }

    #[test]
    fn test_max_level_is_zero_db() {
        let p = TablePolicy::default();
        let g = level_to_gain(&p, StreamType::Music, VolumeLevel::new(VolumeLevel::MAX));
        assert_eq!(g, PaGain { milli_db: 0, hw_mute: false });
    }

    #[test]
    fn test_apply_mutes_or_unmutes() {
        let (mut out, probe) = MockOutput::new(0);
        apply_gain(&mut out, PaGain { milli_db: -80_000, hw_mute: true });
        assert!(probe.lock().muted);
        apply_gain(&mut out, PaGain { milli_db: -6_000, hw_mute: false });
        let s = probe.lock();
        assert!(!s.muted);
        assert_eq!(s.pa_mdb, Some(-6_000));
    }

    #[test]
    fn test_gain_round_trips_to_level() {
        let p = TablePolicy::default();
        let level = VolumeLevel::new(20);
        let g = level_to_gain(&p, StreamType::Voice, level);
        assert_eq!(gain_to_level(&p, StreamType::Voice, g.milli_db), level);
    }
}

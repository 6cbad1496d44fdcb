//! Audio policy service
//!
//! Per-stream routing, buffering and volume policy consumed by the audio
//! track. Boards normally back this with persisted configuration; the
//! [`TablePolicy`] here is a fixed-table implementation for simple boards and
//! host tests.

use crate::audio_types::{AudioMode, SampleRateHz, StreamType, VolumeLevel};

/// PA gain at or below which the output is muted in hardware instead.
pub const DEFAULT_MUTE_FLOOR_MDB: i32 = -71_625;

/// Where a stream is routed in hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputRouting {
    /// Vendor channel type (DAC, I2S, ...).
    pub channel_type: u8,
    /// Vendor FIFO id.
    pub channel_id: u8,
    /// Use DMA reload (in-place double buffering) instead of single-shot writes.
    pub reload: bool,
}

/// Policy / configuration service.
pub trait AudioPolicy {
    /// Hardware routing for `stream`.
    fn routing(&self, stream: StreamType) -> OutputRouting;

    /// Default channel layout for `stream` (never [`AudioMode::Default`]).
    fn audio_mode(&self, stream: StreamType) -> AudioMode;

    /// PCM buffer duration in milliseconds; 0 selects the engine default.
    fn pcm_buffer_time_ms(&self, stream: StreamType) -> u32;

    /// Map a volume level to a PA gain in milli-dB.
    fn pa_volume_mdb(&self, stream: StreamType, level: VolumeLevel) -> i32;

    /// Reverse lookup: the level whose gain is closest to `db` (whole dB).
    fn volume_level_by_db(&self, stream: StreamType, db: i32) -> VolumeLevel;

    /// Volume level a new stream starts at.
    fn stream_volume(&self, stream: StreamType) -> VolumeLevel;

    /// Force the hardware automute circuit for `stream`.
    fn automute_force(&self, stream: StreamType) -> bool;

    /// Left / right channel enable.
    fn lr_channel_enable(&self) -> (bool, bool);

    /// System-wide output rate override; `None` follows the stream.
    fn output_sample_rate(&self) -> Option<SampleRateHz>;

    /// Low-latency mode shrinks hardware frames.
    fn low_latency(&self) -> bool;

    /// PA gain at or below which hardware mute is used.
    fn mute_floor_mdb(&self) -> i32 {
        DEFAULT_MUTE_FLOOR_MDB
    }
}

/// Number of entries in a [`TablePolicy`] volume table.
pub const VOLUME_TABLE_LEN: usize = VolumeLevel::MAX as usize + 1;

/// Fixed-table policy.
#[derive(Debug, Clone)]
pub struct TablePolicy {
    /// Milli-dB per volume level, ascending.
    pub volume_table: [i32; VOLUME_TABLE_LEN],
    /// Routing applied to every stream.
    pub routing: OutputRouting,
    /// Layout applied to every stream.
    pub mode: AudioMode,
    /// PCM buffer duration (ms).
    pub buffer_time_ms: u32,
    /// Starting volume for every stream.
    pub initial_volume: VolumeLevel,
    /// Forced automute.
    pub automute_force: bool,
    /// Left / right enable.
    pub lr_enable: (bool, bool),
    /// Output rate override.
    pub output_rate: Option<SampleRateHz>,
    /// Low-latency frames.
    pub low_latency: bool,
}

impl TablePolicy {
    /// Level 0 maps to the mute floor, then 2 dB steps up to 0 dB at the top.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)] // Safety: i < 32
    #[allow(clippy::arithmetic_side_effects)] // Safety: bounded by VOLUME_TABLE_LEN
    pub fn default_table() -> [i32; VOLUME_TABLE_LEN] {
        let mut table = [0i32; VOLUME_TABLE_LEN];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = if i == 0 {
                DEFAULT_MUTE_FLOOR_MDB
            } else {
                -2_000 * (VOLUME_TABLE_LEN as i32 - 1 - i as i32)
            };
        }
        table
    }
}

impl Default for TablePolicy {
    fn default() -> Self {
        Self {
            volume_table: Self::default_table(),
            routing: OutputRouting {
                channel_type: 0,
                channel_id: 0,
                reload: false,
            },
            mode: AudioMode::Stereo,
            buffer_time_ms: 0,
            initial_volume: VolumeLevel::new(16),
            automute_force: false,
            lr_enable: (true, true),
            output_rate: None,
            low_latency: false,
        }
    }
}

impl AudioPolicy for TablePolicy {
    fn routing(&self, _stream: StreamType) -> OutputRouting {
        self.routing
    }

    fn audio_mode(&self, _stream: StreamType) -> AudioMode {
        match self.mode {
            AudioMode::Default => AudioMode::Stereo,
            mode => mode,
        }
    }

    fn pcm_buffer_time_ms(&self, _stream: StreamType) -> u32 {
        self.buffer_time_ms
    }

    fn pa_volume_mdb(&self, _stream: StreamType, level: VolumeLevel) -> i32 {
        self.volume_table
            .get(usize::from(level.get()))
            .copied()
            .unwrap_or(0)
    }

    #[allow(clippy::cast_possible_truncation)] // Safety: index < VOLUME_TABLE_LEN (32)
    #[allow(clippy::arithmetic_side_effects)] // Safety: db clamped well inside i32
    fn volume_level_by_db(&self, _stream: StreamType, db: i32) -> VolumeLevel {
        let target = db.clamp(-200, 20) * 1000;
        let best = self
            .volume_table
            .iter()
            .enumerate()
            .min_by_key(|(_, mdb)| (**mdb - target).unsigned_abs())
            .map_or(0, |(i, _)| i);
        VolumeLevel::new(best as u8)
    }

    fn stream_volume(&self, _stream: StreamType) -> VolumeLevel {
        self.initial_volume
    }

    fn automute_force(&self, _stream: StreamType) -> bool {
        self.automute_force
    }

    fn lr_channel_enable(&self) -> (bool, bool) {
        self.lr_enable
    }

    fn output_sample_rate(&self) -> Option<SampleRateHz> {
        self.output_rate
    }

    fn low_latency(&self) -> bool {
        self.low_latency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_is_ascending_and_tops_at_zero_db() {
        let t = TablePolicy::default_table();
        assert!(t.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(t[VOLUME_TABLE_LEN - 1], 0);
        assert_eq!(t[0], DEFAULT_MUTE_FLOOR_MDB);
    }

    #[test]
    fn level_to_db_round_trips_through_reverse_lookup() {
        let p = TablePolicy::default();
        for level in 1..=VolumeLevel::MAX {
            let mdb = p.pa_volume_mdb(StreamType::Music, VolumeLevel::new(level));
            let back = p.volume_level_by_db(StreamType::Music, mdb / 1000);
            assert_eq!(back.get(), level);
        }
    }

    #[test]
    fn default_mode_is_resolved() {
        let p = TablePolicy {
            mode: AudioMode::Default,
            ..TablePolicy::default()
        };
        assert_eq!(p.audio_mode(StreamType::Voice), AudioMode::Stereo);
    }
}

//! Audio domain newtypes for compile-time safety.
//!
//! These zero-cost abstractions prevent common errors:
//! - `SampleRateHz`: validates 8000–96000 Hz range
//! - `VolumeLevel`: clamps to the policy table range 0–31
//! - `StreamType`: keys per-stream policy and memory partitions
//! - `AudioFormat` / `AudioMode`: derive frame size without magic numbers

// ── Error type ───────────────────────────────────────────────────────────────

/// Error returned when a value is out of the valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutOfRangeError {
    /// The value that was out of range.
    pub value: u32,
    /// The inclusive minimum allowed value.
    pub min: u32,
    /// The inclusive maximum allowed value.
    pub max: u32,
}

// ── SampleRateHz ─────────────────────────────────────────────────────────────

/// Sample rate in Hz, validated to the range the output path supports.
///
/// Valid range: 8000–96000 Hz (narrowband voice to hi-res music).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct SampleRateHz(u32);

impl SampleRateHz {
    /// Minimum supported sample rate: 8000 Hz (narrowband voice).
    pub const MIN_HZ: u32 = 8_000;

    /// Maximum supported sample rate: 96000 Hz.
    pub const MAX_HZ: u32 = 96_000;

    /// 16 kHz wideband voice.
    pub const HZ_16000: Self = Self(16_000);

    /// 44.1 kHz.
    pub const HZ_44100: Self = Self(44_100);

    /// 48 kHz.
    pub const HZ_48000: Self = Self(48_000);

    /// Create a `SampleRateHz`, returning an error if out of 8000–96000 Hz.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if `hz < 8000` or `hz > 96000`.
    pub fn new(hz: u32) -> Result<Self, OutOfRangeError> {
        if !(Self::MIN_HZ..=Self::MAX_HZ).contains(&hz) {
            Err(OutOfRangeError {
                value: hz,
                min: Self::MIN_HZ,
                max: Self::MAX_HZ,
            })
        } else {
            Ok(Self(hz))
        }
    }

    /// Return the sample rate in Hz.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    /// Return the sample rate in whole kHz (44100 → 44).
    #[must_use]
    pub fn khz(self) -> u32 {
        self.0 / 1000
    }

    /// `true` for narrowband/wideband voice rates (≤ 16 kHz).
    #[must_use]
    pub fn is_voice_band(self) -> bool {
        self.0 <= 16_000
    }
}

// ── VolumeLevel ──────────────────────────────────────────────────────────────

/// User-facing volume step, clamped to `0..=VolumeLevel::MAX`.
///
/// The level is an index into the policy's milli-dB table; it carries no
/// gain meaning on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct VolumeLevel(u8);

impl VolumeLevel {
    /// Highest volume step.
    pub const MAX: u8 = 31;

    /// Create a `VolumeLevel`, clamping values above [`Self::MAX`].
    #[must_use]
    pub fn new(value: u8) -> Self {
        Self(value.min(Self::MAX))
    }

    /// Create a `VolumeLevel`, returning an error if `value > MAX`.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if `value > 31`.
    pub fn try_new(value: u8) -> Result<Self, OutOfRangeError> {
        if value > Self::MAX {
            Err(OutOfRangeError {
                value: u32::from(value),
                min: 0,
                max: u32::from(Self::MAX),
            })
        } else {
            Ok(Self(value))
        }
    }

    /// Return the raw level.
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

// ── StreamType ───────────────────────────────────────────────────────────────

/// Logical stream category.
///
/// Keys routing policy, volume tables and the static PCM memory partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamType {
    /// A2DP / LE-audio music.
    Music,
    /// HFP / LE-audio call audio.
    Voice,
    /// Short prompt tones.
    Tone,
    /// Text-to-speech prompts.
    Tts,
    /// Music decoded from local storage.
    LocalMusic,
    /// USB audio class playback.
    Usb,
}

impl StreamType {
    /// Number of stream types; sizes per-stream tables.
    pub const COUNT: usize = 6;

    /// All stream types, in table order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Music,
        Self::Voice,
        Self::Tone,
        Self::Tts,
        Self::LocalMusic,
        Self::Usb,
    ];

    /// Table index for this stream type.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Music => 0,
            Self::Voice => 1,
            Self::Tone => 2,
            Self::Tts => 3,
            Self::LocalMusic => 4,
            Self::Usb => 5,
        }
    }

    /// Short name for log lines.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Music => "music",
            Self::Voice => "voice",
            Self::Tone => "tone",
            Self::Tts => "tts",
            Self::LocalMusic => "local",
            Self::Usb => "usb",
        }
    }
}

// ── AudioFormat ──────────────────────────────────────────────────────────────

/// PCM sample encoding, little-endian, interleaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AudioFormat {
    /// Signed 16-bit.
    #[default]
    Pcm16,
    /// Signed 32-bit, audio left-justified in the upper bits.
    Pcm32,
}

impl AudioFormat {
    /// Bytes per single-channel sample.
    #[must_use]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Pcm16 => 2,
            Self::Pcm32 => 4,
        }
    }

    /// Sample width in bits.
    #[must_use]
    pub fn bits(self) -> u8 {
        match self {
            Self::Pcm16 => 16,
            Self::Pcm32 => 32,
        }
    }
}

// ── AudioMode ────────────────────────────────────────────────────────────────

/// Channel layout requested for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AudioMode {
    /// Ask the policy for the stream's default layout.
    #[default]
    Default,
    /// One channel.
    Mono,
    /// Two interleaved channels.
    Stereo,
}

impl AudioMode {
    /// Channel count, or `None` for [`AudioMode::Default`].
    #[must_use]
    pub fn channels(self) -> Option<u8> {
        match self {
            Self::Default => None,
            Self::Mono => Some(1),
            Self::Stereo => Some(2),
        }
    }
}

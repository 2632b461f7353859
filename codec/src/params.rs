//! Parameter domains and validation of raw host values.
//!
//! Host integers arrive as `i64` so that values outside the codec's 32-bit
//! range are rejected instead of being truncated into a valid-looking value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ffi;

/// Longest audio span a single Opus packet can carry, in milliseconds.
pub const MAX_PACKET_DURATION_MS: u32 = 120;

/// Sample rates supported by libopus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum SampleRate {
    Hz8000,
    Hz12000,
    Hz16000,
    Hz24000,
    Hz48000,
}

impl SampleRate {
    pub const ALL: [SampleRate; 5] = [
        Self::Hz8000,
        Self::Hz12000,
        Self::Hz16000,
        Self::Hz24000,
        Self::Hz48000,
    ];

    /// Returns the rate in Hz.
    pub fn hz(&self) -> u32 {
        match self {
            Self::Hz8000 => 8000,
            Self::Hz12000 => 12000,
            Self::Hz16000 => 16000,
            Self::Hz24000 => 24000,
            Self::Hz48000 => 48000,
        }
    }
}

impl TryFrom<i64> for SampleRate {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            8000 => Ok(Self::Hz8000),
            12000 => Ok(Self::Hz12000),
            16000 => Ok(Self::Hz16000),
            24000 => Ok(Self::Hz24000),
            48000 => Ok(Self::Hz48000),
            _ => Err(Error::invalid_argument(
                "sample_rate",
                format!("{value} is not one of 8000, 12000, 16000, 24000, or 48000"),
            )),
        }
    }
}

impl From<SampleRate> for i64 {
    fn from(rate: SampleRate) -> Self {
        rate.hz() as i64
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.hz())
    }
}

/// Channel layouts supported by a single Opus stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Channels {
    Mono,
    Stereo,
}

impl Channels {
    /// Returns the number of interleaved channels.
    pub fn count(&self) -> u8 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }
}

impl TryFrom<i64> for Channels {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            1 => Ok(Self::Mono),
            2 => Ok(Self::Stereo),
            _ => Err(Error::invalid_argument(
                "channels",
                format!("{value} is not one of 1 or 2"),
            )),
        }
    }
}

impl From<Channels> for i64 {
    fn from(channels: Channels) -> Self {
        channels.count() as i64
    }
}

/// Encoder tuning profile, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Application {
    /// Best quality for voice signals.
    Voip,
    /// Best quality for non-voice signals.
    Audio,
    /// Minimum possible coding delay.
    RestrictedLowdelay,
}

impl Application {
    pub(crate) fn to_ffi(self) -> i32 {
        match self {
            Self::Voip => ffi::OPUS_APPLICATION_VOIP,
            Self::Audio => ffi::OPUS_APPLICATION_AUDIO,
            Self::RestrictedLowdelay => ffi::OPUS_APPLICATION_RESTRICTED_LOWDELAY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voip => "voip",
            Self::Audio => "audio",
            Self::RestrictedLowdelay => "restricted_lowdelay",
        }
    }
}

impl FromStr for Application {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "voip" => Ok(Self::Voip),
            "audio" => Ok(Self::Audio),
            "restricted_lowdelay" => Ok(Self::RestrictedLowdelay),
            _ => Err(Error::invalid_argument(
                "application",
                format!("{s:?} is not one of voip, audio or restricted_lowdelay"),
            )),
        }
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hint about the content being encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    #[default]
    Auto,
    Voice,
    Music,
}

impl Signal {
    pub(crate) fn to_ffi(self) -> i32 {
        match self {
            Self::Auto => ffi::OPUS_AUTO,
            Self::Voice => ffi::OPUS_SIGNAL_VOICE,
            Self::Music => ffi::OPUS_SIGNAL_MUSIC,
        }
    }
}

impl FromStr for Signal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "voice" => Ok(Self::Voice),
            "music" => Ok(Self::Music),
            _ => Err(Error::invalid_argument(
                "signal",
                format!("{s:?} is not one of auto, voice or music"),
            )),
        }
    }
}

/// Target bitrate in bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Bitrate(i32);

impl Bitrate {
    pub const MIN: i32 = 500;
    pub const MAX: i32 = 512_000;

    pub fn bits_per_second(&self) -> i32 {
        self.0
    }
}

impl TryFrom<i64> for Bitrate {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        if value < Self::MIN as i64 || value > Self::MAX as i64 {
            return Err(Error::invalid_argument(
                "bitrate",
                format!("{value} is not between {} and {}", Self::MIN, Self::MAX),
            ));
        }
        Ok(Self(value as i32))
    }
}

impl From<Bitrate> for i64 {
    fn from(bitrate: Bitrate) -> Self {
        bitrate.0 as i64
    }
}

pub fn validate_sample_rate(value: i64) -> Result<SampleRate> {
    SampleRate::try_from(value)
}

pub fn validate_channels(value: i64) -> Result<Channels> {
    Channels::try_from(value)
}

pub fn validate_application(value: &str) -> Result<Application> {
    value.parse()
}

pub fn validate_bitrate(value: i64) -> Result<Bitrate> {
    Bitrate::try_from(value)
}

pub fn validate_signal(value: &str) -> Result<Signal> {
    value.parse()
}

/// Validates an encode frame size (samples per channel).
///
/// Only positivity and range are checked here; whether the size is a legal
/// Opus frame duration is left to libopus.
pub fn validate_frame_size(value: i64) -> Result<usize> {
    if value <= 0 || value > i32::MAX as i64 {
        return Err(Error::invalid_argument(
            "frame_size",
            format!("{value} is not a positive sample count"),
        ));
    }
    Ok(value as usize)
}

/// Validates a decode duration in milliseconds; 0 means "not known".
pub fn validate_duration_ms(value: i64) -> Result<u32> {
    if value < 0 || value > MAX_PACKET_DURATION_MS as i64 {
        return Err(Error::invalid_argument(
            "duration",
            format!("{value} is not between 0 and {MAX_PACKET_DURATION_MS} ms"),
        ));
    }
    Ok(value as u32)
}

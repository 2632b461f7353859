//! Buffer sizing for encode and decode calls.
//!
//! Decode buffers are sized exactly: either from the requested duration
//! (loss concealment and FEC recovery) or from the sample count the packet
//! itself declares. There is no fixed worst-case decode buffer.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Operation, Result, check};
use crate::ffi;
use crate::params::{Channels, SampleRate};

/// Upper bound for one encoded packet.
///
/// This is the `max_data_bytes` value recommended by the libopus
/// documentation for `opus_encode`; it holds a 120 ms packet at the highest
/// bitrate.
pub const MAX_PACKET_SIZE: usize = 4000;

/// Bytes per PCM sample (signed 16-bit).
pub const BYTES_PER_SAMPLE: usize = 2;

/// Samples per channel covered by `duration_ms` at `rate`.
pub fn samples_for_duration(rate: SampleRate, duration_ms: u32) -> usize {
    rate.hz() as usize * duration_ms as usize / 1000
}

/// Bytes of interleaved 16-bit PCM for `samples_per_channel`.
pub fn pcm_bytes(samples_per_channel: usize, channels: Channels) -> usize {
    samples_per_channel * channels.count() as usize * BYTES_PER_SAMPLE
}

/// Frame durations libopus accepts for encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameDuration {
    Duration2500us,
    Duration5ms,
    Duration10ms,
    Duration20ms,
    Duration40ms,
    Duration60ms,
}

impl FrameDuration {
    pub const ALL: [FrameDuration; 6] = [
        Self::Duration2500us,
        Self::Duration5ms,
        Self::Duration10ms,
        Self::Duration20ms,
        Self::Duration40ms,
        Self::Duration60ms,
    ];

    /// Returns the duration in microseconds.
    pub fn micros(&self) -> u32 {
        match self {
            Self::Duration2500us => 2_500,
            Self::Duration5ms => 5_000,
            Self::Duration10ms => 10_000,
            Self::Duration20ms => 20_000,
            Self::Duration40ms => 40_000,
            Self::Duration60ms => 60_000,
        }
    }

    /// Returns the frame size in samples per channel at `rate`.
    pub fn samples(&self, rate: SampleRate) -> usize {
        rate.hz() as usize * self.micros() as usize / 1_000_000
    }
}

impl fmt::Display for FrameDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duration2500us => write!(f, "2.5ms"),
            Self::Duration5ms => write!(f, "5ms"),
            Self::Duration10ms => write!(f, "10ms"),
            Self::Duration20ms => write!(f, "20ms"),
            Self::Duration40ms => write!(f, "40ms"),
            Self::Duration60ms => write!(f, "60ms"),
        }
    }
}

impl FromStr for FrameDuration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim_end_matches("ms") {
            "2.5" => Ok(Self::Duration2500us),
            "5" => Ok(Self::Duration5ms),
            "10" => Ok(Self::Duration10ms),
            "20" => Ok(Self::Duration20ms),
            "40" => Ok(Self::Duration40ms),
            "60" => Ok(Self::Duration60ms),
            _ => Err(Error::invalid_argument(
                "frame_duration",
                format!("{s:?} is not one of 2.5, 5, 10, 20, 40 or 60 ms"),
            )),
        }
    }
}

/// Packet length as libopus takes it.
pub(crate) fn payload_len(packet: &[u8]) -> Result<i32> {
    i32::try_from(packet.len()).map_err(|_| {
        Error::invalid_argument("payload", format!("{} bytes is too long for a packet", packet.len()))
    })
}

/// Samples per channel declared by an Opus packet.
pub fn packet_samples(packet: &[u8], rate: SampleRate) -> Result<usize> {
    if packet.is_empty() {
        return Err(Error::invalid_argument("payload", "empty packet"));
    }
    let len = payload_len(packet)?;
    let n = unsafe { ffi::opus_packet_get_nb_samples(packet.as_ptr(), len, rate.hz() as i32) };
    Ok(check(Operation::Decode, n)? as usize)
}

/// Channel count declared by an Opus packet's TOC byte.
pub fn packet_channels(packet: &[u8]) -> Result<u8> {
    if packet.is_empty() {
        return Err(Error::invalid_argument("payload", "empty packet"));
    }
    let n = unsafe { ffi::opus_packet_get_nb_channels(packet.as_ptr()) };
    Ok(check(Operation::Decode, n)? as u8)
}

/// How a single decode call is carried out and how large its output is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePlan {
    /// Packet loss concealment: no packet, synthesize `samples`.
    Conceal { samples: usize },
    /// Recover the previous lost frame from in-band FEC data.
    Recover { samples: usize },
    /// Regular decode of a packet declaring `samples`.
    Packet { samples: usize },
}

impl DecodePlan {
    /// Chooses the decode path for one call.
    ///
    /// An empty payload means the packet was lost. A `duration_ms` of 0
    /// means the caller does not know the frame duration; it is required
    /// for concealment and FEC, where there is no packet to introspect.
    pub fn resolve(
        rate: SampleRate,
        channels: Channels,
        payload: &[u8],
        use_fec: bool,
        duration_ms: u32,
    ) -> Result<Self> {
        if payload.is_empty() {
            if use_fec {
                return Err(Error::invalid_argument(
                    "use_fec",
                    "FEC needs the packet following the lost one; got an empty payload",
                ));
            }
            return Ok(Self::Conceal {
                samples: required_samples(rate, duration_ms)?,
            });
        }

        // FEC data rides in the same packet, so it gets the same checks.
        let samples = packet_samples(payload, rate)?;
        let got = packet_channels(payload)?;
        if got != channels.count() {
            return Err(Error::ChannelMismatch {
                expected: channels.count(),
                got,
            });
        }

        if use_fec {
            return Ok(Self::Recover {
                samples: required_samples(rate, duration_ms)?,
            });
        }

        if duration_ms > 0 {
            let expected = samples_for_duration(rate, duration_ms);
            if expected != samples {
                return Err(Error::InvalidFrameSize {
                    expected,
                    got: samples,
                });
            }
        }
        Ok(Self::Packet { samples })
    }

    /// Samples per channel the decode must produce.
    pub fn samples(&self) -> usize {
        match *self {
            Self::Conceal { samples } | Self::Recover { samples } | Self::Packet { samples } => {
                samples
            }
        }
    }

    /// Exact size of the PCM output in bytes.
    pub fn output_bytes(&self, channels: Channels) -> usize {
        pcm_bytes(self.samples(), channels)
    }

    /// Value of libopus' `decode_fec` flag for this plan.
    pub(crate) fn fec_flag(&self) -> i32 {
        matches!(self, Self::Recover { .. }) as i32
    }

    /// Fails unless the codec produced exactly the planned sample count.
    pub fn verify(&self, decoded: usize) -> Result<()> {
        if decoded != self.samples() {
            return Err(Error::InvalidFrameSize {
                expected: self.samples(),
                got: decoded,
            });
        }
        Ok(())
    }
}

fn required_samples(rate: SampleRate, duration_ms: u32) -> Result<usize> {
    if duration_ms == 0 {
        return Err(Error::invalid_argument(
            "duration",
            "a frame duration is required when there is no packet to size from",
        ));
    }
    Ok(samples_for_duration(rate, duration_ms))
}

/// Serializes samples as little-endian bytes.
pub fn pcm_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Parses little-endian bytes into samples. A trailing odd byte is ignored.
pub fn le_bytes_to_pcm(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // TOC bytes: config 31 (CELT fullband, 20 ms), one frame.
    const CELT_20MS_MONO: u8 = 0b11111_0_00;
    const CELT_20MS_STEREO: u8 = 0b11111_1_00;
    // Config 1 (SILK narrowband, 20 ms), two equal frames.
    const SILK_2X20MS_MONO: u8 = 0b00001_0_01;

    #[test]
    fn test_samples_for_duration() {
        assert_eq!(samples_for_duration(SampleRate::Hz48000, 20), 960);
        assert_eq!(samples_for_duration(SampleRate::Hz16000, 20), 320);
        assert_eq!(samples_for_duration(SampleRate::Hz8000, 60), 480);
        assert_eq!(samples_for_duration(SampleRate::Hz12000, 10), 120);
    }

    #[test]
    fn test_pcm_bytes() {
        assert_eq!(pcm_bytes(960, Channels::Stereo), 3840);
        assert_eq!(pcm_bytes(320, Channels::Mono), 640);
    }

    #[test]
    fn test_frame_duration_samples() {
        let at_48k: Vec<usize> = FrameDuration::ALL
            .iter()
            .map(|fd| fd.samples(SampleRate::Hz48000))
            .collect();
        assert_eq!(at_48k, vec![120, 240, 480, 960, 1920, 2880]);
        assert_eq!(FrameDuration::Duration2500us.samples(SampleRate::Hz8000), 20);
        assert_eq!("2.5".parse::<FrameDuration>().unwrap(), FrameDuration::Duration2500us);
        assert_eq!("20ms".parse::<FrameDuration>().unwrap(), FrameDuration::Duration20ms);
        assert!("30".parse::<FrameDuration>().is_err());
    }

    #[test]
    fn test_plc_plan() {
        let plan =
            DecodePlan::resolve(SampleRate::Hz48000, Channels::Stereo, &[], false, 20).unwrap();
        assert_eq!(plan, DecodePlan::Conceal { samples: 960 });
        assert_eq!(plan.output_bytes(Channels::Stereo), 3840);
        assert_eq!(plan.fec_flag(), 0);
    }

    #[test]
    fn test_plc_without_duration() {
        let err =
            DecodePlan::resolve(SampleRate::Hz48000, Channels::Mono, &[], false, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { field: "duration", .. }));
    }

    #[test]
    fn test_plc_with_fec_rejected() {
        let err =
            DecodePlan::resolve(SampleRate::Hz48000, Channels::Mono, &[], true, 20).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { field: "use_fec", .. }));
    }

    #[test]
    fn test_fec_plan() {
        let packet = [CELT_20MS_MONO, 0, 0];
        let plan =
            DecodePlan::resolve(SampleRate::Hz16000, Channels::Mono, &packet, true, 20).unwrap();
        assert_eq!(plan, DecodePlan::Recover { samples: 320 });
        assert_eq!(plan.fec_flag(), 1);
    }

    #[test]
    fn test_packet_plan() {
        let packet = [CELT_20MS_STEREO, 0, 0];
        let plan =
            DecodePlan::resolve(SampleRate::Hz48000, Channels::Stereo, &packet, false, 0).unwrap();
        assert_eq!(plan, DecodePlan::Packet { samples: 960 });

        let packet = [SILK_2X20MS_MONO, 0, 0];
        let plan =
            DecodePlan::resolve(SampleRate::Hz8000, Channels::Mono, &packet, false, 40).unwrap();
        assert_eq!(plan.samples(), 320);
    }

    #[test]
    fn test_packet_channel_mismatch() {
        let packet = [CELT_20MS_STEREO, 0, 0];
        let err = DecodePlan::resolve(SampleRate::Hz48000, Channels::Mono, &packet, false, 0)
            .unwrap_err();
        assert_eq!(err, Error::ChannelMismatch { expected: 1, got: 2 });
    }

    #[test]
    fn test_fec_plan_channel_mismatch() {
        let packet = [CELT_20MS_STEREO, 0, 0];
        let err = DecodePlan::resolve(SampleRate::Hz48000, Channels::Mono, &packet, true, 20)
            .unwrap_err();
        assert_eq!(err, Error::ChannelMismatch { expected: 1, got: 2 });

        let packet = [CELT_20MS_MONO, 0, 0];
        let err = DecodePlan::resolve(SampleRate::Hz48000, Channels::Stereo, &packet, true, 20)
            .unwrap_err();
        assert_eq!(err, Error::ChannelMismatch { expected: 2, got: 1 });
    }

    #[test]
    fn test_fec_plan_malformed_packet() {
        let err = DecodePlan::resolve(SampleRate::Hz48000, Channels::Mono, &[0b11111_0_11], true, 20)
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_payload_len() {
        assert_eq!(payload_len(&[0u8; 3]).unwrap(), 3);
        assert_eq!(payload_len(&[]).unwrap(), 0);
    }

    #[test]
    fn test_packet_duration_disagrees() {
        let packet = [CELT_20MS_MONO, 0, 0];
        let err = DecodePlan::resolve(SampleRate::Hz48000, Channels::Mono, &packet, false, 10)
            .unwrap_err();
        assert_eq!(err, Error::InvalidFrameSize { expected: 480, got: 960 });
    }

    #[test]
    fn test_malformed_packet() {
        // Code 3 packet missing its frame count byte.
        let err = packet_samples(&[0b11111_0_11], SampleRate::Hz48000).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_verify() {
        let plan = DecodePlan::Packet { samples: 960 };
        assert!(plan.verify(960).is_ok());
        assert_eq!(
            plan.verify(480).unwrap_err(),
            Error::InvalidFrameSize { expected: 960, got: 480 }
        );
    }

    #[test]
    fn test_le_conversion() {
        let samples = [0i16, 1, -1, i16::MAX, i16::MIN];
        let bytes = pcm_to_le_bytes(&samples);
        assert_eq!(&bytes[..6], &[0, 0, 1, 0, 0xff, 0xff]);
        assert_eq!(le_bytes_to_pcm(&bytes), samples);
        assert_eq!(le_bytes_to_pcm(&[1, 0, 7]), vec![1]);
    }
}

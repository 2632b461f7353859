//! Opus decoder session.

use std::ptr;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{Error, Operation, Result, check, map_native_error};
use crate::ffi::{self, OpusDecoder as OpusDecoderHandle};
use crate::params::{Channels, SampleRate, validate_channels, validate_sample_rate};
use crate::sizing::{DecodePlan, payload_len, pcm_to_le_bytes};

/// Parameters for [`DecoderSession::with_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    pub sample_rate: SampleRate,
    pub channels: Channels,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz48000,
            channels: Channels::Stereo,
        }
    }
}

/// Exclusively owned libopus decoder state.
struct NativeDecoder {
    handle: *mut OpusDecoderHandle,
}

// Safety: the handle is only touched through the session lock.
unsafe impl Send for NativeDecoder {}

impl NativeDecoder {
    fn create(sample_rate: SampleRate, channels: Channels) -> Result<Self> {
        let mut error: i32 = 0;
        let handle = unsafe {
            ffi::opus_decoder_create(sample_rate.hz() as i32, channels.count() as i32, &mut error)
        };

        if error != ffi::OPUS_OK {
            if !handle.is_null() {
                unsafe { ffi::opus_decoder_destroy(handle) };
            }
            return Err(map_native_error(Operation::Create, error));
        }
        if handle.is_null() {
            return Err(map_native_error(Operation::Create, ffi::OPUS_ALLOC_FAIL));
        }

        Ok(Self { handle })
    }
}

impl Drop for NativeDecoder {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe { ffi::opus_decoder_destroy(self.handle) };
            self.handle = ptr::null_mut();
        }
    }
}

enum DecoderState {
    Ready(NativeDecoder),
    Destroyed,
}

/// A decoder session.
///
/// All operations take `&self` and are serialized by an internal lock, so a
/// session can be shared between threads. After [`destroy`](Self::destroy)
/// every operation fails with [`Error::InvalidState`].
pub struct DecoderSession {
    sample_rate: SampleRate,
    channels: Channels,
    state: Mutex<DecoderState>,
}

impl DecoderSession {
    /// Creates a decoder for `sample_rate` and `channels`.
    pub fn create(sample_rate: SampleRate, channels: Channels) -> Result<Self> {
        let native = NativeDecoder::create(sample_rate, channels)?;
        debug!(
            "opus: created decoder {:p}, sample rate = {}, channels = {}",
            native.handle,
            sample_rate,
            channels.count()
        );
        Ok(Self {
            sample_rate,
            channels,
            state: Mutex::new(DecoderState::Ready(native)),
        })
    }

    /// Creates a decoder from raw host values.
    pub fn from_raw(sample_rate: i64, channels: i64) -> Result<Self> {
        let sample_rate = validate_sample_rate(sample_rate)?;
        let channels = validate_channels(channels)?;
        Self::create(sample_rate, channels)
    }

    pub fn with_config(config: &DecoderConfig) -> Result<Self> {
        Self::create(config.sample_rate, config.channels)
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    /// Returns the channel layout.
    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Returns true once the session has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        matches!(*self.state.lock(), DecoderState::Destroyed)
    }

    /// Decodes one packet into interleaved little-endian PCM.
    ///
    /// An empty `payload` marks a lost packet and runs loss concealment for
    /// `duration_ms`. With `use_fec`, the frame preceding `payload` is
    /// recovered from its redundancy data instead; `duration_ms` is then the
    /// duration of that lost frame. For a regular packet `duration_ms` may be
    /// 0; otherwise it must match the packet.
    pub fn decode_packet(&self, payload: &[u8], use_fec: bool, duration_ms: u32) -> Result<Bytes> {
        let state = self.state.lock();
        let native = match &*state {
            DecoderState::Ready(native) => native,
            DecoderState::Destroyed => return Err(Error::InvalidState),
        };

        let plan = DecodePlan::resolve(self.sample_rate, self.channels, payload, use_fec, duration_ms)?;
        let samples = plan.samples();
        let mut buf = vec![0i16; samples * self.channels.count() as usize];

        let (data_ptr, data_len) = match plan {
            DecodePlan::Conceal { .. } => (ptr::null(), 0),
            _ => (payload.as_ptr(), payload_len(payload)?),
        };

        let n = unsafe {
            ffi::opus_decode(
                native.handle,
                data_ptr,
                data_len,
                buf.as_mut_ptr(),
                samples as i32,
                plan.fec_flag(),
            )
        };
        let decoded = check(Operation::Decode, n)? as usize;
        plan.verify(decoded)?;

        trace!(
            "opus: decoded {:?}: {} bytes in, {} samples per channel out",
            plan,
            payload.len(),
            decoded
        );

        Ok(Bytes::from(pcm_to_le_bytes(&buf)))
    }

    /// Returns the duration of the last decoded packet in milliseconds.
    pub fn last_packet_duration(&self) -> Result<u32> {
        let state = self.state.lock();
        let native = match &*state {
            DecoderState::Ready(native) => native,
            DecoderState::Destroyed => return Err(Error::InvalidState),
        };

        let mut samples: i32 = 0;
        let ret = unsafe {
            ffi::opus_decoder_ctl(
                native.handle,
                ffi::OPUS_GET_LAST_PACKET_DURATION_REQUEST,
                &mut samples as *mut i32,
            )
        };
        check(Operation::GetLastPacketDuration, ret)?;

        Ok((1000 * samples.max(0) as u64 / self.sample_rate.hz() as u64) as u32)
    }

    /// Releases the native decoder. Fails if already destroyed.
    pub fn destroy(&self) -> Result<()> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, DecoderState::Destroyed) {
            DecoderState::Ready(native) => {
                debug!("opus: destroying decoder {:p}", native.handle);
                drop(native);
                Ok(())
            }
            DecoderState::Destroyed => Err(Error::InvalidState),
        }
    }
}

impl Drop for DecoderSession {
    fn drop(&mut self) {
        if let DecoderState::Ready(native) = self.state.get_mut() {
            warn!("opus: decoder {:p} dropped without destroy, releasing", native.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncoderSession;
    use crate::params::Application;

    #[test]
    fn test_decoder_create() {
        let dec = DecoderSession::create(SampleRate::Hz16000, Channels::Mono).unwrap();
        assert_eq!(dec.sample_rate(), SampleRate::Hz16000);
        assert_eq!(dec.channels(), Channels::Mono);
        assert!(!dec.is_destroyed());
    }

    #[test]
    fn test_decoder_from_raw_rejects() {
        let err = DecoderSession::from_raw(44100, 2).err().unwrap();
        assert!(matches!(err, Error::InvalidArgument { field: "sample_rate", .. }));
        let err = DecoderSession::from_raw(48000, 3).err().unwrap();
        assert!(matches!(err, Error::InvalidArgument { field: "channels", .. }));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let enc =
            EncoderSession::create(SampleRate::Hz16000, Channels::Mono, Application::Voip).unwrap();
        let dec = DecoderSession::create(SampleRate::Hz16000, Channels::Mono).unwrap();

        let pcm: Vec<i16> = (0..320).map(|i| (i * 100 % 32768) as i16).collect();
        let packet = enc.encode_packet(&pcm_to_le_bytes(&pcm), 320).unwrap();
        let decoded = dec.decode_packet(&packet, false, 0).unwrap();

        assert_eq!(decoded.len(), 320 * 2);
        assert_eq!(dec.last_packet_duration().unwrap(), 20);
    }

    #[test]
    fn test_plc() {
        let dec = DecoderSession::create(SampleRate::Hz48000, Channels::Stereo).unwrap();
        let pcm = dec.decode_packet(&[], false, 20).unwrap();
        assert_eq!(pcm.len(), 3840);

        let pcm = dec.decode_packet(&[], false, 10).unwrap();
        assert_eq!(pcm.len(), 1920);
    }

    #[test]
    fn test_fec_after_loss() {
        let enc =
            EncoderSession::create(SampleRate::Hz48000, Channels::Mono, Application::Voip).unwrap();
        let dec = DecoderSession::create(SampleRate::Hz48000, Channels::Mono).unwrap();
        let pcm = vec![0u8; 960 * 2];

        let first = enc.encode_packet(&pcm, 960).unwrap();
        let _lost = enc.encode_packet(&pcm, 960).unwrap();
        let third = enc.encode_packet(&pcm, 960).unwrap();

        dec.decode_packet(&first, false, 0).unwrap();
        let recovered = dec.decode_packet(&third, true, 20).unwrap();
        assert_eq!(recovered.len(), 960 * 2);
        let current = dec.decode_packet(&third, false, 20).unwrap();
        assert_eq!(current.len(), 960 * 2);
    }

    #[test]
    fn test_channel_mismatch() {
        let enc =
            EncoderSession::create(SampleRate::Hz48000, Channels::Stereo, Application::Audio)
                .unwrap();
        let dec = DecoderSession::create(SampleRate::Hz48000, Channels::Mono).unwrap();

        // Noise keeps the encoder from collapsing to a mono packet.
        let pcm: Vec<i16> = (0..960 * 2)
            .map(|i| if i % 2 == 0 { (i * 7919 % 20000) as i16 } else { -((i * 104729 % 20000) as i16) })
            .collect();
        let packet = enc.encode_packet(&pcm_to_le_bytes(&pcm), 960).unwrap();

        let err = dec.decode_packet(&packet, false, 0).unwrap_err();
        assert_eq!(err, Error::ChannelMismatch { expected: 1, got: 2 });
        assert!(!dec.is_destroyed());
    }

    #[test]
    fn test_bad_packet_leaves_session_ready() {
        let dec = DecoderSession::create(SampleRate::Hz48000, Channels::Mono).unwrap();
        let err = dec.decode_packet(&[0b11111_0_11], false, 0).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(dec.decode_packet(&[], false, 20).unwrap().len(), 1920);
    }

    #[test]
    fn test_destroy() {
        let dec = DecoderSession::create(SampleRate::Hz8000, Channels::Mono).unwrap();
        dec.destroy().unwrap();
        assert!(dec.is_destroyed());
        assert_eq!(dec.destroy().unwrap_err(), Error::InvalidState);
        assert_eq!(dec.decode_packet(&[], false, 20).unwrap_err(), Error::InvalidState);
        assert_eq!(dec.last_packet_duration().unwrap_err(), Error::InvalidState);
    }
}

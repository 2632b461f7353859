//! Opus encoder session.

use std::ptr;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{Error, Operation, Result, check, map_native_error};
use crate::ffi::{self, OpusEncoder as OpusEncoderHandle};
use crate::params::{
    Application, Bitrate, Channels, SampleRate, Signal, validate_application, validate_channels,
    validate_sample_rate,
};
use crate::sizing::{MAX_PACKET_SIZE, le_bytes_to_pcm, pcm_bytes};

/// Parameters for [`EncoderSession::with_config`].
///
/// `bitrate` and `signal` are applied right after creation when set;
/// otherwise libopus picks its defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub sample_rate: SampleRate,
    pub channels: Channels,
    pub application: Application,
    #[serde(default)]
    pub bitrate: Option<Bitrate>,
    #[serde(default)]
    pub signal: Option<Signal>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz48000,
            channels: Channels::Stereo,
            application: Application::Audio,
            bitrate: None,
            signal: None,
        }
    }
}

/// Exclusively owned libopus encoder state.
struct NativeEncoder {
    handle: *mut OpusEncoderHandle,
}

// Safety: the handle is only touched through the session lock.
unsafe impl Send for NativeEncoder {}

impl NativeEncoder {
    fn create(sample_rate: SampleRate, channels: Channels, application: Application) -> Result<Self> {
        let mut error: i32 = 0;
        let handle = unsafe {
            ffi::opus_encoder_create(
                sample_rate.hz() as i32,
                channels.count() as i32,
                application.to_ffi(),
                &mut error,
            )
        };

        if error != ffi::OPUS_OK {
            if !handle.is_null() {
                unsafe { ffi::opus_encoder_destroy(handle) };
            }
            return Err(map_native_error(Operation::Create, error));
        }
        if handle.is_null() {
            return Err(map_native_error(Operation::Create, ffi::OPUS_ALLOC_FAIL));
        }

        // Left on auto, libopus may code a stereo stream as mono at low
        // rates, and the TOC byte then no longer matches the session.
        let native = Self { handle };
        let ret = unsafe {
            ffi::opus_encoder_ctl(
                native.handle,
                ffi::OPUS_SET_FORCE_CHANNELS_REQUEST,
                channels.count() as i32,
            )
        };
        check(Operation::Create, ret)?;

        Ok(native)
    }

    fn set_bitrate(&self, bitrate: Bitrate) -> Result<()> {
        let ret = unsafe {
            ffi::opus_encoder_ctl(
                self.handle,
                ffi::OPUS_SET_BITRATE_REQUEST,
                bitrate.bits_per_second(),
            )
        };
        check(Operation::SetBitrate, ret).map(|_| ())
    }

    fn set_signal(&self, signal: Signal) -> Result<()> {
        let ret = unsafe {
            ffi::opus_encoder_ctl(self.handle, ffi::OPUS_SET_SIGNAL_REQUEST, signal.to_ffi())
        };
        check(Operation::SetSignal, ret).map(|_| ())
    }
}

impl Drop for NativeEncoder {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe { ffi::opus_encoder_destroy(self.handle) };
            self.handle = ptr::null_mut();
        }
    }
}

enum EncoderState {
    Ready {
        native: NativeEncoder,
        // Reused across calls; compressed size is not known up front.
        scratch: Box<[u8]>,
    },
    Destroyed,
}

/// An encoder session.
///
/// Like [`DecoderSession`](crate::DecoderSession), operations are serialized
/// by an internal lock that also guards the reusable output buffer.
pub struct EncoderSession {
    sample_rate: SampleRate,
    channels: Channels,
    application: Application,
    state: Mutex<EncoderState>,
}

impl EncoderSession {
    /// Creates an encoder.
    pub fn create(
        sample_rate: SampleRate,
        channels: Channels,
        application: Application,
    ) -> Result<Self> {
        Self::with_config(&EncoderConfig {
            sample_rate,
            channels,
            application,
            bitrate: None,
            signal: None,
        })
    }

    /// Creates an encoder from raw host values.
    pub fn from_raw(sample_rate: i64, channels: i64, application: &str) -> Result<Self> {
        let sample_rate = validate_sample_rate(sample_rate)?;
        let channels = validate_channels(channels)?;
        let application = validate_application(application)?;
        Self::create(sample_rate, channels, application)
    }

    /// Creates an encoder and applies the optional settings in `config`.
    ///
    /// If a setting is rejected the native encoder is released before the
    /// error is returned.
    pub fn with_config(config: &EncoderConfig) -> Result<Self> {
        let native = NativeEncoder::create(config.sample_rate, config.channels, config.application)?;
        if let Some(bitrate) = config.bitrate {
            native.set_bitrate(bitrate)?;
        }
        if let Some(signal) = config.signal {
            native.set_signal(signal)?;
        }

        debug!(
            "opus: created encoder {:p}, sample rate = {}, channels = {}, application = {}",
            native.handle,
            config.sample_rate,
            config.channels.count(),
            config.application
        );

        Ok(Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            application: config.application,
            state: Mutex::new(EncoderState::Ready {
                native,
                scratch: vec![0u8; MAX_PACKET_SIZE].into_boxed_slice(),
            }),
        })
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    /// Returns the channel layout.
    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Returns the application mode the encoder was created with.
    pub fn application(&self) -> Application {
        self.application
    }

    /// Returns true once the session has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        matches!(*self.state.lock(), EncoderState::Destroyed)
    }

    /// Sets the target bitrate.
    pub fn set_bitrate(&self, bitrate: Bitrate) -> Result<()> {
        let state = self.state.lock();
        let EncoderState::Ready { native, .. } = &*state else {
            return Err(Error::InvalidState);
        };
        native.set_bitrate(bitrate)?;
        debug!(
            "opus: encoder {:p} bitrate set to {}",
            native.handle,
            bitrate.bits_per_second()
        );
        Ok(())
    }

    /// Returns the bitrate the encoder is currently targeting.
    pub fn bitrate(&self) -> Result<i32> {
        let state = self.state.lock();
        let EncoderState::Ready { native, .. } = &*state else {
            return Err(Error::InvalidState);
        };

        let mut bitrate: i32 = 0;
        let ret = unsafe {
            ffi::opus_encoder_ctl(
                native.handle,
                ffi::OPUS_GET_BITRATE_REQUEST,
                &mut bitrate as *mut i32,
            )
        };
        check(Operation::GetBitrate, ret)?;
        Ok(bitrate)
    }

    /// Sets the signal type hint.
    pub fn set_signal(&self, signal: Signal) -> Result<()> {
        let state = self.state.lock();
        let EncoderState::Ready { native, .. } = &*state else {
            return Err(Error::InvalidState);
        };
        native.set_signal(signal)
    }

    /// Encodes one frame of interleaved little-endian PCM.
    ///
    /// `pcm` must hold exactly `frame_size` samples per channel. The frame
    /// size must be a legal Opus duration at the session's sample rate;
    /// libopus rejects anything else with [`Error::Encode`].
    pub fn encode_packet(&self, pcm: &[u8], frame_size: usize) -> Result<Bytes> {
        let mut state = self.state.lock();
        let EncoderState::Ready { native, scratch } = &mut *state else {
            return Err(Error::InvalidState);
        };

        if frame_size == 0 || frame_size > i32::MAX as usize {
            return Err(Error::invalid_argument(
                "frame_size",
                format!("{frame_size} is not a positive sample count"),
            ));
        }
        let expected = pcm_bytes(frame_size, self.channels);
        if pcm.len() != expected {
            return Err(Error::invalid_argument(
                "pcm",
                format!(
                    "expected {expected} bytes for {frame_size} samples x {} channels, got {}",
                    self.channels.count(),
                    pcm.len()
                ),
            ));
        }

        let samples = le_bytes_to_pcm(pcm);
        let n = unsafe {
            ffi::opus_encode(
                native.handle,
                samples.as_ptr(),
                frame_size as i32,
                scratch.as_mut_ptr(),
                scratch.len() as i32,
            )
        };
        let n = check(Operation::Encode, n)? as usize;

        trace!("opus: encoded {} samples per channel into {} bytes", frame_size, n);

        Ok(Bytes::copy_from_slice(&scratch[..n]))
    }

    /// Releases the native encoder. Fails if already destroyed.
    pub fn destroy(&self) -> Result<()> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, EncoderState::Destroyed) {
            EncoderState::Ready { native, .. } => {
                debug!("opus: destroying encoder {:p}", native.handle);
                drop(native);
                Ok(())
            }
            EncoderState::Destroyed => Err(Error::InvalidState),
        }
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        if let EncoderState::Ready { native, .. } = self.state.get_mut() {
            warn!("opus: encoder {:p} dropped without destroy, releasing", native.handle);
        }
    }
}

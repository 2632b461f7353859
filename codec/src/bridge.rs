//! Host-facing operation surface.
//!
//! [`Bridge`] owns the session registries and exposes every operation as a
//! call over raw host values: integers as `i64`, symbols as `&str`, payloads
//! as byte slices. Hosts keep only the returned handles.

use bytes::Bytes;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::decoder::DecoderSession;
use crate::encoder::{EncoderConfig, EncoderSession};
use crate::error::Result;
use crate::params::{
    validate_bitrate, validate_duration_ms, validate_frame_size, validate_signal,
};
use crate::registry::{Handle, Registry};

/// Handle to a decoder session owned by a [`Bridge`].
pub type DecoderHandle = Handle<DecoderSession>;

/// Handle to an encoder session owned by a [`Bridge`].
pub type EncoderHandle = Handle<EncoderSession>;

static BRIDGE: Lazy<Bridge> = Lazy::new(Bridge::new);

/// Returns the process-wide bridge, creating it on first use.
pub fn bridge() -> &'static Bridge {
    &BRIDGE
}

/// Session registries plus the host operation table.
#[derive(Default)]
pub struct Bridge {
    decoders: Registry<DecoderSession>,
    encoders: Registry<EncoderSession>,
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions that have been created and not yet destroyed.
    pub fn live_sessions(&self) -> usize {
        self.decoders.len() + self.encoders.len()
    }

    // -----------------------------------------------------------------------
    // decoder.*
    // -----------------------------------------------------------------------

    pub fn decoder_create(&self, sample_rate: i64, channels: i64) -> Result<DecoderHandle> {
        let session = DecoderSession::from_raw(sample_rate, channels)?;
        let handle = self.decoders.insert(session);
        debug!("opus: decoder session {:?} registered", handle);
        Ok(handle)
    }

    /// Decodes `payload`; an empty payload marks a lost packet.
    pub fn decoder_decode_packet(
        &self,
        handle: DecoderHandle,
        payload: &[u8],
        use_fec: bool,
        duration_ms: i64,
    ) -> Result<Bytes> {
        let session = self.decoders.get(handle)?;
        let duration_ms = validate_duration_ms(duration_ms)?;
        session.decode_packet(payload, use_fec, duration_ms)
    }

    pub fn decoder_get_last_packet_duration(&self, handle: DecoderHandle) -> Result<u32> {
        self.decoders.get(handle)?.last_packet_duration()
    }

    /// Channel count of the decoder's output.
    pub fn decoder_channels(&self, handle: DecoderHandle) -> Result<u8> {
        Ok(self.decoders.get(handle)?.channels().count())
    }

    /// Destroys the session behind `handle`.
    ///
    /// The handle is unregistered first, so no new call can reach the
    /// session; destruction then waits for a call already in flight.
    pub fn decoder_destroy(&self, handle: DecoderHandle) -> Result<()> {
        let session = self.decoders.remove(handle)?;
        session.destroy()?;
        debug!("opus: decoder session {:?} destroyed", handle);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // encoder.*
    // -----------------------------------------------------------------------

    pub fn encoder_create(
        &self,
        sample_rate: i64,
        channels: i64,
        application: &str,
    ) -> Result<EncoderHandle> {
        let session = EncoderSession::from_raw(sample_rate, channels, application)?;
        let handle = self.encoders.insert(session);
        debug!("opus: encoder session {:?} registered", handle);
        Ok(handle)
    }

    /// Creates an encoder from an already validated configuration.
    pub fn encoder_create_with_config(&self, config: &EncoderConfig) -> Result<EncoderHandle> {
        let session = EncoderSession::with_config(config)?;
        let handle = self.encoders.insert(session);
        debug!("opus: encoder session {:?} registered", handle);
        Ok(handle)
    }

    pub fn encoder_set_bitrate(&self, handle: EncoderHandle, bitrate: i64) -> Result<()> {
        let session = self.encoders.get(handle)?;
        session.set_bitrate(validate_bitrate(bitrate)?)
    }

    pub fn encoder_get_bitrate(&self, handle: EncoderHandle) -> Result<i32> {
        self.encoders.get(handle)?.bitrate()
    }

    pub fn encoder_set_signal(&self, handle: EncoderHandle, signal: &str) -> Result<()> {
        let session = self.encoders.get(handle)?;
        session.set_signal(validate_signal(signal)?)
    }

    pub fn encoder_encode_packet(
        &self,
        handle: EncoderHandle,
        pcm: &[u8],
        frame_size: i64,
    ) -> Result<Bytes> {
        let session = self.encoders.get(handle)?;
        session.encode_packet(pcm, validate_frame_size(frame_size)?)
    }

    pub fn encoder_destroy(&self, handle: EncoderHandle) -> Result<()> {
        let session = self.encoders.remove(handle)?;
        session.destroy()?;
        debug!("opus: encoder session {:?} destroyed", handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_decoder_lifecycle() {
        let bridge = Bridge::new();
        let h = bridge.decoder_create(48000, 2).unwrap();
        assert_eq!(bridge.live_sessions(), 1);
        assert_eq!(bridge.decoder_channels(h).unwrap(), 2);

        let pcm = bridge.decoder_decode_packet(h, &[], false, 20).unwrap();
        assert_eq!(pcm.len(), 3840);

        bridge.decoder_destroy(h).unwrap();
        assert_eq!(bridge.live_sessions(), 0);
        assert_eq!(bridge.decoder_destroy(h).unwrap_err(), Error::InvalidState);
    }

    #[test]
    fn test_decode_duration_validated() {
        let bridge = Bridge::new();
        let h = bridge.decoder_create(16000, 1).unwrap();
        let err = bridge.decoder_decode_packet(h, &[], false, -20).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { field: "duration", .. }));
        bridge.decoder_destroy(h).unwrap();
    }

    #[test]
    fn test_encoder_lifecycle() {
        let bridge = Bridge::new();
        let h = bridge.encoder_create(16000, 1, "voip").unwrap();
        bridge.encoder_set_bitrate(h, 24000).unwrap();
        assert_eq!(bridge.encoder_get_bitrate(h).unwrap(), 24000);
        bridge.encoder_set_signal(h, "voice").unwrap();

        let packet = bridge.encoder_encode_packet(h, &[0u8; 640], 320).unwrap();
        assert!(!packet.is_empty());

        let err = bridge.encoder_encode_packet(h, &[0u8; 640], -320).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { field: "frame_size", .. }));

        bridge.encoder_destroy(h).unwrap();
        assert_eq!(bridge.encoder_get_bitrate(h).unwrap_err(), Error::InvalidState);
    }

    #[test]
    fn test_handles_are_typed_per_registry() {
        let bridge = Bridge::new();
        let dec = bridge.decoder_create(8000, 1).unwrap();
        // A decoder handle's raw bits do not resolve in the encoder table.
        let forged = EncoderHandle::from_u64(dec.to_u64());
        assert_eq!(bridge.encoder_get_bitrate(forged).unwrap_err(), Error::InvalidState);
        bridge.decoder_destroy(dec).unwrap();
    }

    #[test]
    fn test_global_bridge() {
        let h = bridge().encoder_create(48000, 2, "audio").unwrap();
        bridge().encoder_destroy(h).unwrap();
    }
}

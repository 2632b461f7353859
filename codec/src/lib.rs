//! Session-oriented Opus codec bridge.
//!
//! This crate wraps libopus encoder and decoder state in sessions that a
//! host runtime can drive through opaque handles:
//!
//! - [`params`]: validation of raw host values (sample rate, channels,
//!   application, bitrate)
//! - [`sizing`]: exact buffer sizing for decode paths (packet, loss
//!   concealment, FEC) and encode output
//! - [`DecoderSession`] / [`EncoderSession`]: lock-protected native state
//!   with an explicit `destroy`
//! - [`Registry`] and [`Bridge`]: generation-checked handles and the host
//!   operation table
//!
//! # Example
//!
//! ```ignore
//! use opusbridge_codec::bridge;
//!
//! let enc = bridge().encoder_create(48000, 2, "audio")?;
//! bridge().encoder_set_bitrate(enc, 64000)?;
//! let packet = bridge().encoder_encode_packet(enc, &pcm, 960)?;
//!
//! let dec = bridge().decoder_create(48000, 2)?;
//! let pcm = bridge().decoder_decode_packet(dec, &packet, false, 0)?;
//! // A lost packet: conceal 20 ms.
//! let filler = bridge().decoder_decode_packet(dec, &[], false, 20)?;
//!
//! bridge().encoder_destroy(enc)?;
//! bridge().decoder_destroy(dec)?;
//! ```
//!
//! # Thread Safety
//!
//! Sessions are `Send + Sync`. Each session runs at most one operation at a
//! time; concurrent calls on the same session wait for each other, and
//! `destroy` waits for a call in flight.

mod bridge;
mod decoder;
mod encoder;
mod error;
mod ffi;
pub mod params;
mod registry;
pub mod sizing;

pub use bridge::{Bridge, DecoderHandle, EncoderHandle, bridge};
pub use decoder::{DecoderConfig, DecoderSession};
pub use encoder::{EncoderConfig, EncoderSession};
pub use error::{Error, ErrorKind, NativeError, Operation, Result, map_native_error};
pub use params::{Application, Bitrate, Channels, SampleRate, Signal};
pub use registry::{Handle, Registry};
pub use sizing::{DecodePlan, FrameDuration, MAX_PACKET_SIZE};

//! Error taxonomy and native status mapping.

use std::fmt;

use thiserror::Error;

use crate::ffi;

/// The native call that produced a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Decode,
    Encode,
    SetBitrate,
    GetBitrate,
    SetSignal,
    GetLastPacketDuration,
}

impl Operation {
    /// Returns the operation name as reported to the host.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Decode => "decode",
            Self::Encode => "encode",
            Self::SetBitrate => "set_bitrate",
            Self::GetBitrate => "get_bitrate",
            Self::SetSignal => "set_signal",
            Self::GetLastPacketDuration => "get_last_packet_duration",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a negative libopus status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AllocFail,
    BadArg,
    BufferTooSmall,
    InternalError,
    InvalidPacket,
    InvalidState,
    Unimplemented,
    /// A code libopus does not document.
    Unknown(i32),
}

impl ErrorKind {
    /// Classifies a native status code.
    pub fn from_code(code: i32) -> Self {
        match code {
            ffi::OPUS_ALLOC_FAIL => Self::AllocFail,
            ffi::OPUS_BAD_ARG => Self::BadArg,
            ffi::OPUS_BUFFER_TOO_SMALL => Self::BufferTooSmall,
            ffi::OPUS_INTERNAL_ERROR => Self::InternalError,
            ffi::OPUS_INVALID_PACKET => Self::InvalidPacket,
            ffi::OPUS_INVALID_STATE => Self::InvalidState,
            ffi::OPUS_UNIMPLEMENTED => Self::Unimplemented,
            other => Self::Unknown(other),
        }
    }

    /// Returns the kind as a host symbol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllocFail => "alloc_fail",
            Self::BadArg => "bad_arg",
            Self::BufferTooSmall => "buffer_too_small",
            Self::InternalError => "internal_error",
            Self::InvalidPacket => "invalid_packet",
            Self::InvalidState => "invalid_state",
            Self::Unimplemented => "unimplemented",
            Self::Unknown(_) => "unknown",
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::AllocFail => "memory allocation has failed",
            Self::BadArg => "one or more invalid/out of range arguments",
            Self::BufferTooSmall => "not enough bytes allocated in the buffer",
            Self::InternalError => "an internal error was detected",
            Self::InvalidPacket => "the compressed data passed is corrupted",
            Self::InvalidState => "codec structure is invalid or already freed",
            Self::Unimplemented => "invalid/unsupported request number",
            Self::Unknown(_) => "unknown error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed native call: which operation, what kind, and the raw code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeError {
    pub op: Operation,
    pub kind: ErrorKind,
    pub code: i32,
}

impl NativeError {
    pub fn new(op: Operation, code: i32) -> Self {
        Self {
            op,
            kind: ErrorKind::from_code(code),
            code,
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.op, self.kind.describe(), self.code)
    }
}

/// Errors returned by codec sessions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("opus: invalid argument {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    #[error("opus: codec init failed: {0}")]
    CodecInit(NativeError),

    #[error("opus: decode failed: {0}")]
    Decode(NativeError),

    #[error("opus: encode failed: {0}")]
    Encode(NativeError),

    #[error("opus: control call failed: {0}")]
    Control(NativeError),

    #[error("opus: packet has {got} channels, session expects {expected}")]
    ChannelMismatch { expected: u8, got: u8 },

    #[error("opus: invalid frame size: expected {expected} samples per channel, got {got}")]
    InvalidFrameSize { expected: usize, got: usize },

    #[error("opus: session is destroyed or was never created")]
    InvalidState,
}

impl Error {
    pub(crate) fn invalid_argument(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }

    /// Returns the native error behind this error, if it came from libopus.
    pub fn native(&self) -> Option<&NativeError> {
        match self {
            Self::CodecInit(e) | Self::Decode(e) | Self::Encode(e) | Self::Control(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true for operations on a destroyed or unknown session.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState)
    }
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Converts a negative native status into a typed error.
///
/// The operation picks the taxonomy variant; control calls all land in
/// [`Error::Control`].
pub fn map_native_error(op: Operation, code: i32) -> Error {
    let err = NativeError::new(op, code);
    match op {
        Operation::Create => Error::CodecInit(err),
        Operation::Decode => Error::Decode(err),
        Operation::Encode => Error::Encode(err),
        Operation::SetBitrate
        | Operation::GetBitrate
        | Operation::SetSignal
        | Operation::GetLastPacketDuration => Error::Control(err),
    }
}

/// Passes a non-negative status through and maps a negative one.
pub(crate) fn check(op: Operation, status: i32) -> Result<i32> {
    if status < 0 {
        Err(map_native_error(op, status))
    } else {
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_code() {
        assert_eq!(ErrorKind::from_code(-1), ErrorKind::BadArg);
        assert_eq!(ErrorKind::from_code(-2), ErrorKind::BufferTooSmall);
        assert_eq!(ErrorKind::from_code(-3), ErrorKind::InternalError);
        assert_eq!(ErrorKind::from_code(-4), ErrorKind::InvalidPacket);
        assert_eq!(ErrorKind::from_code(-5), ErrorKind::Unimplemented);
        assert_eq!(ErrorKind::from_code(-6), ErrorKind::InvalidState);
        assert_eq!(ErrorKind::from_code(-7), ErrorKind::AllocFail);
        assert_eq!(ErrorKind::from_code(-42), ErrorKind::Unknown(-42));
        assert_eq!(ErrorKind::Unknown(-42).as_str(), "unknown");
    }

    #[test]
    fn test_map_keeps_context() {
        let err = map_native_error(Operation::Decode, ffi::OPUS_INVALID_PACKET);
        assert!(matches!(err, Error::Decode(_)));
        let native = err.native().unwrap();
        assert_eq!(native.op, Operation::Decode);
        assert_eq!(native.kind, ErrorKind::InvalidPacket);
        assert_eq!(native.code, -4);

        assert!(matches!(
            map_native_error(Operation::Create, ffi::OPUS_ALLOC_FAIL),
            Error::CodecInit(_)
        ));
        assert!(matches!(
            map_native_error(Operation::Encode, ffi::OPUS_BUFFER_TOO_SMALL),
            Error::Encode(_)
        ));
        for op in [
            Operation::SetBitrate,
            Operation::GetBitrate,
            Operation::SetSignal,
            Operation::GetLastPacketDuration,
        ] {
            assert!(matches!(map_native_error(op, ffi::OPUS_BAD_ARG), Error::Control(_)));
        }
    }

    #[test]
    fn test_check() {
        assert_eq!(check(Operation::Encode, 17).unwrap(), 17);
        assert_eq!(check(Operation::Encode, 0).unwrap(), 0);
        assert!(check(Operation::Encode, -3).is_err());
    }

    #[test]
    fn test_error_display() {
        let err = map_native_error(Operation::SetBitrate, ffi::OPUS_BAD_ARG);
        let msg = format!("{}", err);
        assert!(msg.contains("control call failed"));
        assert!(msg.contains("set_bitrate"));

        let err = Error::invalid_argument("sample_rate", "must be one of 8000, 12000, 16000, 24000, or 48000");
        assert!(format!("{}", err).contains("sample_rate"));

        assert!(format!("{}", Error::InvalidState).contains("destroyed"));
        assert!(Error::InvalidState.is_invalid_state());
        assert!(Error::InvalidState.native().is_none());
    }
}

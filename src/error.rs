//! The `Connection`-level error surface, matching the split already present
//! between `packing::error` and the earlier
//! `connectivity::connection::ConnectionError`/`client::error::ClientError`
//! generations: leaf codec errors stay hand-rolled enums, the orchestrator's
//! error type is `thiserror`-derived. Foreign leaf errors are converted to
//! owned strings/`ErrorKind` by hand rather than wrapped via `#[from]`,
//! since `io::Error` isn't `Clone` and this type must be.

use thiserror::Error;

use crate::chunk::ChunkError;
use crate::packing::error::{PackError, UnpackError};

#[derive(Debug, Error, Clone)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    IOError(std::io::ErrorKind),

    #[error("Malformed chunk framing: {0}")]
    ChunkError(String),

    #[error("Cannot pack message: {0}")]
    PackError(String),

    #[error("Cannot unpack message: {0}")]
    UnpackError(String),

    #[error("Unexpected Bolt protocol version negotiated by server: {0:#010x}")]
    UnknownProtocolVersion(u32),

    #[error(
        "Server replied with the HTTP preamble; this looks like the HTTP endpoint \
         (usually port 7474) rather than the Bolt endpoint (usually port 7687)"
    )]
    HttpMisdial,

    #[error("Unexpected response signature {0:#04x}")]
    UnexpectedSignature(u8),

    #[error("Server failure '{code}': {message}")]
    ServerFailure { code: String, message: String },

    #[error("Request ignored because a prior failure is still being handled")]
    IgnoredFailure,

    #[error("Connection is broken and can no longer be used")]
    Broken,
}

impl From<std::io::Error> for ConnectionError {
    fn from(input: std::io::Error) -> ConnectionError {
        ConnectionError::IOError(input.kind())
    }
}

impl From<ChunkError> for ConnectionError {
    fn from(input: ChunkError) -> ConnectionError {
        ConnectionError::ChunkError(input.to_string())
    }
}

impl From<PackError> for ConnectionError {
    fn from(input: PackError) -> ConnectionError {
        ConnectionError::PackError(input.to_string())
    }
}

impl From<UnpackError> for ConnectionError {
    fn from(input: UnpackError) -> ConnectionError {
        ConnectionError::UnpackError(input.to_string())
    }
}

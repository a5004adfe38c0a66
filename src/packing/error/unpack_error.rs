use crate::packing::error::BoltReadMarkerError;
use crate::packing::ll::UnknownMarkerError;
use std::{fmt, io, string};

#[derive(Debug)]
pub enum UnpackError {
    ReadIOError(io::Error),
    MarkerReadError(BoltReadMarkerError),
    UnexpectedSignatureSize(u8, u8),
    InvalidUtf8(string::FromUtf8Error),
    UnboundRelationshipInPath { index: i64, path_len: usize },
    NodeIndexOutOfRange { index: usize, node_count: usize },
    WrongFieldCount { structure: &'static str, expected: usize, actual: usize },
    UnexpectedValueType { structure: &'static str, expected: &'static str },
}

impl fmt::Display for UnpackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnpackError::ReadIOError(e) => write!(f, "IO error while reading: {}", e),
            UnpackError::MarkerReadError(e) => write!(f, "Marker read error: {}", e),
            UnpackError::UnexpectedSignatureSize(exp, act) => write!(
                f,
                "Unexpected signature size. Expected: {}, actual: {}",
                exp, act
            ),
            UnpackError::InvalidUtf8(e) => write!(f, "Invalid utf8 in packed string: {}", e),
            UnpackError::UnboundRelationshipInPath { index, path_len } => write!(
                f,
                "Path relationship index {} out of range for {} unbound relationships",
                index, path_len
            ),
            UnpackError::NodeIndexOutOfRange { index, node_count } => write!(
                f,
                "Path node index {} out of range for {} nodes",
                index, node_count
            ),
            UnpackError::WrongFieldCount { structure, expected, actual } => write!(
                f,
                "Structure '{}' expected {} fields, got {}",
                structure, expected, actual
            ),
            UnpackError::UnexpectedValueType { structure, expected } => write!(
                f,
                "Structure '{}' expected a field of type {}",
                structure, expected
            ),
        }
    }
}

impl std::error::Error for UnpackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UnpackError::ReadIOError(e) => Some(e),
            UnpackError::MarkerReadError(e) => Some(e),
            UnpackError::InvalidUtf8(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for UnpackError {
    fn from(input: io::Error) -> UnpackError {
        UnpackError::ReadIOError(input)
    }
}

impl From<BoltReadMarkerError> for UnpackError {
    fn from(input: BoltReadMarkerError) -> UnpackError {
        UnpackError::MarkerReadError(input)
    }
}

impl From<string::FromUtf8Error> for UnpackError {
    fn from(input: string::FromUtf8Error) -> UnpackError {
        UnpackError::InvalidUtf8(input)
    }
}

impl From<UnknownMarkerError> for UnpackError {
    fn from(input: UnknownMarkerError) -> UnpackError {
        UnpackError::MarkerReadError(BoltReadMarkerError::MarkerParseError(input))
    }
}

use std::{fmt, io};

#[derive(Debug)]
pub enum PackError {
    WriteIOError(io::Error),
    GenericTooLarge(&'static str),
    GenericSizeConversionError(&'static str),
    ByteArraysDisabled,
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackError::WriteIOError(e) => write!(f, "IO Error while writing: {}", e),
            PackError::GenericTooLarge(s) => write!(f, "Generic '{}' too large", s),
            PackError::GenericSizeConversionError(s) => {
                write!(f, "Error while converting size of generic '{}'", s)
            }
            PackError::ByteArraysDisabled => write!(
                f,
                "cannot pack a byte array, server does not support byte arrays (< 3.2.0)"
            ),
        }
    }
}

impl std::error::Error for PackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PackError::WriteIOError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PackError {
    fn from(input: io::Error) -> PackError {
        PackError::WriteIOError(input)
    }
}

use std::convert::TryFrom;
use std::fmt;

use crate::packing::ll::{combine_nibble, high_nibble, low_nibble};

#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
/// Type to have all marker bytes in one place. This is represented
/// as `u8` and can be used via `MarkerByte::TinyString as u8`. Converting from
/// `u8` to `MarkerByte` might fail, since not every possible value of `u8` corresponds
/// to a `MarkerByte`, but a `TryFrom<u8>` implementation is given.
pub enum MarkerByte {
    // tiny:
    PlusTinyInt = 0x00,
    // 1 to 127 (up to 0x7F)
    MinusTinyInt = 0xF0,
    // -1 to -16
    TinyString = 0x80,
    TinyList = 0x90,
    TinyMap = 0xA0,
    TinyStruct = 0xB0,

    // primitives:
    Null = 0xC0,
    BoolFalse = 0xC2,
    BoolTrue = 0xC3,

    // numbers:
    Float64 = 0xC1,
    Int8 = 0xC8,
    Int16 = 0xC9,
    Int32 = 0xCA,
    Int64 = 0xCB,

    // byte arrays:
    ByteArray8 = 0xCC,
    ByteArray16 = 0xCD,
    ByteArray32 = 0xCE,

    // strings:
    String8 = 0xD0,
    String16 = 0xD1,
    String32 = 0xD2,

    // lists:
    List8 = 0xD4,
    List16 = 0xD5,
    List32 = 0xD6,

    // maps:
    Map8 = 0xD8,
    Map16 = 0xD9,
    Map32 = 0xDA,

    // structs:
    Struct8 = 0xDC,
    Struct16 = 0xDD,
}

#[derive(Debug)]
/// Error type in case of an unknown marker while
/// converting from a mere `u8`.
pub struct UnknownMarkerError {
    pub read_byte: u8,
}

impl fmt::Display for UnknownMarkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown marker byte {:#04x}", self.read_byte)
    }
}

impl std::error::Error for UnknownMarkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// Implementation to convert from a mere `u8` into a valid,
/// known bolt protocol marker. For Tiny Types, this is done
/// by looking at the high nibble of the byte. The special case of
/// `PlusTinyInt` excepts any number `0 <= n <= 0x7F`.
/// ```
/// use raio::packing::ll::*;
/// use std::convert::TryFrom;
///
/// // there is no 0xCF marker:
/// assert!(MarkerByte::try_from(0xCF).is_err());
///
/// // but any number `<= 0x7F` is read as `MarkerByte::PlusTinyInt`:
/// assert_eq!(MarkerByte::try_from(0x7F).unwrap(), MarkerByte::PlusTinyInt);
///
/// // and tiny types are only converted by looking at the high nibble:
/// assert_eq!(MarkerByte::try_from(0x83).unwrap(), MarkerByte::TinyString);
/// ```
impl TryFrom<u8> for MarkerByte {
    type Error = UnknownMarkerError;
    fn try_from(input: u8) -> Result<MarkerByte, Self::Error> {
        // ----- SPECIAL ------
        // Tiny Int Plus is just the number:
        if input <= 0x7F {
            return Ok(MarkerByte::PlusTinyInt);
        }

        // now, look for the exact matches:
        match input {
            0xC0 => Ok(MarkerByte::Null),
            0xC2 => Ok(MarkerByte::BoolFalse),
            0xC3 => Ok(MarkerByte::BoolTrue),

            0xC1 => Ok(MarkerByte::Float64),
            0xC8 => Ok(MarkerByte::Int8),
            0xC9 => Ok(MarkerByte::Int16),
            0xCA => Ok(MarkerByte::Int32),
            0xCB => Ok(MarkerByte::Int64),

            0xCC => Ok(MarkerByte::ByteArray8),
            0xCD => Ok(MarkerByte::ByteArray16),
            0xCE => Ok(MarkerByte::ByteArray32),

            0xD0 => Ok(MarkerByte::String8),
            0xD1 => Ok(MarkerByte::String16),
            0xD2 => Ok(MarkerByte::String32),

            0xD4 => Ok(MarkerByte::List8),
            0xD5 => Ok(MarkerByte::List16),
            0xD6 => Ok(MarkerByte::List32),

            0xD8 => Ok(MarkerByte::Map8),
            0xD9 => Ok(MarkerByte::Map16),
            0xDA => Ok(MarkerByte::Map32),

            0xDC => Ok(MarkerByte::Struct8),
            0xDD => Ok(MarkerByte::Struct16),

            // no exact matches, this still leaves the chance
            // for a high_nibble match (i.e. tiny marker with size)
            _ => from_high_nibble(input),
        }
    }
}

/// Internal function to get the marker by high nibble in case
/// of the tiny types (expect `MarkerByte::PlusTinyInt`).
fn from_high_nibble(input: u8) -> Result<MarkerByte, UnknownMarkerError> {
    // Tiny Int Minus is with higher nibble 0xF
    let high = high_nibble(input);
    match high {
        0x90 => Ok(MarkerByte::TinyList),
        0xA0 => Ok(MarkerByte::TinyMap),
        0x80 => Ok(MarkerByte::TinyString),
        0xB0 => Ok(MarkerByte::TinyStruct),
        0xF0 => Ok(MarkerByte::MinusTinyInt),
        _ => Err(UnknownMarkerError { read_byte: input }),
    }
}

impl MarkerByte {
    /// Writes this marker out as its plain byte value.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Some header bytes are marker as well as size information in one byte,
/// where the high nibble of the byte stands for the marker and the low nibble
/// is an encoded size information. This type represents this kind of
/// marker.
/// ```
/// use raio::packing::ll::*;
///
/// let ts_marker = TinySizeMarker::new(MarkerByte::TinyString, 14);
/// let byte = ts_marker.as_byte();
///
/// // and read its data back as a plain `MarkerByte`:
/// let marker = MarkerByte::try_from(byte).unwrap();
/// assert_eq!(MarkerByte::TinyString, marker);
///
/// // as well as a `TinySizeMarker`:
/// let ts_marker = TinySizeMarker::from_byte(byte).unwrap();
/// assert_eq!(MarkerByte::TinyString, ts_marker.marker);
/// assert_eq!(14, ts_marker.tiny_size);
///
/// use std::convert::TryFrom;
/// ```
///
/// # Guarantees
/// It is guaranteed that `tiny_size` is `<= 15`, since the size part is read out of the low nibble
/// of the byte, hence the range is from `0x00` to `0x0F`.
///
/// It is **not** guaranteed that the read marker is any `TinyFoo` marker. But therefore it is always
/// possible to read out a `TinySizeMarker` where any `MarkerByte` was written before.
/// ```
/// use raio::packing::ll::*;
///
/// // `MarkerByte::String8` is not a `Tiny` marker, but still round-trips:
/// let byte = MarkerByte::String8.as_byte();
/// let s8_tiny = TinySizeMarker::from_byte(byte).unwrap();
/// assert_eq!(s8_tiny, TinySizeMarker { marker: MarkerByte::String8, tiny_size: 0 });
/// ```
pub struct TinySizeMarker {
    pub marker: MarkerByte,
    pub tiny_size: u8,
}

impl TinySizeMarker {
    pub fn new(marker: MarkerByte, tiny_size: u8) -> TinySizeMarker {
        TinySizeMarker { marker, tiny_size }
    }

    /// Encodes marker and size into a single byte.
    pub fn as_byte(self) -> u8 {
        combine_nibble(self.marker as u8, self.tiny_size)
    }

    /// Decodes a single byte into its marker and tiny-size parts.
    pub fn from_byte(byte: u8) -> Result<TinySizeMarker, UnknownMarkerError> {
        let marker = MarkerByte::try_from(byte)?;
        Ok(TinySizeMarker {
            marker,
            tiny_size: low_nibble(byte),
        })
    }
}

impl From<TinySizeMarker> for u8 {
    fn from(input: TinySizeMarker) -> u8 {
        combine_nibble(input.marker as u8, input.tiny_size)
    }
}

impl From<TinySizeMarker> for MarkerByte {
    fn from(input: TinySizeMarker) -> MarkerByte {
        input.marker
    }
}

impl TryFrom<u8> for TinySizeMarker {
    type Error = UnknownMarkerError;
    fn try_from(input: u8) -> Result<Self, Self::Error> {
        TinySizeMarker::from_byte(input)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plus_tiny_int_covers_0_to_7f() {
        assert_eq!(MarkerByte::try_from(0x00).unwrap(), MarkerByte::PlusTinyInt);
        assert_eq!(MarkerByte::try_from(0x7F).unwrap(), MarkerByte::PlusTinyInt);
    }

    #[test]
    fn tiny_family_by_high_nibble() {
        assert_eq!(MarkerByte::try_from(0x8C).unwrap(), MarkerByte::TinyString);
        assert_eq!(MarkerByte::try_from(0x9C).unwrap(), MarkerByte::TinyList);
        assert_eq!(MarkerByte::try_from(0xAC).unwrap(), MarkerByte::TinyMap);
        assert_eq!(MarkerByte::try_from(0xBC).unwrap(), MarkerByte::TinyStruct);
        assert_eq!(MarkerByte::try_from(0xFC).unwrap(), MarkerByte::MinusTinyInt);
    }

    #[test]
    fn byte_array_markers() {
        assert_eq!(MarkerByte::try_from(0xCC).unwrap(), MarkerByte::ByteArray8);
        assert_eq!(MarkerByte::try_from(0xCD).unwrap(), MarkerByte::ByteArray16);
        assert_eq!(MarkerByte::try_from(0xCE).unwrap(), MarkerByte::ByteArray32);
    }

    #[test]
    fn unknown_marker_errors() {
        assert!(MarkerByte::try_from(0xC4).is_err());
        assert!(MarkerByte::try_from(0xCF).is_err());
    }

    #[test]
    fn tiny_size_marker_round_trip() {
        let marker = TinySizeMarker::new(MarkerByte::TinyMap, 9);
        let byte = marker.as_byte();
        let read = TinySizeMarker::from_byte(byte).unwrap();
        assert_eq!(read.marker, MarkerByte::TinyMap);
        assert_eq!(read.tiny_size, 9);
    }
}

use std::collections::HashMap;
use std::convert::TryFrom;
use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::packing::error::{PackError, UnpackError};
use crate::packing::ll::{MarkerByte, Signature, TinySizeMarker};
use crate::packing::structs::{Node, Path, Relationship, UnboundRelationship};
use crate::packing::{Packable, Unpackable};

#[derive(Debug, PartialEq, Clone)]
/// A tagged variant over every value PackStream can carry, plus the four
/// domain structures hydrated from it by a registered structure mapper.
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    ByteArray(Vec<u8>),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    Node(Node),
    Relationship(Relationship),
    UnboundRelationship(UnboundRelationship),
    Path(Path),
    /// A structure whose signature has no registered mapper. Carried through
    /// without raising, as prescribed for unknown structure signatures.
    Structure { signature: u8, fields: Vec<Value> },
}

#[derive(Debug)]
pub enum ValueConversionError {
    WrongValueError(Value, &'static str),
}

macro_rules! embedded_types {
    ($($v:ident : $e:expr => $t:ty);+ $(;)?) => {
        $(impl<'a> TryFrom<&'a Value> for &'a $t {
            type Error = ValueConversionError;
            fn try_from(value: &'a Value) -> Result<Self, Self::Error> {
                match value {
                    Value::$v(i) => Ok(i),
                    _ => Err(ValueConversionError::WrongValueError(value.clone(), $e)),
                }
            }
        }

        impl TryFrom<Value> for $t {
            type Error = ValueConversionError;
            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    Value::$v(i) => Ok(i),
                    _ => Err(ValueConversionError::WrongValueError(value.clone(), $e)),
                }
            }
        }

        impl From<$t> for Value {
            fn from(input: $t) -> Value {
                Value::$v(input)
            }
        })+
    };
}

embedded_types! {
    Integer : "Integer" => i64;
    String  : "String"  => String;
    Float   : "Float"   => f64;
    Boolean : "Boolean" => bool;
    ByteArray : "ByteArray" => Vec<u8>;
    Map     : "Map"     => HashMap<String, Value>;
    List    : "List"    => Vec<Value>;
    Node    : "Node"    => Node;
    Relationship : "Relationship" => Relationship;
    UnboundRelationship : "UnboundRelationship" => UnboundRelationship;
    Path : "Path" => Path;
}

/// `Some(x)` packs as `x`; `None` packs as `Value::Null`.
impl<T> From<Option<T>> for Value
where
    Value: From<T>,
{
    fn from(input: Option<T>) -> Self {
        match input {
            Some(x) => Value::from(x),
            None => Value::Null,
        }
    }
}

impl From<&str> for Value {
    fn from(input: &str) -> Self {
        Value::String(input.to_string())
    }
}

impl From<i32> for Value {
    fn from(input: i32) -> Self {
        Value::Integer(i64::from(input))
    }
}

impl<V> From<Vec<V>> for Value
where
    Value: From<V>,
{
    fn from(input: Vec<V>) -> Self {
        Value::List(input.into_iter().map(Value::from).collect())
    }
}

// ---- size-tagged container helpers -----------------------------------

fn write_sized_header<T: Write>(
    buf: &mut T,
    tiny: MarkerByte,
    m8: MarkerByte,
    m16: MarkerByte,
    m32: MarkerByte,
    len: usize,
    what: &'static str,
) -> Result<usize, PackError> {
    if len <= 15 {
        buf.write_u8(TinySizeMarker::new(tiny, len as u8).as_byte())?;
        Ok(1)
    } else if len <= u8::MAX as usize {
        buf.write_u8(m8 as u8)?;
        buf.write_u8(len as u8)?;
        Ok(2)
    } else if len <= u16::MAX as usize {
        buf.write_u8(m16 as u8)?;
        buf.write_u16::<BigEndian>(len as u16)?;
        Ok(3)
    } else if len <= u32::MAX as usize {
        buf.write_u8(m32 as u8)?;
        buf.write_u32::<BigEndian>(len as u32)?;
        Ok(5)
    } else {
        Err(PackError::GenericTooLarge(what))
    }
}

pub fn pack_string<T: Write>(buf: &mut T, s: &str) -> Result<usize, PackError> {
    let bytes = s.as_bytes();
    let mut written = write_sized_header(
        buf,
        MarkerByte::TinyString,
        MarkerByte::String8,
        MarkerByte::String16,
        MarkerByte::String32,
        bytes.len(),
        "String",
    )?;
    buf.write_all(bytes)?;
    written += bytes.len();
    Ok(written)
}

fn pack_byte_array<T: Write>(buf: &mut T, bytes: &[u8]) -> Result<usize, PackError> {
    let len = bytes.len();
    let mut written = if len <= u8::MAX as usize {
        buf.write_u8(MarkerByte::ByteArray8 as u8)?;
        buf.write_u8(len as u8)?;
        2
    } else if len <= u16::MAX as usize {
        buf.write_u8(MarkerByte::ByteArray16 as u8)?;
        buf.write_u16::<BigEndian>(len as u16)?;
        3
    } else if len <= u32::MAX as usize {
        buf.write_u8(MarkerByte::ByteArray32 as u8)?;
        buf.write_u32::<BigEndian>(len as u32)?;
        5
    } else {
        return Err(PackError::GenericTooLarge("ByteArray"));
    };
    buf.write_all(bytes)?;
    written += bytes.len();
    Ok(written)
}

fn pack_integer<T: Write>(buf: &mut T, i: i64) -> Result<usize, PackError> {
    if (0..=0x7F).contains(&i) {
        buf.write_u8(i as u8)?;
        Ok(1)
    } else if (-16..0).contains(&i) {
        buf.write_u8(i as i8 as u8)?;
        Ok(1)
    } else if let Ok(i8v) = i8::try_from(i) {
        buf.write_u8(MarkerByte::Int8 as u8)?;
        buf.write_i8(i8v)?;
        Ok(2)
    } else if let Ok(i16v) = i16::try_from(i) {
        buf.write_u8(MarkerByte::Int16 as u8)?;
        buf.write_i16::<BigEndian>(i16v)?;
        Ok(3)
    } else if let Ok(i32v) = i32::try_from(i) {
        buf.write_u8(MarkerByte::Int32 as u8)?;
        buf.write_i32::<BigEndian>(i32v)?;
        Ok(5)
    } else {
        buf.write_u8(MarkerByte::Int64 as u8)?;
        buf.write_i64::<BigEndian>(i)?;
        Ok(9)
    }
}

impl Packable for Value {
    fn pack_to<T: Write>(&self, buf: &mut T) -> Result<usize, PackError> {
        match self {
            Value::Null => {
                buf.write_u8(MarkerByte::Null as u8)?;
                Ok(1)
            }
            Value::Boolean(true) => {
                buf.write_u8(MarkerByte::BoolTrue as u8)?;
                Ok(1)
            }
            Value::Boolean(false) => {
                buf.write_u8(MarkerByte::BoolFalse as u8)?;
                Ok(1)
            }
            Value::Integer(i) => pack_integer(buf, *i),
            Value::Float(f) => {
                buf.write_u8(MarkerByte::Float64 as u8)?;
                buf.write_f64::<BigEndian>(*f)?;
                Ok(9)
            }
            Value::String(s) => pack_string(buf, s),
            Value::ByteArray(bytes) => pack_byte_array(buf, bytes),
            Value::List(items) => {
                let mut written = write_sized_header(
                    buf,
                    MarkerByte::TinyList,
                    MarkerByte::List8,
                    MarkerByte::List16,
                    MarkerByte::List32,
                    items.len(),
                    "List",
                )?;
                for item in items {
                    written += item.pack_to(buf)?;
                }
                Ok(written)
            }
            Value::Map(entries) => {
                let mut written = write_sized_header(
                    buf,
                    MarkerByte::TinyMap,
                    MarkerByte::Map8,
                    MarkerByte::Map16,
                    MarkerByte::Map32,
                    entries.len(),
                    "Map",
                )?;
                for (k, v) in entries {
                    written += pack_string(buf, k)?;
                    written += v.pack_to(buf)?;
                }
                Ok(written)
            }
            Value::Node(n) => n.pack_to(buf),
            Value::Relationship(r) => r.pack_to(buf),
            Value::UnboundRelationship(ur) => ur.pack_to(buf),
            Value::Path(p) => p.pack_to(buf),
            Value::Structure { signature, fields } => {
                let mut written = buf.write(&[TinySizeMarker::new(
                    MarkerByte::TinyStruct,
                    fields.len() as u8,
                )
                .as_byte()])?;
                written += buf.write(&[*signature])?;
                for field in fields {
                    written += field.pack_to(buf)?;
                }
                Ok(written)
            }
        }
    }
}

pub fn unpack_string<T: Read>(buf: &mut T) -> Result<String, UnpackError> {
    let m_byte = buf.read_u8()?;
    let m = TinySizeMarker::from_byte(m_byte)?;
    let len = match m.marker {
        MarkerByte::TinyString => m.tiny_size as usize,
        MarkerByte::String8 => buf.read_u8()? as usize,
        MarkerByte::String16 => buf.read_u16::<BigEndian>()? as usize,
        MarkerByte::String32 => buf.read_u32::<BigEndian>()? as usize,
        _ => {
            return Err(UnpackError::UnexpectedSignatureSize(
                MarkerByte::TinyString as u8,
                m_byte,
            ))
        }
    };
    let mut bytes = vec![0u8; len];
    buf.read_exact(&mut bytes)?;
    Ok(String::from_utf8(bytes)?)
}

impl Unpackable for Value {
    fn unpack_from<T: Read>(buf: &mut T) -> Result<Self, UnpackError> {
        let m_byte = buf.read_u8()?;
        let m = TinySizeMarker::from_byte(m_byte)?;

        match m.marker {
            MarkerByte::Null => Ok(Value::Null),
            MarkerByte::BoolFalse => Ok(Value::Boolean(false)),
            MarkerByte::BoolTrue => Ok(Value::Boolean(true)),

            MarkerByte::PlusTinyInt => Ok(Value::Integer(i64::from(m_byte))),
            MarkerByte::MinusTinyInt => Ok(Value::Integer(i64::from(m_byte as i8))),
            MarkerByte::Int8 => Ok(Value::Integer(i64::from(buf.read_i8()?))),
            MarkerByte::Int16 => Ok(Value::Integer(i64::from(buf.read_i16::<BigEndian>()?))),
            MarkerByte::Int32 => Ok(Value::Integer(i64::from(buf.read_i32::<BigEndian>()?))),
            MarkerByte::Int64 => Ok(Value::Integer(buf.read_i64::<BigEndian>()?)),
            MarkerByte::Float64 => Ok(Value::Float(buf.read_f64::<BigEndian>()?)),

            MarkerByte::TinyString => Ok(Value::String(read_string_body(m.tiny_size as usize, buf)?)),
            MarkerByte::String8 => {
                let len = buf.read_u8()? as usize;
                Ok(Value::String(read_string_body(len, buf)?))
            }
            MarkerByte::String16 => {
                let len = buf.read_u16::<BigEndian>()? as usize;
                Ok(Value::String(read_string_body(len, buf)?))
            }
            MarkerByte::String32 => {
                let len = buf.read_u32::<BigEndian>()? as usize;
                Ok(Value::String(read_string_body(len, buf)?))
            }

            MarkerByte::ByteArray8 => {
                let len = buf.read_u8()? as usize;
                Ok(Value::ByteArray(read_bytes_body(len, buf)?))
            }
            MarkerByte::ByteArray16 => {
                let len = buf.read_u16::<BigEndian>()? as usize;
                Ok(Value::ByteArray(read_bytes_body(len, buf)?))
            }
            MarkerByte::ByteArray32 => {
                let len = buf.read_u32::<BigEndian>()? as usize;
                Ok(Value::ByteArray(read_bytes_body(len, buf)?))
            }

            MarkerByte::TinyList => Ok(Value::List(read_list_body(m.tiny_size as usize, buf)?)),
            MarkerByte::List8 => {
                let len = buf.read_u8()? as usize;
                Ok(Value::List(read_list_body(len, buf)?))
            }
            MarkerByte::List16 => {
                let len = buf.read_u16::<BigEndian>()? as usize;
                Ok(Value::List(read_list_body(len, buf)?))
            }
            MarkerByte::List32 => {
                let len = buf.read_u32::<BigEndian>()? as usize;
                Ok(Value::List(read_list_body(len, buf)?))
            }

            MarkerByte::TinyMap => Ok(Value::Map(read_map_body(m.tiny_size as usize, buf)?)),
            MarkerByte::Map8 => {
                let len = buf.read_u8()? as usize;
                Ok(Value::Map(read_map_body(len, buf)?))
            }
            MarkerByte::Map16 => {
                let len = buf.read_u16::<BigEndian>()? as usize;
                Ok(Value::Map(read_map_body(len, buf)?))
            }
            MarkerByte::Map32 => {
                let len = buf.read_u32::<BigEndian>()? as usize;
                Ok(Value::Map(read_map_body(len, buf)?))
            }

            MarkerByte::TinyStruct => {
                let sig_byte = buf.read_u8()?;
                let fields = read_list_body(m.tiny_size as usize, buf)?;
                match Signature::try_from(sig_byte) {
                    Ok(Signature::Node) => Ok(Value::Node(Node::from_fields(fields)?)),
                    Ok(Signature::Relationship) => {
                        Ok(Value::Relationship(Relationship::from_fields(fields)?))
                    }
                    Ok(Signature::UnboundRelationship) => Ok(Value::UnboundRelationship(
                        UnboundRelationship::from_fields(fields)?,
                    )),
                    Ok(Signature::Path) => Ok(Value::Path(Path::from_fields(fields)?)),
                    _ => Ok(Value::Structure {
                        signature: sig_byte,
                        fields,
                    }),
                }
            }

            MarkerByte::Struct8 | MarkerByte::Struct16 => {
                let size = if m.marker == MarkerByte::Struct8 {
                    buf.read_u8()? as usize
                } else {
                    buf.read_u16::<BigEndian>()? as usize
                };
                let sig_byte = buf.read_u8()?;
                let fields = read_list_body(size, buf)?;
                Ok(Value::Structure {
                    signature: sig_byte,
                    fields,
                })
            }
        }
    }
}

fn read_string_body<T: Read>(len: usize, buf: &mut T) -> Result<String, UnpackError> {
    let mut bytes = vec![0u8; len];
    buf.read_exact(&mut bytes)?;
    Ok(String::from_utf8(bytes)?)
}

fn read_bytes_body<T: Read>(len: usize, buf: &mut T) -> Result<Vec<u8>, UnpackError> {
    let mut bytes = vec![0u8; len];
    buf.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn read_list_body<T: Read>(len: usize, buf: &mut T) -> Result<Vec<Value>, UnpackError> {
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        items.push(Value::unpack_from(buf)?);
    }
    Ok(items)
}

fn read_map_body<T: Read>(len: usize, buf: &mut T) -> Result<HashMap<String, Value>, UnpackError> {
    let mut entries = HashMap::with_capacity(len);
    for _ in 0..len {
        let k = unpack_string(buf)?;
        let v = Value::unpack_from(buf)?;
        entries.insert(k, v);
    }
    Ok(entries)
}

/// Convenience constructor for a `HashMap<String, Value>`, mirroring the
/// `.insert_value`/`.get_value` ergonomics of the earlier `ValueMap` wrapper
/// without keeping the wrapper type itself around.
pub fn value_map() -> HashMap<String, Value> {
    HashMap::new()
}

#[derive(Default)]
/// Gates byte-array serialization and writes `Value`s to an output sink.
/// Mirrors the Connection's byte-array gating: once a server older than
/// 3.2.0 has been observed, `disable_byte_arrays` is called and any further
/// attempt to pack a `Value::ByteArray` fails instead of writing bytes.
pub struct Packer {
    byte_arrays_disabled: bool,
}

impl Packer {
    pub fn new() -> Packer {
        Packer {
            byte_arrays_disabled: false,
        }
    }

    pub fn disable_byte_arrays(&mut self) {
        self.byte_arrays_disabled = true;
    }

    pub fn pack<T: Write>(&self, value: &Value, buf: &mut T) -> Result<usize, PackError> {
        if self.byte_arrays_disabled && contains_byte_array(value) {
            return Err(PackError::ByteArraysDisabled);
        }
        value.pack_to(buf)
    }
}

fn contains_byte_array(value: &Value) -> bool {
    match value {
        Value::ByteArray(_) => true,
        Value::List(items) => items.iter().any(contains_byte_array),
        Value::Map(entries) => entries.values().any(contains_byte_array),
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plus_tiny_int_roundtrip() {
        let mut bytes = Vec::new();
        Value::Integer(42).pack_to(&mut bytes).unwrap();
        assert_eq!(bytes, vec![42]);
        assert_eq!(Value::unpack_from(&mut bytes.as_slice()).unwrap(), Value::Integer(42));
    }

    #[test]
    fn minus_tiny_int_roundtrip() {
        let mut bytes = Vec::new();
        Value::Integer(-1).pack_to(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0xFF]);

        let mut bytes16 = Vec::new();
        Value::Integer(-16).pack_to(&mut bytes16).unwrap();
        assert_eq!(bytes16, vec![0xF0]);

        assert_eq!(
            Value::unpack_from(&mut bytes.as_slice()).unwrap(),
            Value::Integer(-1)
        );
        assert_eq!(
            Value::unpack_from(&mut bytes16.as_slice()).unwrap(),
            Value::Integer(-16)
        );
    }

    #[test]
    fn int32_roundtrip() {
        let mut bytes = Vec::new();
        Value::Integer(70_000).pack_to(&mut bytes).unwrap();
        assert_eq!(bytes[0], MarkerByte::Int32 as u8);
        assert_eq!(
            Value::unpack_from(&mut bytes.as_slice()).unwrap(),
            Value::Integer(70_000)
        );
    }

    #[test]
    fn tiny_string_hex() {
        let mut bytes = Vec::new();
        Value::String("abc".to_string()).pack_to(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0x83, b'a', b'b', b'c']);
    }

    #[test]
    fn list_roundtrip() {
        let v = Value::List(vec![Value::Integer(1), Value::Boolean(true), Value::Null]);
        let mut bytes = Vec::new();
        v.pack_to(&mut bytes).unwrap();
        assert_eq!(Value::unpack_from(&mut bytes.as_slice()).unwrap(), v);
    }

    #[test]
    fn map_roundtrip() {
        let mut m = HashMap::new();
        m.insert("name".to_string(), Value::String("neo4j".to_string()));
        let v = Value::Map(m);
        let mut bytes = Vec::new();
        v.pack_to(&mut bytes).unwrap();
        assert_eq!(Value::unpack_from(&mut bytes.as_slice()).unwrap(), v);
    }

    #[test]
    fn byte_array_gating() {
        let mut packer = Packer::new();
        let v = Value::ByteArray(vec![1, 2, 3]);
        let mut bytes = Vec::new();
        assert!(packer.pack(&v, &mut bytes).is_ok());

        packer.disable_byte_arrays();
        let mut bytes2 = Vec::new();
        assert!(packer.pack(&v, &mut bytes2).is_err());
        assert!(bytes2.is_empty());
    }

    #[test]
    fn unknown_structure_passes_through() {
        let v = Value::Structure {
            signature: 0x99,
            fields: vec![Value::Integer(1)],
        };
        let mut bytes = Vec::new();
        v.pack_to(&mut bytes).unwrap();
        assert_eq!(Value::unpack_from(&mut bytes.as_slice()).unwrap(), v);
    }
}

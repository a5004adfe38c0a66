//! Message envelope pack/unpack: the `(signature, fields)` structures the
//! wire protocol uses for requests and responses, layered on top of the raw
//! PackStream `Value`/`Packable`/`Unpackable` machinery. Replaces the
//! earlier generation's generic `MessageWrite`/`MessageRead` traits, which
//! assumed one chunk per message; framing across chunk boundaries is now
//! the `Chunker`/`Dechunker`'s job, so a message here is just its already
//! reassembled payload bytes.

use std::collections::HashMap;
use std::convert::TryFrom;
use std::io::Write;

use crate::packing::error::{PackError, UnpackError};
use crate::packing::ll::{MarkerByte, Signature, TinySizeMarker};
use crate::packing::{Packable, Packer, Unpackable, Value};

fn pack_message<T: Write>(
    buf: &mut T,
    packer: &Packer,
    signature: Signature,
    fields: &[Value],
) -> Result<usize, PackError> {
    let mut written = buf
        .write(&[TinySizeMarker::new(MarkerByte::TinyStruct, fields.len() as u8).as_byte()])?;
    written += buf.write(&[signature as u8])?;
    for field in fields {
        written += packer.pack(field, buf)?;
    }
    Ok(written)
}

pub fn pack_init<T: Write>(
    buf: &mut T,
    packer: &Packer,
    client_name: &str,
    auth_token: HashMap<String, Value>,
) -> Result<usize, PackError> {
    pack_message(
        buf,
        packer,
        Signature::Init,
        &[Value::String(client_name.to_string()), Value::Map(auth_token)],
    )
}

pub fn pack_run<T: Write>(
    buf: &mut T,
    packer: &Packer,
    statement: &str,
    parameters: HashMap<String, Value>,
) -> Result<usize, PackError> {
    pack_message(
        buf,
        packer,
        Signature::Run,
        &[Value::String(statement.to_string()), Value::Map(parameters)],
    )
}

pub fn pack_pull_all<T: Write>(buf: &mut T, packer: &Packer) -> Result<usize, PackError> {
    pack_message(buf, packer, Signature::PullAll, &[])
}

pub fn pack_discard_all<T: Write>(buf: &mut T, packer: &Packer) -> Result<usize, PackError> {
    pack_message(buf, packer, Signature::DiscardAll, &[])
}

pub fn pack_reset<T: Write>(buf: &mut T, packer: &Packer) -> Result<usize, PackError> {
    pack_message(buf, packer, Signature::Reset, &[])
}

pub fn pack_ack_failure<T: Write>(buf: &mut T, packer: &Packer) -> Result<usize, PackError> {
    pack_message(buf, packer, Signature::AckFailure, &[])
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Record(Value),
    Success(HashMap<String, Value>),
    Failure(HashMap<String, Value>),
    Ignored(HashMap<String, Value>),
}

fn expect_map(v: Value) -> Result<HashMap<String, Value>, UnpackError> {
    match v {
        Value::Map(m) => Ok(m),
        _ => Err(UnpackError::UnexpectedValueType {
            structure: "ServerMessage",
            expected: "Map",
        }),
    }
}

/// Reads one reassembled message payload (the output of one `Dechunker`
/// delivery) as a server response.
pub fn unpack_server_message(bytes: &[u8]) -> Result<ServerMessage, UnpackError> {
    let value = Value::unpack_from(&mut &bytes[..])?;
    match value {
        Value::Structure { signature, mut fields } => {
            match Signature::try_from(signature).ok() {
                Some(Signature::Record) => {
                    if fields.len() != 1 {
                        return Err(UnpackError::WrongFieldCount {
                            structure: "Record",
                            expected: 1,
                            actual: fields.len(),
                        });
                    }
                    Ok(ServerMessage::Record(fields.remove(0)))
                }
                Some(Signature::Success) => {
                    if fields.len() != 1 {
                        return Err(UnpackError::WrongFieldCount {
                            structure: "Success",
                            expected: 1,
                            actual: fields.len(),
                        });
                    }
                    Ok(ServerMessage::Success(expect_map(fields.remove(0))?))
                }
                Some(Signature::Failure) => {
                    if fields.len() != 1 {
                        return Err(UnpackError::WrongFieldCount {
                            structure: "Failure",
                            expected: 1,
                            actual: fields.len(),
                        });
                    }
                    Ok(ServerMessage::Failure(expect_map(fields.remove(0))?))
                }
                Some(Signature::Ignored) => {
                    let metadata = if fields.is_empty() {
                        HashMap::new()
                    } else {
                        expect_map(fields.remove(0))?
                    };
                    Ok(ServerMessage::Ignored(metadata))
                }
                _ => Err(UnpackError::UnexpectedSignatureSize(
                    Signature::Success as u8,
                    signature,
                )),
            }
        }
        _ => Err(UnpackError::UnexpectedValueType {
            structure: "ServerMessage",
            expected: "Structure",
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn run_statement_hex() {
        let mut buf = Vec::new();
        pack_run(&mut buf, &Packer::new(), "RETURN 1 AS num", HashMap::new()).unwrap();
        let control: Vec<u8> = vec![
            0xb2, 0x10, 0x8f, b'R', b'E', b'T', b'U', b'R', b'N', b' ', b'1', b' ', b'A', b'S',
            b' ', b'n', b'u', b'm', 0xa0,
        ];
        assert_eq!(buf, control);
    }

    #[test]
    fn unpack_success() {
        let mut metadata = HashMap::new();
        metadata.insert("fields".to_string(), Value::List(vec![Value::String("n".to_string())]));
        let success = Value::Structure {
            signature: Signature::Success as u8,
            fields: vec![Value::Map(metadata.clone())],
        };
        let mut bytes = Vec::new();
        success.pack_to(&mut bytes).unwrap();
        assert_eq!(
            unpack_server_message(&bytes).unwrap(),
            ServerMessage::Success(metadata)
        );
    }

    #[test]
    fn unpack_record() {
        let record = Value::Structure {
            signature: Signature::Record as u8,
            fields: vec![Value::List(vec![Value::Integer(1)])],
        };
        let mut bytes = Vec::new();
        record.pack_to(&mut bytes).unwrap();
        assert_eq!(
            unpack_server_message(&bytes).unwrap(),
            ServerMessage::Record(Value::List(vec![Value::Integer(1)]))
        );
    }
}

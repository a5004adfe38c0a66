//! The connection layer of a neo4j+bolt (v1) driver: handshake, chunking,
//! PackStream and pipelined request dispatch.

pub mod channel;
pub mod chunk;
pub mod connection;
pub mod error;
pub mod observer;
pub mod packing;
pub mod state;

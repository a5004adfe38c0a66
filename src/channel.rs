//! The byte transport the `Connection` is built against. Async/await
//! supersedes the source's push-callback delivery hook: instead of a
//! `set_on_data(cb)` registration, `Channel::read` is polled from the
//! Connection's own read loop, which gives the same single-threaded,
//! serialized-delivery guarantee without a callback registry.

use async_trait::async_trait;
use std::io;

/// A full-duplex, ordered byte transport. Implemented for TCP and
/// WebSocket-backed streams alike; the connection layer depends on nothing
/// beyond this contract. `?Send`: the owning `Connection` is single-threaded
/// cooperative and carries `Rc`-based state, so channel futures need not be
/// `Send` either.
#[async_trait(?Send)]
pub trait Channel {
    /// Writes `buf` in full. Errors are transport errors and fatal to the
    /// owning `Connection`.
    async fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Reads at least one byte into `buf`, returning the number of bytes
    /// read, or `Ok(0)` on a clean transport close.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Whether this channel is protected by TLS.
    fn is_encrypted(&self) -> bool;

    /// Closes the underlying transport.
    async fn close(&mut self) -> io::Result<()>;
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::VecDeque;

    /// An in-memory channel double: reads are served from a scripted queue
    /// of inbound buffers, writes are recorded for assertions.
    pub struct FakeChannel {
        pub inbound: VecDeque<Vec<u8>>,
        pub written: Vec<u8>,
        pub closed: bool,
    }

    impl FakeChannel {
        pub fn new() -> FakeChannel {
            FakeChannel {
                inbound: VecDeque::new(),
                written: Vec::new(),
                closed: false,
            }
        }

        pub fn push_inbound(&mut self, bytes: Vec<u8>) {
            self.inbound.push_back(bytes);
        }
    }

    impl Default for FakeChannel {
        fn default() -> Self {
            FakeChannel::new()
        }
    }

    #[async_trait(?Send)]
    impl Channel for FakeChannel {
        async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
            self.written.extend_from_slice(buf);
            Ok(())
        }

        async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.inbound.pop_front() {
                Some(bytes) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                None => Ok(0),
            }
        }

        fn is_encrypted(&self) -> bool {
            false
        }

        async fn close(&mut self) -> io::Result<()> {
            self.closed = true;
            Ok(())
        }
    }
}

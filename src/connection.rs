//! The orchestrator: performs the handshake, queues observers, serializes
//! requests through PackStream and the `Chunker`, parses inbound messages
//! through the `Dechunker` and PackStream, and dispatches each response to
//! the observer that issued the corresponding request. Mirrors the shape of
//! the earlier `connectivity::connection::Connection` (construction,
//! `ConnectionConfig`, `ConnectionError`) generalized from a sequential
//! request/response cycle to pipelined dispatch.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::convert::TryFrom;
use std::rc::Rc;

use crate::channel::Channel;
use crate::chunk::{Chunker, Dechunker};
use crate::error::ConnectionError;
use crate::observer::{NoopObserver, Observer};
use crate::packing::ll::Signature;
use crate::packing::message::{
    pack_ack_failure, pack_discard_all, pack_init, pack_pull_all, pack_reset, pack_run,
    unpack_server_message, ServerMessage,
};
use crate::packing::{Packer, Value};
use crate::state::ConnectionState;

const HANDSHAKE_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Tunables for the outbound buffering. Defaults follow the earlier
/// `connectivity::connection::ConnectionConfig` generation's values, which
/// in turn bounded a single TCP write to a conservative size below common
/// MTUs.
pub struct ConnectionConfig {
    chunk_capacity: u16,
}

impl ConnectionConfig {
    pub fn chunk_capacity(mut self, n: u16) -> Self {
        self.chunk_capacity = n;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig { chunk_capacity: 1400 }
    }
}

/// Orchestrates a single Bolt v1 connection over `C`. Not `Send`: the
/// pending-observer queue and init state are single-threaded-cooperative by
/// design (see the concurrency model), so interior mutability is plain
/// `Rc<RefCell<_>>` rather than an `Arc<Mutex<_>>`.
pub struct Connection<C: Channel> {
    channel: C,
    chunker: Chunker,
    dechunker: Dechunker,
    packer: Packer,
    pending_observers: VecDeque<Box<dyn Observer>>,
    current_observer: Option<Box<dyn Observer>>,
    is_broken: bool,
    is_handling_failure: bool,
    current_failure: Option<ConnectionError>,
    latched_error: Option<ConnectionError>,
    state: Rc<RefCell<ConnectionState>>,
}

impl<C: Channel> Connection<C> {
    /// Writes the 20-byte handshake and reads the negotiated version,
    /// leaving the connection ready to accept request operations (`INIT`
    /// itself is a separate, explicit request like any other). Always
    /// returns a `Connection`: a handshake failure (HTTP misdial, unknown
    /// protocol version, or a transport error) does not abort construction,
    /// it instead yields an already-broken connection whose
    /// `initialization_completed()` future is pre-rejected with the cause,
    /// since a caller needs a `Connection` value to observe that rejection.
    pub async fn connect(mut channel: C, config: ConnectionConfig) -> Connection<C> {
        let mut handshake = Vec::with_capacity(20);
        handshake.extend_from_slice(&HANDSHAKE_MAGIC);
        handshake.extend_from_slice(&1u32.to_be_bytes());
        handshake.extend_from_slice(&0u32.to_be_bytes());
        handshake.extend_from_slice(&0u32.to_be_bytes());
        handshake.extend_from_slice(&0u32.to_be_bytes());

        let negotiated = Self::negotiate(&mut channel, &handshake).await;

        let mut conn = Connection {
            channel,
            chunker: Chunker::new(config.chunk_capacity),
            dechunker: Dechunker::new(),
            packer: Packer::new(),
            pending_observers: VecDeque::new(),
            current_observer: None,
            is_broken: false,
            is_handling_failure: false,
            current_failure: None,
            latched_error: None,
            state: Rc::new(RefCell::new(ConnectionState::new())),
        };

        if let Err(err) = negotiated {
            conn.state.borrow_mut().fail(err.clone());
            conn.handle_fatal_error(err);
        }

        conn
    }

    /// Writes the handshake and validates the server's reply. Factored out
    /// of `connect` so the fallible steps can run before the `Connection`
    /// value exists and their outcome folded into it afterwards instead of
    /// aborting construction.
    async fn negotiate(channel: &mut C, handshake: &[u8]) -> Result<(), ConnectionError> {
        channel.write(handshake).await?;

        let mut response = [0u8; 4];
        let mut got = 0;
        while got < 4 {
            let n = channel.read(&mut response[got..]).await?;
            if n == 0 {
                return Err(ConnectionError::IOError(std::io::ErrorKind::UnexpectedEof));
            }
            got += n;
        }

        if response == *b"HTTP" {
            return Err(ConnectionError::HttpMisdial);
        }
        let version = u32::from_be_bytes(response);
        if version != 1 {
            return Err(ConnectionError::UnknownProtocolVersion(version));
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        !self.is_broken
    }

    pub fn is_encrypted(&self) -> bool {
        self.channel.is_encrypted()
    }

    pub fn initialization_completed(&mut self) -> futures::channel::oneshot::Receiver<Result<String, ConnectionError>> {
        self.state.borrow_mut().initialization_completed()
    }

    fn enqueue(&mut self, observer: Box<dyn Observer>) {
        if self.current_observer.is_none() {
            self.current_observer = Some(observer);
        } else {
            self.pending_observers.push_back(observer);
        }
    }

    fn advance(&mut self) {
        self.current_observer = self.pending_observers.pop_front();
    }

    /// Rejects `observer` immediately via `on_error` without touching the
    /// queue or the wire, per the broken-terminality invariant.
    fn reject_broken(&self, mut observer: Box<dyn Observer>) {
        observer.on_error(
            self.latched_error
                .clone()
                .unwrap_or(ConnectionError::Broken),
        );
    }

    pub async fn initialize(
        &mut self,
        client_name: &str,
        auth_token: HashMap<String, Value>,
        observer: Box<dyn Observer>,
    ) -> Result<(), ConnectionError> {
        if self.is_broken {
            self.reject_broken(observer);
            return Ok(());
        }
        let wrapped = ConnectionState::wrap(self.state.clone(), observer);
        self.enqueue(Box::new(wrapped));

        let mut payload = Vec::new();
        pack_init(&mut payload, &self.packer, client_name, auth_token)?;
        self.chunker.write(&payload);
        self.chunker.end_message();
        self.sync().await
    }

    pub fn run(
        &mut self,
        statement: &str,
        parameters: HashMap<String, Value>,
        observer: Box<dyn Observer>,
    ) -> Result<(), ConnectionError> {
        if self.is_broken {
            self.reject_broken(observer);
            return Ok(());
        }
        self.enqueue(observer);
        let mut payload = Vec::new();
        pack_run(&mut payload, &self.packer, statement, parameters)?;
        self.chunker.write(&payload);
        self.chunker.end_message();
        Ok(())
    }

    pub fn pull_all(&mut self, observer: Box<dyn Observer>) -> Result<(), ConnectionError> {
        if self.is_broken {
            self.reject_broken(observer);
            return Ok(());
        }
        self.enqueue(observer);
        let mut payload = Vec::new();
        pack_pull_all(&mut payload, &self.packer)?;
        self.chunker.write(&payload);
        self.chunker.end_message();
        Ok(())
    }

    pub fn discard_all(&mut self, observer: Box<dyn Observer>) -> Result<(), ConnectionError> {
        if self.is_broken {
            self.reject_broken(observer);
            return Ok(());
        }
        self.enqueue(observer);
        let mut payload = Vec::new();
        pack_discard_all(&mut payload, &self.packer)?;
        self.chunker.write(&payload);
        self.chunker.end_message();
        Ok(())
    }

    /// Plain reset: does not mute failure handling. Intentionally distinct
    /// from `reset_async` (see `reset_async`'s documentation) rather than
    /// collapsed into one call with a flag.
    pub fn reset(&mut self, observer: Box<dyn Observer>) -> Result<(), ConnectionError> {
        if self.is_broken {
            self.reject_broken(observer);
            return Ok(());
        }
        self.enqueue(observer);
        let mut payload = Vec::new();
        pack_reset(&mut payload, &self.packer)?;
        self.chunker.write(&payload);
        self.chunker.end_message();
        Ok(())
    }

    /// Coarse-grained cancel: sets `is_handling_failure` immediately so the
    /// flood of `IGNORED` responses the server sends for already-pipelined
    /// messages does not each try to trigger an `ACK_FAILURE`. Cleared by
    /// `dispatch` once this `RESET`'s own `SUCCESS` arrives.
    pub fn reset_async(&mut self, observer: Box<dyn Observer>) -> Result<(), ConnectionError> {
        if self.is_broken {
            self.reject_broken(observer);
            return Ok(());
        }
        self.is_handling_failure = true;
        self.enqueue(observer);
        let mut payload = Vec::new();
        pack_reset(&mut payload, &self.packer)?;
        self.chunker.write(&payload);
        self.chunker.end_message();
        Ok(())
    }

    pub async fn sync(&mut self) -> Result<(), ConnectionError> {
        if self.is_broken {
            return Ok(());
        }
        let wire = self.chunker.flush();
        if !wire.is_empty() {
            self.channel.write(&wire).await?;
        }
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), ConnectionError> {
        self.channel.close().await?;
        Ok(())
    }

    /// Reads one chunk of inbound bytes and dispatches every complete
    /// message it yields. Callers drive the connection by awaiting this in
    /// a loop; `Ok(false)` signals a clean transport close.
    pub async fn poll(&mut self) -> Result<bool, ConnectionError> {
        if self.is_broken {
            return Ok(false);
        }
        let mut buf = [0u8; 4096];
        let n = self.channel.read(&mut buf).await?;
        if n == 0 {
            return Ok(false);
        }
        let messages = self.dechunker.feed(&buf[..n])?;
        for message in messages {
            self.dispatch(&message);
            if self.is_broken {
                break;
            }
        }
        Ok(true)
    }

    fn dispatch(&mut self, message: &[u8]) {
        let parsed = match unpack_server_message(message) {
            Ok(m) => m,
            Err(e) => {
                self.handle_fatal_error(e.into());
                return;
            }
        };

        match parsed {
            ServerMessage::Record(fields) => {
                if let Some(obs) = self.current_observer.as_mut() {
                    obs.on_next(fields);
                }
            }
            ServerMessage::Success(metadata) => {
                self.on_server_version(&metadata);
                // Per the protocol, once a failure episode starts every
                // message up to and including the ACK_FAILURE's (or a
                // resetAsync's) own SUCCESS is either IGNORED or this
                // SUCCESS itself — nothing else completes with SUCCESS
                // while a failure is being handled. So this is always the
                // episode's closing response.
                if self.is_handling_failure {
                    self.is_handling_failure = false;
                    self.current_failure = None;
                }
                let mut obs = self.current_observer.take();
                self.advance();
                if let Some(obs) = obs.as_mut() {
                    obs.on_completed(metadata);
                }
            }
            ServerMessage::Failure(metadata) => {
                let code = metadata
                    .get("code")
                    .and_then(as_string)
                    .unwrap_or_default();
                let msg = metadata
                    .get("message")
                    .and_then(as_string)
                    .unwrap_or_default();
                let err = ConnectionError::ServerFailure { code, message: msg };
                self.current_failure = Some(err.clone());

                let mut obs = self.current_observer.take();
                let escalate = obs.as_deref().map(Observer::is_fatal_on_error).unwrap_or(false);
                self.advance();
                if let Some(obs) = obs.as_mut() {
                    obs.on_error(err.clone());
                }

                if escalate {
                    // e.g. an INIT failure: unrecoverable, so every other
                    // pending/in-flight observer is failed too rather than
                    // waiting for an ACK_FAILURE cycle that would never
                    // complete authentication.
                    self.handle_fatal_error(err);
                    return;
                }

                if !self.is_handling_failure {
                    self.is_handling_failure = true;
                    self.enqueue(Box::new(NoopObserver));
                    let mut payload = Vec::new();
                    if let Err(e) = pack_ack_failure(&mut payload, &self.packer) {
                        self.handle_fatal_error(e.into());
                        return;
                    }
                    self.chunker.write(&payload);
                    self.chunker.end_message();
                }
            }
            ServerMessage::Ignored(metadata) => {
                let err = self
                    .current_failure
                    .clone()
                    .unwrap_or(ConnectionError::IgnoredFailure);
                let _ = metadata;
                let mut obs = self.current_observer.take();
                self.advance();
                if let Some(obs) = obs.as_mut() {
                    obs.on_error(err);
                }
            }
        }
    }

    fn on_server_version(&mut self, metadata: &HashMap<String, Value>) {
        if let Some(Value::String(server)) = metadata.get("server") {
            if let Some(version) = parse_server_version(server) {
                if version < (3, 2, 0) {
                    self.packer.disable_byte_arrays();
                }
            }
        }
    }

    /// Sets `is_broken`, delivers the error to the current and every
    /// pending observer in queue order, and drains the queue. All
    /// subsequent request operations reject immediately with this error.
    fn handle_fatal_error(&mut self, err: ConnectionError) {
        if self.is_broken {
            return;
        }
        self.is_broken = true;
        self.latched_error = Some(err.clone());

        if let Some(mut obs) = self.current_observer.take() {
            obs.on_error(err.clone());
        }
        while let Some(mut obs) = self.pending_observers.pop_front() {
            obs.on_error(err.clone());
        }
    }
}

fn as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Parses a `name/M.m.p` server identifier, e.g. `"Neo4j/3.2.0"`.
fn parse_server_version(server: &str) -> Option<(u32, u32, u32)> {
    let version_part = server.split('/').nth(1)?;
    let mut parts = version_part.split('.');
    let maj = parts.next()?.parse().ok()?;
    let min = parts.next()?.parse().ok()?;
    let patch = parts.next().unwrap_or("0").parse().ok()?;
    Some((maj, min, patch))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::channel::test_support::FakeChannel;
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc as StdRc;

    fn handshake_bytes() -> Vec<u8> {
        vec![
            0x60, 0x60, 0xB0, 0x17, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]
    }

    async fn connected() -> Connection<FakeChannel> {
        let mut channel = FakeChannel::new();
        channel.push_inbound(vec![0x00, 0x00, 0x00, 0x01]);
        let conn = Connection::connect(channel, ConnectionConfig::default()).await;
        assert_eq!(conn.channel.written[..20], handshake_bytes()[..]);
        conn
    }

    #[derive(Default)]
    struct Recorder {
        nexts: StdRc<StdRefCell<Vec<Value>>>,
        completed: StdRc<StdRefCell<Vec<HashMap<String, Value>>>>,
        errors: StdRc<StdRefCell<Vec<ConnectionError>>>,
    }

    impl Observer for Recorder {
        fn on_next(&mut self, fields: Value) {
            self.nexts.borrow_mut().push(fields);
        }
        fn on_completed(&mut self, metadata: HashMap<String, Value>) {
            self.completed.borrow_mut().push(metadata);
        }
        fn on_error(&mut self, error: ConnectionError) {
            self.errors.borrow_mut().push(error);
        }
    }

    #[async_std::test]
    async fn handshake_success_enters_steady() {
        let conn = connected().await;
        assert!(conn.is_open());
    }

    #[async_std::test]
    async fn http_misdial_is_fatal() {
        let mut channel = FakeChannel::new();
        channel.push_inbound(b"HTTP".to_vec());
        let mut conn = Connection::connect(channel, ConnectionConfig::default()).await;
        assert!(conn.is_broken);

        let mut rx = conn.state.borrow_mut().initialization_completed();
        let result = rx.try_recv().unwrap().unwrap();
        assert!(matches!(result, Err(ConnectionError::HttpMisdial)));
    }

    #[async_std::test]
    async fn pipelined_run_and_pull_dispatch_in_order() {
        let mut conn = connected().await;

        let a = Recorder::default();
        let a_completed = a.completed.clone();
        let b = Recorder::default();
        let b_nexts = b.nexts.clone();
        let b_completed = b.completed.clone();

        conn.run("RETURN 1 AS n", HashMap::new(), Box::new(a)).unwrap();
        conn.pull_all(Box::new(b)).unwrap();
        conn.sync().await.unwrap();

        use crate::packing::Packable;

        let mut success_fields = HashMap::new();
        success_fields.insert(
            "fields".to_string(),
            Value::List(vec![Value::String("n".to_string())]),
        );

        let mut success_two_fields = HashMap::new();
        success_two_fields.insert("type".to_string(), Value::String("r".to_string()));

        // frame each server message as its own chunked message on the wire:
        let mut chunker = Chunker::new(1400);
        for value in [
            Value::Structure {
                signature: Signature::Success as u8,
                fields: vec![Value::Map(success_fields)],
            },
            Value::Structure {
                signature: Signature::Record as u8,
                fields: vec![Value::List(vec![Value::Integer(1)])],
            },
            Value::Structure {
                signature: Signature::Success as u8,
                fields: vec![Value::Map(success_two_fields)],
            },
        ] {
            let mut payload = Vec::new();
            value.pack_to(&mut payload).unwrap();
            chunker.write(&payload);
            chunker.end_message();
        }
        let wire = chunker.flush();

        conn.channel.push_inbound(wire);
        conn.poll().await.unwrap();

        assert_eq!(a_completed.borrow().len(), 1);
        assert_eq!(b_nexts.borrow().len(), 1);
        assert_eq!(b_completed.borrow().len(), 1);
    }

    fn server_message(value: Value, chunker: &mut Chunker) {
        use crate::packing::Packable;
        let mut payload = Vec::new();
        value.pack_to(&mut payload).unwrap();
        chunker.write(&payload);
        chunker.end_message();
    }

    #[async_std::test]
    async fn failure_acks_once_then_a_later_failure_acks_again() {
        let mut conn = connected().await;

        let a = Recorder::default();
        let a_errors = a.errors.clone();
        conn.run("BAD", HashMap::new(), Box::new(a)).unwrap();
        conn.sync().await.unwrap();

        let mut failure_meta = HashMap::new();
        failure_meta.insert("code".to_string(), Value::String("X".to_string()));
        failure_meta.insert("message".to_string(), Value::String("nope".to_string()));

        let mut chunker = Chunker::new(1400);
        server_message(
            Value::Structure {
                signature: Signature::Failure as u8,
                fields: vec![Value::Map(failure_meta.clone())],
            },
            &mut chunker,
        );
        conn.channel.push_inbound(chunker.flush());
        conn.poll().await.unwrap();

        assert_eq!(a_errors.borrow().len(), 1);
        assert!(conn.is_handling_failure);

        // the ACK_FAILURE's own SUCCESS clears is_handling_failure.
        let mut ack_reply = Chunker::new(1400);
        server_message(
            Value::Structure {
                signature: Signature::Success as u8,
                fields: vec![Value::Map(HashMap::new())],
            },
            &mut ack_reply,
        );
        conn.channel.push_inbound(ack_reply.flush());
        conn.poll().await.unwrap();
        assert!(!conn.is_handling_failure);
        assert!(conn.current_failure.is_none());

        // a second, independent failure episode still triggers its own ACK.
        let b = Recorder::default();
        let b_errors = b.errors.clone();
        conn.run("BAD AGAIN", HashMap::new(), Box::new(b)).unwrap();
        conn.sync().await.unwrap();

        let mut chunker2 = Chunker::new(1400);
        server_message(
            Value::Structure {
                signature: Signature::Failure as u8,
                fields: vec![Value::Map(failure_meta)],
            },
            &mut chunker2,
        );
        conn.channel.push_inbound(chunker2.flush());
        conn.poll().await.unwrap();

        assert_eq!(b_errors.borrow().len(), 1);
        assert!(conn.is_handling_failure);
    }

    #[async_std::test]
    async fn init_failure_breaks_connection_and_fails_other_observers() {
        let mut conn = connected().await;

        let init_observer = Recorder::default();
        let init_errors = init_observer.errors.clone();
        conn.initialize("test-client", HashMap::new(), Box::new(init_observer))
            .await
            .unwrap();

        // queued right behind INIT, before the server has replied to either:
        let run_observer = Recorder::default();
        let run_errors = run_observer.errors.clone();
        conn.run("RETURN 1", HashMap::new(), Box::new(run_observer)).unwrap();
        conn.sync().await.unwrap();

        let mut failure_meta = HashMap::new();
        failure_meta.insert("code".to_string(), Value::String("Security".to_string()));
        failure_meta.insert("message".to_string(), Value::String("bad credentials".to_string()));

        let mut chunker = Chunker::new(1400);
        server_message(
            Value::Structure {
                signature: Signature::Failure as u8,
                fields: vec![Value::Map(failure_meta)],
            },
            &mut chunker,
        );
        conn.channel.push_inbound(chunker.flush());
        conn.poll().await.unwrap();

        assert!(conn.is_broken);
        assert!(!conn.is_open());
        assert_eq!(init_errors.borrow().len(), 1);
        assert_eq!(run_errors.borrow().len(), 1);

        let mut rx = conn.state.borrow_mut().initialization_completed();
        assert!(matches!(rx.try_recv().unwrap().unwrap(), Err(ConnectionError::ServerFailure { .. })));
    }

    #[async_std::test]
    async fn reset_async_folds_later_failure_into_its_own_episode() {
        let mut conn = connected().await;

        let r = Recorder::default();
        let r_errors = r.errors.clone();
        conn.reset_async(Box::new(r)).unwrap();
        conn.sync().await.unwrap();
        // reset_async sets is_handling_failure up front, before any reply:
        assert!(conn.is_handling_failure);

        let mut failure_meta = HashMap::new();
        failure_meta.insert("code".to_string(), Value::String("X".to_string()));
        failure_meta.insert("message".to_string(), Value::String("nope".to_string()));

        let mut chunker = Chunker::new(1400);
        server_message(
            Value::Structure {
                signature: Signature::Failure as u8,
                fields: vec![Value::Map(failure_meta)],
            },
            &mut chunker,
        );
        conn.channel.push_inbound(chunker.flush());
        conn.poll().await.unwrap();

        assert_eq!(r_errors.borrow().len(), 1);
        assert!(conn.is_handling_failure);

        // folded into the resetAsync's own episode: no second ACK_FAILURE
        // was queued on top, so there is nothing new to flush to the wire.
        conn.sync().await.unwrap();
        assert!(conn.chunker.flush().is_empty());

        let mut ack_reply = Chunker::new(1400);
        server_message(
            Value::Structure {
                signature: Signature::Success as u8,
                fields: vec![Value::Map(HashMap::new())],
            },
            &mut ack_reply,
        );
        conn.channel.push_inbound(ack_reply.flush());
        conn.poll().await.unwrap();
        assert!(!conn.is_handling_failure);
    }

    #[async_std::test]
    async fn plain_reset_does_not_fold_a_later_failure() {
        let mut conn = connected().await;

        let r = Recorder::default();
        let r_errors = r.errors.clone();
        conn.reset(Box::new(r)).unwrap();
        conn.sync().await.unwrap();
        // plain reset does not touch is_handling_failure up front:
        assert!(!conn.is_handling_failure);

        let mut failure_meta = HashMap::new();
        failure_meta.insert("code".to_string(), Value::String("X".to_string()));
        failure_meta.insert("message".to_string(), Value::String("nope".to_string()));

        let mut chunker = Chunker::new(1400);
        server_message(
            Value::Structure {
                signature: Signature::Failure as u8,
                fields: vec![Value::Map(failure_meta)],
            },
            &mut chunker,
        );
        conn.channel.push_inbound(chunker.flush());
        conn.poll().await.unwrap();

        assert_eq!(r_errors.borrow().len(), 1);
        assert!(conn.is_handling_failure);

        // not folded: the Failure arm started its own ACK_FAILURE episode,
        // so there is a fresh ACK_FAILURE message waiting to be flushed.
        let written_before = conn.channel.written.len();
        conn.sync().await.unwrap();
        assert!(conn.channel.written.len() > written_before);
    }
}

//! Observes `INIT` completion. Owns a one-shot, resolved on `INIT` success
//! and rejected on `INIT` failure, consumable any number of times via
//! `initialization_completed`.

use futures::channel::oneshot;
use std::collections::HashMap;

use crate::error::ConnectionError;
use crate::observer::Observer;
use crate::packing::Value;

#[derive(Debug, Clone, PartialEq)]
enum Settled {
    ServerVersion(String),
    Failed(ConnectionError),
}

/// Tracks whether `INIT` has completed and with what outcome. Calling
/// `initialization_completed` before the outcome is known returns a
/// receiver that resolves once it arrives; calling it afterwards resolves
/// immediately with the memorized outcome, so a late caller never blocks
/// forever and an early caller is not left dangling.
pub struct ConnectionState {
    settled: Option<Settled>,
    waiters: Vec<oneshot::Sender<Result<String, ConnectionError>>>,
}

impl ConnectionState {
    pub fn new() -> ConnectionState {
        ConnectionState {
            settled: None,
            waiters: Vec::new(),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settled.is_some()
    }

    /// Returns a future resolving with the negotiated server version on
    /// `INIT` success, or the connection error on `INIT` failure.
    pub fn initialization_completed(&mut self) -> oneshot::Receiver<Result<String, ConnectionError>> {
        let (tx, rx) = oneshot::channel();
        match &self.settled {
            Some(Settled::ServerVersion(v)) => {
                let _ = tx.send(Ok(v.clone()));
            }
            Some(Settled::Failed(e)) => {
                let _ = tx.send(Err(e.clone()));
            }
            None => self.waiters.push(tx),
        }
        rx
    }

    /// Settles with a failure directly, for outcomes that precede any
    /// `INIT` request (e.g. a failed handshake) and so have no `InitObserver`
    /// to settle through.
    pub fn fail(&mut self, error: ConnectionError) {
        self.settle(Settled::Failed(error));
    }

    fn settle(&mut self, outcome: Settled) {
        if self.settled.is_some() {
            return;
        }
        for waiter in self.waiters.drain(..) {
            let result = match &outcome {
                Settled::ServerVersion(v) => Ok(v.clone()),
                Settled::Failed(e) => Err(e.clone()),
            };
            let _ = waiter.send(result);
        }
        self.settled = Some(outcome);
    }

    pub fn server_version(&self) -> Option<&str> {
        match &self.settled {
            Some(Settled::ServerVersion(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Wraps a caller's `INIT` observer so that completion/failure also
    /// settle this state. `on_error` is forwarded to the inner observer
    /// as-is; the Connection is responsible for advancing `currentObserver`
    /// before invoking it, so a reentrant request issued from within
    /// `on_error` sees a consistent queue, and for escalating via
    /// `handle_fatal_error` afterwards (`InitObserver` has no handle back to
    /// the owning `Connection` to do that itself — see
    /// `Observer::is_fatal_on_error`, which this type overrides to `true`).
    pub fn wrap(state: std::rc::Rc<std::cell::RefCell<ConnectionState>>, inner: Box<dyn Observer>) -> InitObserver {
        InitObserver { state, inner }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::new()
    }
}

pub struct InitObserver {
    state: std::rc::Rc<std::cell::RefCell<ConnectionState>>,
    inner: Box<dyn Observer>,
}

impl Observer for InitObserver {
    fn on_next(&mut self, fields: Value) {
        self.inner.on_next(fields);
    }

    fn on_completed(&mut self, metadata: HashMap<String, Value>) {
        let version = metadata
            .get("server")
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                _ => None,
            })
            .unwrap_or_default();
        self.state.borrow_mut().settle(Settled::ServerVersion(version));
        self.inner.on_completed(metadata);
    }

    fn on_error(&mut self, error: ConnectionError) {
        self.state.borrow_mut().settle(Settled::Failed(error.clone()));
        self.inner.on_error(error);
    }

    fn is_fatal_on_error(&self) -> bool {
        true
    }
}

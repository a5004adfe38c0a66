//! The completion triad dispatched to on every in-flight request: zero or
//! more `on_next` calls followed by exactly one of `on_completed`/`on_error`.

use std::collections::HashMap;

use crate::error::ConnectionError;
use crate::packing::Value;

/// Bound to a single submitted request (`run`, `pullAll`, `discardAll`,
/// `reset`, `initialize`, and the internally issued `ackFailure`). Missing
/// callbacks default to no-ops, matching the source's optional-callback
/// triad. Not `Send`: the owning `Connection` is single-threaded
/// cooperative, so observers may freely close over `Rc`/`RefCell` state.
pub trait Observer {
    fn on_next(&mut self, _fields: Value) {}
    fn on_completed(&mut self, _metadata: HashMap<String, Value>) {}
    fn on_error(&mut self, _error: ConnectionError) {}

    /// Whether this observer's `on_error` marks the whole connection broken
    /// rather than just this request. `InitObserver` overrides this to
    /// `true`: an `INIT` failure is unrecoverable (unlike a `run`/`pullAll`
    /// failure, which the `ACK_FAILURE` cycle recovers from), so the
    /// dispatch loop escalates via `handle_fatal_error` after delivering it.
    fn is_fatal_on_error(&self) -> bool {
        false
    }
}

/// An observer that ignores every callback, for requests whose caller does
/// not care about the response (the internal `ACK_FAILURE` observer before
/// it is wrapped to clear failure-handling state).
#[derive(Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

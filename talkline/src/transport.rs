//! Blocking-style RPC transport over a callback-driven HTTP engine.
//!
//! `HttpTransport` gives an RPC codec the `read`/`write` calls it expects
//! while every exchange is really one asynchronous HTTP POST:
//!
//! ```text
//!   encoder ──write──► WriteBuffer ──send()──► HttpRequest ──► engine
//!                                                               │
//!   decoder ◄──read─── ReadBuffer ◄── classify ◄── HttpResponse ◄┘
//!      ▲                                   │
//!      └────────── continuation ◄──────────┘
//! ```
//!
//! The whole response is buffered before the continuation runs, so from the
//! decoder's point of view every read is a non-blocking buffer pop.
//!
//! # Lifetime
//!
//! The transport is a cheap handle (`Rc`) over single-threaded state. Engine
//! callbacks hold only weak references, and a completion that arrives after
//! `close()` finds its request id gone and does nothing. `close()` may be
//! called from inside a continuation: the connection set that is running
//! that continuation is released on the next loop turn, not on the current
//! stack.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::account::{AccountStore, ConnectionSink};
use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::classify::{self, StatusClass};
use crate::config::{ClientIdentity, TransportConfig};
use crate::engine::{BeforeSend, HttpEngine, HttpRequest, HttpResponse, OnComplete};
use crate::error::{ConnectionError, Error, Result, RpcFault};
use crate::metrics;
use crate::session::SessionTracker;

// ── Request tracking ────────────────────────────────────────────────────

/// Identifies an in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// Get the raw ID value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Requests submitted since the last `open()`, keyed by id.
#[derive(Debug, Default)]
struct PendingRequests {
    next: u64,
    inflight: HashMap<RequestId, Instant>,
}

impl PendingRequests {
    fn register(&mut self) -> RequestId {
        let id = RequestId(self.next);
        self.next += 1;
        self.inflight.insert(id, Instant::now());
        id
    }

    /// Remove `id`, returning when it was sent if it was still pending.
    fn complete(&mut self, id: RequestId) -> Option<Instant> {
        self.inflight.remove(&id)
    }

    fn contains(&self, id: RequestId) -> bool {
        self.inflight.contains_key(&id)
    }

    fn clear(&mut self) {
        self.inflight.clear();
    }

    fn len(&self) -> usize {
        self.inflight.len()
    }
}

// ── Shared state ────────────────────────────────────────────────────────

struct Resources<E: HttpEngine> {
    set: Rc<E::ConnectionSet>,
    pool: Rc<E::KeepalivePool>,
}

impl<E: HttpEngine> Clone for Resources<E> {
    fn clone(&self) -> Self {
        Self {
            set: self.set.clone(),
            pool: self.pool.clone(),
        }
    }
}

struct State<E: HttpEngine> {
    destroying: bool,
    url: String,
    timeout: Duration,
    connection_limit: usize,
    resources: Option<Resources<E>>,
    session: SessionTracker,
    outgoing: WriteBuffer,
    incoming: ReadBuffer,
    status_code: u16,
    pending: PendingRequests,
}

impl<E: HttpEngine> State<E> {
    /// Drop per-connection state and hand the engine resources back.
    ///
    /// The pool handle goes at once. The connection set is released on the
    /// next loop turn unless the transport itself is being destroyed.
    fn release(&mut self, engine: &E) -> bool {
        let Some(Resources { set, pool }) = self.resources.take() else {
            return false;
        };
        drop(pool);

        self.session.reset();
        self.outgoing.clear();
        self.incoming.clear();
        self.pending.clear();

        if self.destroying {
            drop(set);
        } else {
            metrics::DEFERRED_DESTROYS.increment();
            engine.defer(Box::new(move || {
                trace!("releasing connection set");
                drop(set);
            }));
        }
        true
    }
}

struct Shared<E: HttpEngine> {
    engine: E,
    identity: ClientIdentity,
    account: Rc<dyn AccountStore>,
    connection: Rc<dyn ConnectionSink>,
    state: RefCell<State<E>>,
}

impl<E: HttpEngine> Shared<E> {
    /// Headers for request `id`. Requests issued before the last `close()`
    /// leave the current session alone.
    fn attach_headers(&self, id: RequestId, request: &mut HttpRequest, use_count: u32) {
        let mut state = self.state.borrow_mut();
        if state.destroying {
            return;
        }
        if !state.pending.contains(id) {
            debug!(request = id.value(), "skipping headers for closed transport");
            return;
        }
        let mode = state.session.prepare(
            request,
            use_count == 1,
            &self.identity,
            self.account.as_ref(),
        );
        debug!(use_count, ?mode, "attaching request headers");
    }
}

impl<E: HttpEngine> Drop for Shared<E> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.destroying = true;
        state.release(&self.engine);
    }
}

// ── HttpTransport ───────────────────────────────────────────────────────

/// An RPC transport that turns each `send` into one HTTP POST.
///
/// # Example
///
/// ```rust,ignore
/// let transport = HttpTransport::new(engine, TransportConfig::new(url), identity, account, conn);
/// transport.open();
/// transport.write(&encoded_call);
/// transport.send(|t| {
///     let reply = decode_reply(t)?; // reads through io::Read
///     Ok(())
/// })?;
/// ```
pub struct HttpTransport<E: HttpEngine> {
    shared: Rc<Shared<E>>,
}

impl<E: HttpEngine> Clone for HttpTransport<E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<E: HttpEngine> fmt::Debug for HttpTransport<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("HttpTransport")
            .field("url", &state.url)
            .field("open", &state.resources.is_some())
            .field("status_code", &state.status_code)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl<E: HttpEngine> HttpTransport<E> {
    /// Create a closed transport.
    pub fn new(
        engine: E,
        config: TransportConfig,
        identity: ClientIdentity,
        account: Rc<dyn AccountStore>,
        connection: Rc<dyn ConnectionSink>,
    ) -> Self {
        let state = State {
            destroying: false,
            url: config.url,
            timeout: config.timeout,
            connection_limit: config.connection_limit,
            resources: None,
            session: SessionTracker::new(),
            outgoing: WriteBuffer::new(),
            incoming: ReadBuffer::new(),
            status_code: 0,
            pending: PendingRequests::default(),
        };
        Self {
            shared: Rc::new(Shared {
                engine,
                identity,
                account,
                connection,
                state: RefCell::new(state),
            }),
        }
    }

    // -- Configuration --

    /// Endpoint for subsequent requests.
    pub fn set_url(&self, url: impl Into<String>) {
        self.shared.state.borrow_mut().url = url.into();
    }

    /// Timeout for subsequent requests.
    pub fn set_timeout(&self, timeout: Duration) {
        self.shared.state.borrow_mut().timeout = timeout;
    }

    /// Per-host connection limit. Applied to the live pool if open.
    pub fn set_connection_limit(&self, limit: usize) {
        let pool = {
            let mut state = self.shared.state.borrow_mut();
            state.connection_limit = limit;
            state.resources.as_ref().map(|r| r.pool.clone())
        };
        if let Some(pool) = pool {
            self.shared.engine.set_limit_per_host(&pool, limit);
        }
    }

    /// Current endpoint.
    pub fn url(&self) -> String {
        self.shared.state.borrow().url.clone()
    }

    /// Current request timeout.
    pub fn timeout(&self) -> Duration {
        self.shared.state.borrow().timeout
    }

    /// Current per-host connection limit.
    pub fn connection_limit(&self) -> usize {
        self.shared.state.borrow().connection_limit
    }

    // -- Lifecycle --

    /// Allocate the connection set and keep-alive pool. No-op if open.
    pub fn open(&self) {
        let mut state = self.shared.state.borrow_mut();
        if state.resources.is_some() {
            return;
        }

        let set = self.shared.engine.connection_set();
        let pool = self.shared.engine.keepalive_pool(state.connection_limit);
        state.resources = Some(Resources {
            set: Rc::new(set),
            pool: Rc::new(pool),
        });
        debug!(url = %state.url, limit = state.connection_limit, "transport opened");
    }

    /// Release HTTP resources and reset the session. No-op if not open.
    ///
    /// The token and both buffers are cleared immediately. The connection
    /// set is released on the next loop turn, so calling this from inside a
    /// continuation is safe.
    pub fn close(&self) {
        let released = self
            .shared
            .state
            .borrow_mut()
            .release(&self.shared.engine);
        if released {
            debug!("transport closed");
        }
    }

    /// Whether `open()` has been called since the last `close()`.
    pub fn is_open(&self) -> bool {
        self.shared.state.borrow().resources.is_some()
    }

    // -- Buffered I/O --

    /// Append request bytes. No I/O happens until `send`.
    pub fn write(&self, data: &[u8]) {
        self.shared.state.borrow_mut().outgoing.extend(data);
    }

    /// Drop request bytes written since the last send.
    pub fn discard_written(&self) {
        self.shared.state.borrow_mut().outgoing.clear();
    }

    /// Read up to `out.len()` response bytes, returning how many were read.
    pub fn read(&self, out: &mut [u8]) -> usize {
        self.shared.state.borrow_mut().incoming.read(out)
    }

    /// Response bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.shared.state.borrow().incoming.remaining()
    }

    // -- Exchanges --

    /// Send everything written so far as one POST.
    ///
    /// Returns once the request is handed to the engine. When the response
    /// arrives it is classified; if it is deliverable its body is buffered
    /// and `continuation` runs exactly once to decode it. A continuation
    /// error is classified and reported, never retried.
    pub fn send<F>(&self, continuation: F) -> Result<RequestId>
    where
        F: FnOnce(&mut HttpTransport<E>) -> std::result::Result<(), RpcFault> + 'static,
    {
        let (resources, request, id) = {
            let mut state = self.shared.state.borrow_mut();
            let resources = state.resources.clone().ok_or(Error::NotOpen)?;

            let mut request = HttpRequest::new(state.url.clone());
            request.set_method("POST");
            request.set_timeout(state.timeout);
            request.set_body(state.outgoing.take());

            let id = state.pending.register();
            (resources, request, id)
        };

        debug!(
            request = id.value(),
            bytes = request.body().len(),
            url = request.url(),
            "dispatching request"
        );
        metrics::REQUESTS_SENT.increment();

        let weak = Rc::downgrade(&self.shared);

        let before_send: BeforeSend = {
            let weak = weak.clone();
            Box::new(move |request, use_count| {
                if let Some(shared) = weak.upgrade() {
                    shared.attach_headers(id, request, use_count);
                }
            })
        };

        let on_complete: OnComplete = Box::new(move |response| match weak.upgrade() {
            Some(shared) => HttpTransport { shared }.complete(id, response, continuation),
            None => {
                metrics::RESPONSES_STALE.increment();
            }
        });

        self.shared.engine.submit(
            &resources.set,
            &resources.pool,
            request,
            Some(before_send),
            on_complete,
        );
        Ok(id)
    }

    /// Last observed HTTP status; 0 if none or if no response came back.
    pub fn status_code(&self) -> u16 {
        self.shared.state.borrow().status_code
    }

    /// The continuation token currently held.
    pub fn session_token(&self) -> Option<String> {
        self.shared
            .state
            .borrow()
            .session
            .token()
            .map(str::to_string)
    }

    /// Number of requests submitted and not yet completed.
    pub fn pending_requests(&self) -> usize {
        self.shared.state.borrow().pending.len()
    }

    fn complete<F>(mut self, id: RequestId, response: HttpResponse, continuation: F)
    where
        F: FnOnce(&mut HttpTransport<E>) -> std::result::Result<(), RpcFault>,
    {
        let status = response.status();
        {
            let mut state = self.shared.state.borrow_mut();
            if state.destroying {
                return;
            }
            let Some(sent_at) = state.pending.complete(id) else {
                debug!(request = id.value(), status, "completion for closed transport dropped");
                metrics::RESPONSES_STALE.increment();
                return;
            };
            state.status_code = status;
            debug!(
                request = id.value(),
                status,
                elapsed_ms = sent_at.elapsed().as_millis() as u64,
                "response received"
            );
        }

        match classify::classify_status(status) {
            StatusClass::NetworkFailure => return self.fail(ConnectionError::NetworkFailure),
            StatusClass::SessionReplaced => return self.fail(ConnectionError::SessionReplaced),
            StatusClass::Deliver => {}
        }

        {
            let mut state = self.shared.state.borrow_mut();
            state.session.observe(&response);
            state.incoming.replace(response.into_body());
        }
        metrics::RESPONSES_DELIVERED.increment();

        if let Err(fault) = continuation(&mut self) {
            debug!(request = id.value(), %fault, "continuation failed");
            self.fail(classify::classify_fault(fault));
        }
    }

    fn fail(&self, error: ConnectionError) {
        classify::dispatch(
            &error,
            self.shared.account.as_ref(),
            self.shared.connection.as_ref(),
        );
    }
}

impl<E: HttpEngine> io::Read for HttpTransport<E> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(HttpTransport::read(&*self, buf))
    }
}

impl<E: HttpEngine> io::Write for HttpTransport<E> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        HttpTransport::write(&*self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_ids_are_unique_and_removable() {
        let mut pending = PendingRequests::default();
        let a = pending.register();
        let b = pending.register();
        assert_ne!(a, b);
        assert_eq!(pending.len(), 2);

        assert!(pending.complete(a).is_some());
        assert!(pending.complete(a).is_none());

        pending.clear();
        assert!(pending.complete(b).is_none());

        let c = pending.register();
        assert_ne!(c, a);
        assert_ne!(c, b);
    }
}

//! In-process test doubles.
//!
//! [`MockEngine`] is a scripted [`HttpEngine`]: submitted requests queue up
//! and nothing happens until the test calls [`MockEngine::respond`], which
//! completes the oldest exchange. Deferred tasks likewise wait for
//! [`MockEngine::run_deferred`]. This makes every callback ordering explicit
//! in the test body.
//!
//! [`RecordingConnection`] records what the transport reports.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::account::ConnectionSink;
use crate::engine::{BeforeSend, Deferred, HttpEngine, HttpRequest, HttpResponse, OnComplete};

/// A request as it was written, after `before_send` ran.
#[derive(Debug, Clone)]
pub struct SubmittedRequest {
    pub request: HttpRequest,
    /// Use count of the connection it went out on.
    pub use_count: u32,
}

impl SubmittedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn body(&self) -> &[u8] {
        self.request.body()
    }
}

struct Exchange {
    set: u64,
    pool: Rc<PoolState>,
    request: HttpRequest,
    before_send: Option<BeforeSend>,
    on_complete: OnComplete,
}

struct PoolState {
    limit: Cell<usize>,
    use_count: Cell<u32>,
}

#[derive(Default)]
struct MockState {
    next_set: u64,
    live_sets: usize,
    destroyed_sets: usize,
    pools: Vec<Weak<PoolState>>,
    exchanges: VecDeque<Exchange>,
    submitted: Vec<SubmittedRequest>,
    deferred: VecDeque<Deferred>,
}

/// Scripted engine. Clones share state.
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Rc<RefCell<MockState>>,
}

/// Connection set handed out by [`MockEngine`].
pub struct MockConnectionSet {
    id: u64,
    engine: Weak<RefCell<MockState>>,
}

impl Drop for MockConnectionSet {
    fn drop(&mut self) {
        let Some(state) = self.engine.upgrade() else {
            return;
        };
        let cancelled: VecDeque<Exchange> = {
            let mut state = state.borrow_mut();
            state.live_sets -= 1;
            state.destroyed_sets += 1;
            let (cancelled, kept) = std::mem::take(&mut state.exchanges)
                .into_iter()
                .partition(|ex| ex.set == self.id);
            state.exchanges = kept;
            cancelled
        };
        // Callbacks may own transport handles; drop them outside the borrow.
        drop(cancelled);
    }
}

/// Keep-alive pool handed out by [`MockEngine`]: one simulated connection.
pub struct MockPool {
    state: Rc<PoolState>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete the oldest queued exchange with `response`.
    ///
    /// Runs `before_send` first, with the pool's connection use count
    /// bumped, then `on_complete`. Returns `None` if nothing is queued.
    pub fn respond(&self, response: HttpResponse) -> Option<SubmittedRequest> {
        let exchange = self.state.borrow_mut().exchanges.pop_front()?;
        Some(self.complete(exchange, response))
    }

    /// Complete the most recently submitted exchange, overtaking older ones.
    pub fn respond_last(&self, response: HttpResponse) -> Option<SubmittedRequest> {
        let exchange = self.state.borrow_mut().exchanges.pop_back()?;
        Some(self.complete(exchange, response))
    }

    fn complete(&self, exchange: Exchange, response: HttpResponse) -> SubmittedRequest {
        let Exchange {
            pool,
            mut request,
            before_send,
            on_complete,
            ..
        } = exchange;

        let use_count = pool.use_count.get() + 1;
        pool.use_count.set(use_count);

        if let Some(before_send) = before_send {
            before_send(&mut request, use_count);
        }

        let submitted = SubmittedRequest { request, use_count };
        self.state.borrow_mut().submitted.push(submitted.clone());

        on_complete(response);
        submitted
    }

    /// Complete the oldest exchange as if nothing came back.
    pub fn fail_next(&self) -> Option<SubmittedRequest> {
        self.respond(HttpResponse::failed())
    }

    /// Close every simulated keep-alive connection; the next request on
    /// each pool goes out on a fresh one.
    pub fn drop_connections(&self) {
        for pool in self.state.borrow().pools.iter().filter_map(Weak::upgrade) {
            pool.use_count.set(0);
        }
    }

    /// Run deferred tasks until none are left, returning how many ran.
    pub fn run_deferred(&self) -> usize {
        let mut ran = 0;
        loop {
            let Some(task) = self.state.borrow_mut().deferred.pop_front() else {
                return ran;
            };
            task();
            ran += 1;
        }
    }

    /// Requests completed so far, in order.
    pub fn requests(&self) -> Vec<SubmittedRequest> {
        self.state.borrow().submitted.clone()
    }

    /// Submitted requests still waiting for `respond`.
    pub fn queued_requests(&self) -> Vec<HttpRequest> {
        self.state
            .borrow()
            .exchanges
            .iter()
            .map(|ex| ex.request.clone())
            .collect()
    }

    /// Number of exchanges waiting for `respond`.
    pub fn pending(&self) -> usize {
        self.state.borrow().exchanges.len()
    }

    /// Number of deferred tasks not yet run.
    pub fn deferred(&self) -> usize {
        self.state.borrow().deferred.len()
    }

    pub fn live_connection_sets(&self) -> usize {
        self.state.borrow().live_sets
    }

    pub fn destroyed_connection_sets(&self) -> usize {
        self.state.borrow().destroyed_sets
    }

    /// Per-host limits of every pool still alive.
    pub fn pool_limits(&self) -> Vec<usize> {
        self.state
            .borrow()
            .pools
            .iter()
            .filter_map(Weak::upgrade)
            .map(|pool| pool.limit.get())
            .collect()
    }
}

impl HttpEngine for MockEngine {
    type ConnectionSet = MockConnectionSet;
    type KeepalivePool = MockPool;

    fn connection_set(&self) -> MockConnectionSet {
        let mut state = self.state.borrow_mut();
        let id = state.next_set;
        state.next_set += 1;
        state.live_sets += 1;
        MockConnectionSet {
            id,
            engine: Rc::downgrade(&self.state),
        }
    }

    fn keepalive_pool(&self, limit_per_host: usize) -> MockPool {
        let pool = Rc::new(PoolState {
            limit: Cell::new(limit_per_host),
            use_count: Cell::new(0),
        });
        let mut state = self.state.borrow_mut();
        state.pools.retain(|p| p.strong_count() > 0);
        state.pools.push(Rc::downgrade(&pool));
        MockPool { state: pool }
    }

    fn set_limit_per_host(&self, pool: &MockPool, limit: usize) {
        pool.state.limit.set(limit);
    }

    fn submit(
        &self,
        set: &MockConnectionSet,
        pool: &MockPool,
        request: HttpRequest,
        before_send: Option<BeforeSend>,
        on_complete: OnComplete,
    ) {
        self.state.borrow_mut().exchanges.push_back(Exchange {
            set: set.id,
            pool: pool.state.clone(),
            request,
            before_send,
            on_complete,
        });
    }

    fn defer(&self, task: Deferred) {
        self.state.borrow_mut().deferred.push_back(task);
    }
}

/// A [`ConnectionSink`] that records every report.
#[derive(Debug, Default)]
pub struct RecordingConnection {
    errors: RefCell<Vec<String>>,
    no_reconnect: Cell<bool>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages passed to `report_fatal`, in order.
    pub fn errors(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }

    /// Whether `set_no_reconnect` was called.
    pub fn no_reconnect(&self) -> bool {
        self.no_reconnect.get()
    }
}

impl ConnectionSink for RecordingConnection {
    fn report_fatal(&self, message: &str) {
        self.errors.borrow_mut().push(message.to_string());
    }

    fn set_no_reconnect(&self) {
        self.no_reconnect.set(true);
    }
}

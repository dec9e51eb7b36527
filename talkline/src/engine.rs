//! The HTTP engine boundary.
//!
//! talkline never speaks HTTP itself. Connection pooling, TLS, DNS and the
//! event loop live behind [`HttpEngine`]; transports only build
//! [`HttpRequest`]s and react to [`HttpResponse`]s.
//!
//! # Callback contract
//!
//! - `before_send` runs once a connection has been assigned to the request,
//!   right before it is written, with that connection's use count (1 for the
//!   first request on a freshly established connection).
//! - `on_complete` runs exactly once per submitted request, with status 0 if
//!   no response was received. It is skipped only when the request's
//!   connection set has been dropped first.
//! - Neither callback is ever invoked from inside [`HttpEngine::submit`];
//!   both run on a later turn of the engine's loop, on the same thread.
//!
//! Dropping a connection set cancels every request submitted through it.
//! Dropping the last handle of a keep-alive pool closes its idle sockets.

use std::time::Duration;

use bytes::Bytes;

/// Hook invoked with the request and the connection's use count.
pub type BeforeSend = Box<dyn FnOnce(&mut HttpRequest, u32)>;

/// Completion callback.
pub type OnComplete = Box<dyn FnOnce(HttpResponse)>;

/// Zero-delay task scheduled on the engine's loop.
pub type Deferred = Box<dyn FnOnce()>;

/// A callback-driven HTTP engine running on a single-threaded loop.
pub trait HttpEngine: Clone + 'static {
    /// Tracks in-flight requests; dropping it cancels them.
    type ConnectionSet: 'static;
    /// Reusable keep-alive sockets with a per-host connection limit.
    type KeepalivePool: 'static;

    /// Create an empty connection set.
    fn connection_set(&self) -> Self::ConnectionSet;

    /// Create a keep-alive pool allowing `limit_per_host` concurrent
    /// connections to each host.
    fn keepalive_pool(&self, limit_per_host: usize) -> Self::KeepalivePool;

    /// Change the per-host connection limit of a live pool.
    fn set_limit_per_host(&self, pool: &Self::KeepalivePool, limit: usize);

    /// Submit a request. Returns immediately; see the module docs for when
    /// the callbacks fire.
    fn submit(
        &self,
        set: &Self::ConnectionSet,
        pool: &Self::KeepalivePool,
        request: HttpRequest,
        before_send: Option<BeforeSend>,
        on_complete: OnComplete,
    );

    /// Run `task` on the next turn of the loop.
    fn defer(&self, task: Deferred);
}

/// An HTTP request as handed to the engine.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    url: String,
    method: &'static str,
    timeout: Duration,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl HttpRequest {
    /// Default request timeout when none is set.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// A GET request for `url` with no headers and no body.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET",
            timeout: Self::DEFAULT_TIMEOUT,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request method.
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Set the request method.
    pub fn set_method(&mut self, method: &'static str) {
        self.method = method;
    }

    /// Whole-exchange timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set the whole-exchange timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Set a header, replacing any existing value (case-insensitive name).
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.remove_header(name);
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Remove every header called `name` (case-insensitive).
    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Headers as (name, value) pairs, in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Set the request body.
    pub fn set_body(&mut self, body: Bytes) {
        self.body = body;
    }
}

/// An HTTP response as delivered by the engine.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl HttpResponse {
    /// Build a response.
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// The response reported when nothing came back (connect error, timeout).
    pub fn failed() -> Self {
        Self::default()
    }

    /// A 200 response carrying `body`.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200, Vec::new(), body.into())
    }

    /// Builder-style header addition.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// HTTP status code; 0 when no response was received.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Response headers as (name, value) pairs.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Get the first header value matching `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Reference to the body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response and return the body bytes.
    pub fn into_body(self) -> Bytes {
        self.body
    }
}

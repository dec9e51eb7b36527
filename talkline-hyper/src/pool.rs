//! Per-host keep-alive pool.
//!
//! The pool bounds how many exchanges may hold a connection to one origin at
//! a time and keeps finished HTTP/1.1 connections around for reuse. A slot is
//! held through a [`Lease`]; dropping the lease frees the slot and, if the
//! exchange handed its connection back, parks that connection as idle.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::pin::pin;
use std::rc::Rc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::Uri;
use hyper::client::conn::http1::SendRequest;
use tokio::sync::Notify;

use crate::error::EngineError;

/// Scheme, host and port of a request target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Origin {
    pub tls: bool,
    pub host: String,
    pub port: u16,
}

impl Origin {
    pub fn from_uri(uri: &Uri) -> Result<Self, EngineError> {
        let tls = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            _ => return Err(EngineError::InvalidUrl(uri.to_string())),
        };
        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| EngineError::InvalidUrl(uri.to_string()))?;
        let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });
        Ok(Self {
            tls,
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port,
        })
    }

    /// Value for the `Host` header.
    pub fn authority(&self) -> String {
        let default_port = if self.tls { 443 } else { 80 };
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == default_port {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "https" } else { "http" };
        write!(f, "{scheme}://{}", self.authority())
    }
}

/// An established HTTP/1.1 connection.
pub(crate) struct PooledConnection {
    pub sender: SendRequest<Full<Bytes>>,
    /// Requests written on this connection so far.
    pub use_count: u32,
}

#[derive(Default)]
struct HostState {
    active: usize,
    idle: Vec<PooledConnection>,
}

struct PoolInner {
    limit: Cell<usize>,
    hosts: RefCell<HashMap<Origin, HostState>>,
    released: Notify,
}

/// Keep-alive pool handle. Clones share the pool; idle connections close
/// when the last handle goes.
#[derive(Clone)]
pub struct KeepalivePool {
    inner: Rc<PoolInner>,
}

impl KeepalivePool {
    pub(crate) fn new(limit_per_host: usize) -> Self {
        Self {
            inner: Rc::new(PoolInner {
                limit: Cell::new(limit_per_host),
                hosts: RefCell::new(HashMap::new()),
                released: Notify::new(),
            }),
        }
    }

    /// Current per-host connection limit.
    pub fn limit_per_host(&self) -> usize {
        self.inner.limit.get()
    }

    pub(crate) fn set_limit_per_host(&self, limit: usize) {
        self.inner.limit.set(limit);
        self.inner.released.notify_waiters();
    }

    /// Idle connections across all hosts.
    pub fn idle_connections(&self) -> usize {
        self.inner
            .hosts
            .borrow()
            .values()
            .map(|h| h.idle.len())
            .sum()
    }

    /// Wait for a free slot for `origin`.
    ///
    /// A limit of 0 is treated as 1.
    pub(crate) async fn acquire(&self, origin: &Origin) -> Lease {
        loop {
            let mut released = pin!(self.inner.released.notified());
            released.as_mut().enable();

            {
                let mut hosts = self.inner.hosts.borrow_mut();
                let host = hosts.entry(origin.clone()).or_default();
                if host.active < self.inner.limit.get().max(1) {
                    host.active += 1;
                    host.idle.retain(|conn| !conn.sender.is_closed());
                    let conn = host.idle.pop();
                    return Lease {
                        pool: self.clone(),
                        origin: origin.clone(),
                        conn,
                    };
                }
            }

            released.await;
        }
    }
}

/// A held slot, possibly with an idle connection attached.
pub(crate) struct Lease {
    pool: KeepalivePool,
    origin: Origin,
    conn: Option<PooledConnection>,
}

impl Lease {
    /// Take the idle connection handed out with this lease, if any.
    pub fn take(&mut self) -> Option<PooledConnection> {
        self.conn.take()
    }

    /// Hand a connection back for reuse once the lease is dropped.
    pub fn restore(&mut self, conn: PooledConnection) {
        self.conn = Some(conn);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let inner = &self.pool.inner;
        if let Some(host) = inner.hosts.borrow_mut().get_mut(&self.origin) {
            host.active = host.active.saturating_sub(1);
            if let Some(conn) = self.conn.take() {
                if !conn.sender.is_closed() {
                    host.idle.push(conn);
                }
            }
        }
        inner.released.notify_waiters();
    }
}

//! RPC client facade.
//!
//! [`RpcClient`] is what the service layer holds: one transport with the
//! open-on-demand behavior and an encode-then-send helper. It adds no
//! buffering; every `send` is exactly one HTTP exchange.

use std::io;
use std::rc::Rc;
use std::time::Duration;

use crate::account::{AccountStore, ConnectionSink};
use crate::config::{ClientIdentity, TransportConfig};
use crate::engine::HttpEngine;
use crate::error::{Error, Result, RpcFault};
use crate::transport::{HttpTransport, RequestId};

/// RPC client over one [`HttpTransport`].
pub struct RpcClient<E: HttpEngine> {
    transport: HttpTransport<E>,
}

impl<E: HttpEngine> RpcClient<E> {
    /// Create a client. Nothing is allocated on the engine until the first
    /// send.
    pub fn new(
        engine: E,
        config: TransportConfig,
        identity: ClientIdentity,
        account: Rc<dyn AccountStore>,
        connection: Rc<dyn ConnectionSink>,
    ) -> Self {
        Self {
            transport: HttpTransport::new(engine, config, identity, account, connection),
        }
    }

    /// Endpoint for subsequent calls.
    pub fn set_url(&self, url: impl Into<String>) {
        self.transport.set_url(url);
    }

    /// Timeout for subsequent calls.
    pub fn set_timeout(&self, timeout: Duration) {
        self.transport.set_timeout(timeout);
    }

    /// Per-host connection limit, applied to the live pool if open.
    pub fn set_connection_limit(&self, limit: usize) {
        self.transport.set_connection_limit(limit);
    }

    /// Open the transport if needed and send the buffered call.
    pub fn send<F>(&self, continuation: F) -> Result<RequestId>
    where
        F: FnOnce(&mut HttpTransport<E>) -> std::result::Result<(), RpcFault> + 'static,
    {
        self.transport.open();
        self.transport.send(continuation)
    }

    /// Encode a call into the transport, then send it.
    ///
    /// If `encode` fails nothing is sent and whatever it wrote is discarded.
    pub fn call<W, F>(&self, encode: W, continuation: F) -> Result<RequestId>
    where
        W: FnOnce(&mut dyn io::Write) -> std::result::Result<(), RpcFault>,
        F: FnOnce(&mut HttpTransport<E>) -> std::result::Result<(), RpcFault> + 'static,
    {
        let mut writer = self.transport.clone();
        if let Err(fault) = encode(&mut writer) {
            self.transport.discard_written();
            return Err(Error::Encode(fault));
        }
        self.send(continuation)
    }

    /// Last observed HTTP status.
    pub fn status_code(&self) -> u16 {
        self.transport.status_code()
    }

    /// Close the transport. The next send reopens it with full headers.
    pub fn close(&self) {
        self.transport.close();
    }

    /// The underlying transport.
    pub fn transport(&self) -> &HttpTransport<E> {
        &self.transport
    }
}

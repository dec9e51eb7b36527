//! General-purpose HTTP client.
//!
//! For fetches outside the RPC channel (images, login polling). Shares the
//! engine with the RPC transport but owns its own connection set and pool,
//! and applies no response classification.

use std::rc::Rc;
use std::time::Duration;

use bitflags::bitflags;
use bytes::Bytes;
use tracing::debug;

use crate::account::{ACCESS_TOKEN_KEY, AccountStore};
use crate::config::{ClientIdentity, HttpClientConfig};
use crate::engine::{HttpEngine, HttpRequest, HttpResponse};
use crate::session::{ACCESS_HEADER, APPLICATION_HEADER};

bitflags! {
    /// Per-request options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RequestFlags: u32 {
        /// Attach the application id and access credential.
        const AUTH = 1 << 0;
    }
}

/// Plain HTTP client. Requests still in flight are cancelled on drop.
pub struct HttpClient<E: HttpEngine> {
    engine: E,
    identity: ClientIdentity,
    account: Rc<dyn AccountStore>,
    timeout: Duration,
    set: E::ConnectionSet,
    pool: E::KeepalivePool,
}

impl<E: HttpEngine> HttpClient<E> {
    pub fn new(
        engine: E,
        config: HttpClientConfig,
        identity: ClientIdentity,
        account: Rc<dyn AccountStore>,
    ) -> Self {
        let set = engine.connection_set();
        let pool = engine.keepalive_pool(config.connection_limit);
        Self {
            engine,
            identity,
            account,
            timeout: config.timeout,
            set,
            pool,
        }
    }

    pub fn set_connection_limit(&self, limit: usize) {
        self.engine.set_limit_per_host(&self.pool, limit);
    }

    /// Issue a GET. `callback` runs once with the response (status 0 if
    /// nothing came back).
    pub fn get<F>(&self, url: impl Into<String>, flags: RequestFlags, callback: F)
    where
        F: FnOnce(&HttpResponse) + 'static,
    {
        self.submit(HttpRequest::new(url), flags, callback);
    }

    /// Issue a POST with `body` of type `content_type`.
    pub fn post<F>(
        &self,
        url: impl Into<String>,
        flags: RequestFlags,
        content_type: &str,
        body: impl Into<Bytes>,
        callback: F,
    ) where
        F: FnOnce(&HttpResponse) + 'static,
    {
        let mut request = HttpRequest::new(url);
        request.set_method("POST");
        request.set_header("content-type", content_type);
        request.set_body(body.into());
        self.submit(request, flags, callback);
    }

    fn submit<F>(&self, mut request: HttpRequest, flags: RequestFlags, callback: F)
    where
        F: FnOnce(&HttpResponse) + 'static,
    {
        request.set_timeout(self.timeout);
        request.set_header("user-agent", &self.identity.user_agent);

        if flags.contains(RequestFlags::AUTH) {
            request.set_header(APPLICATION_HEADER, &self.identity.application);
            let access = self.account.get_string(ACCESS_TOKEN_KEY, "");
            if !access.is_empty() {
                request.set_header(ACCESS_HEADER, &access);
            }
        }

        debug!(method = request.method(), url = request.url(), ?flags, "http request");
        self.engine.submit(
            &self.set,
            &self.pool,
            request,
            None,
            Box::new(move |response| {
                debug!(status = response.status(), bytes = response.body().len(), "http response");
                callback(&response);
            }),
        );
    }
}

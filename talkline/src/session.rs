//! Session continuation tracking.
//!
//! The service pins a caller to a warm backend session and hands back an
//! opaque token in the `X-LS` response header. While a token is held, each
//! request carries only that token; otherwise it carries the full
//! authentication header set.
//!
//! ```text
//!   fresh connection ──► token cleared ──► full headers ──► response X-LS: t
//!                                                                │
//!   reused connection ◄── X-LS: t only ◄── token = t ◄───────────┘
//! ```

use crate::account::{ACCESS_TOKEN_KEY, AccountStore};
use crate::config::ClientIdentity;
use crate::engine::{HttpRequest, HttpResponse};

/// Continuation token header, in both directions.
pub const SESSION_HEADER: &str = "x-ls";
/// Media type of RPC request bodies.
pub const RPC_CONTENT_TYPE: &str = "application/x-thrift";
/// Application identifier header.
pub const APPLICATION_HEADER: &str = "x-line-application";
/// Access credential header.
pub const ACCESS_HEADER: &str = "x-line-access";

/// Which header set a request was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMode {
    /// Content type, user agent, application id and access credential.
    Full,
    /// Only the continuation token.
    Continuation,
}

/// Owns the continuation token.
#[derive(Debug, Default)]
pub struct SessionTracker {
    token: String,
}

impl SessionTracker {
    /// Create a tracker with no token.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current token, if any.
    pub fn token(&self) -> Option<&str> {
        if self.token.is_empty() {
            None
        } else {
            Some(&self.token)
        }
    }

    /// Forget the token; the next request re-authenticates fully.
    pub fn reset(&mut self) {
        self.token.clear();
    }

    /// Attach headers to `request` just before it is written.
    ///
    /// A fresh connection has no backend session behind it, so the token is
    /// dropped first.
    pub fn prepare(
        &mut self,
        request: &mut HttpRequest,
        fresh_connection: bool,
        identity: &ClientIdentity,
        account: &dyn AccountStore,
    ) -> HeaderMode {
        if fresh_connection {
            self.reset();
        }

        if !self.token.is_empty() {
            request.set_header(SESSION_HEADER, &self.token);
            return HeaderMode::Continuation;
        }

        request.remove_header(SESSION_HEADER);
        request.set_header("content-type", RPC_CONTENT_TYPE);
        request.set_header("user-agent", &identity.user_agent);
        request.set_header(APPLICATION_HEADER, &identity.application);

        let access = account.get_string(ACCESS_TOKEN_KEY, "");
        if !access.is_empty() {
            request.set_header(ACCESS_HEADER, &access);
        }

        HeaderMode::Full
    }

    /// Pick up a continuation token from a delivered response.
    ///
    /// Returns true if the response carried one.
    pub fn observe(&mut self, response: &HttpResponse) -> bool {
        match response.header(SESSION_HEADER) {
            Some(token) => {
                self.token.clear();
                self.token.push_str(token);
                true
            }
            None => false,
        }
    }
}

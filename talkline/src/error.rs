//! Error types for the talkline transport.
//!
//! Three layers of failure meet here:
//!
//! - [`Error`] is returned synchronously from API calls (sending on a closed
//!   transport, bad configuration).
//! - [`RpcFault`] is what an RPC decoder reports from inside a response
//!   continuation.
//! - [`ConnectionError`] is the classified outcome of one exchange, the thing
//!   that is eventually surfaced to the user through a
//!   [`ConnectionSink`](crate::account::ConnectionSink).

use std::io;

/// Result type for talkline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned directly by transport and client calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `send` was called before `open`, or after `close`.
    #[error("transport is not open")]
    NotOpen,

    /// The request encoder failed; nothing was sent.
    #[error("encode failed: {0}")]
    Encode(RpcFault),

    /// Configuration error (missing env var, invalid value).
    #[error("config error: {0}")]
    Config(String),
}

/// Error code carried by a service-level fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    /// The device's access credential is no longer accepted.
    NotAuthorizedDevice,
    /// Any other service error code, kept verbatim.
    Other(i32),
}

/// Faults raised while decoding a response inside a continuation.
///
/// Decoders map their own exception types onto these three categories; the
/// classifier only ever looks at the category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcFault {
    /// A declared service exception with an error code and reason string.
    #[error("talk exception ({code:?}): {reason}")]
    Talk { code: FaultCode, reason: String },

    /// A generic RPC application exception (unknown method, bad sequence id).
    #[error("application exception: {0}")]
    Application(String),

    /// Malformed or truncated response bytes.
    #[error("transport exception: {0}")]
    Transport(String),
}

impl From<io::Error> for RpcFault {
    fn from(e: io::Error) -> Self {
        RpcFault::Transport(e.to_string())
    }
}

/// Fault reason sent when another device took over the session.
pub const REASON_OTHER_DEVICE: &str = "AUTHENTICATION_DIVESTED_BY_OTHER_DEVICE";

/// Fault reason sent when the device was logged out from the mobile app.
pub const REASON_REVOKE: &str = "REVOKE";

/// Why the service stopped accepting this device's credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeReason {
    /// The account logged in from another device.
    OtherDevice,
    /// The device was logged out through the mobile app.
    MobileApp,
    /// Any other reason string.
    Other(String),
}

impl RevokeReason {
    /// Map a fault reason string onto a revoke reason.
    pub fn from_reason(reason: &str) -> Self {
        match reason {
            REASON_OTHER_DEVICE => RevokeReason::OtherDevice,
            REASON_REVOKE => RevokeReason::MobileApp,
            other => RevokeReason::Other(other.to_string()),
        }
    }
}

/// Classified outcome of a failed exchange.
///
/// The `Display` output is the user-facing message handed to
/// [`ConnectionSink::report_fatal`](crate::account::ConnectionSink::report_fatal).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// No response at all (status 0): connect failure or timeout.
    #[error("could not connect to the talk server")]
    NetworkFailure,

    /// HTTP 403: a competing session took over.
    #[error("session died: another client took over this session")]
    SessionReplaced,

    /// The stored credential was rejected.
    #[error("{}", revoke_message(.0))]
    AuthRevoked(RevokeReason),

    /// Service or application fault with the underlying message.
    #[error("application error: {0}")]
    ApplicationFault(String),

    /// The response could not be decoded.
    #[error("transport error: {0}")]
    TransportDecodeFault(String),
}

fn revoke_message(reason: &RevokeReason) -> String {
    match reason {
        RevokeReason::OtherDevice => {
            "you have been logged out because you logged in from another device".to_string()
        }
        RevokeReason::MobileApp => "this device was logged out via the mobile app".to_string(),
        RevokeReason::Other(reason) => format!("device is no longer authorized: {reason}"),
    }
}

impl ConnectionError {
    /// Whether the owning connection must not reconnect automatically.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            ConnectionError::SessionReplaced | ConnectionError::AuthRevoked(_)
        )
    }

    /// Whether the stored access credential has to be discarded.
    pub fn clears_credential(&self) -> bool {
        matches!(self, ConnectionError::AuthRevoked(_))
    }
}

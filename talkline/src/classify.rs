//! Response and fault classification.
//!
//! Every exchange ends in exactly one of three ways: delivered to the
//! continuation, rejected at the HTTP level, or failed while decoding. This
//! module maps the latter two onto [`ConnectionError`] and applies their side
//! effects from a single place.

use tracing::{info, warn};

use crate::account::{ACCESS_TOKEN_KEY, AccountStore, ConnectionSink};
use crate::error::{ConnectionError, FaultCode, RevokeReason, RpcFault};
use crate::metrics;

/// Status code meaning a competing session took over.
pub const STATUS_SESSION_REPLACED: u16 = 403;

/// What to do with a response, judged by its status alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Status 0: the request never got an answer.
    NetworkFailure,
    /// Status 403.
    SessionReplaced,
    /// Anything else: buffer the body and let the decoder judge it.
    Deliver,
}

/// Classify a response status.
///
/// Only 0 and 403 are special. Server errors such as 500 are still handed
/// to the decoder, which normally fails with a transport fault.
pub fn classify_status(status: u16) -> StatusClass {
    match status {
        0 => StatusClass::NetworkFailure,
        STATUS_SESSION_REPLACED => StatusClass::SessionReplaced,
        _ => StatusClass::Deliver,
    }
}

/// Map a decode-time fault onto a connection error.
pub fn classify_fault(fault: RpcFault) -> ConnectionError {
    match fault {
        RpcFault::Talk {
            code: FaultCode::NotAuthorizedDevice,
            reason,
        } => ConnectionError::AuthRevoked(RevokeReason::from_reason(&reason)),
        RpcFault::Talk { reason, .. } => {
            ConnectionError::ApplicationFault(format!("talk exception: {reason}"))
        }
        RpcFault::Application(message) => ConnectionError::ApplicationFault(message),
        RpcFault::Transport(message) => ConnectionError::TransportDecodeFault(message),
    }
}

/// Apply the side effects of `error` and report it.
///
/// Order matters: the credential is gone and the no-reconnect flag is set
/// before the session sees the error and starts tearing down.
pub fn dispatch(error: &ConnectionError, account: &dyn AccountStore, conn: &dyn ConnectionSink) {
    record(error);

    if error.clears_credential() {
        info!("discarding rejected access credential");
        account.remove_setting(ACCESS_TOKEN_KEY);
    }

    if error.is_unrecoverable() {
        conn.set_no_reconnect();
    }

    warn!(%error, unrecoverable = error.is_unrecoverable(), "connection error");
    conn.report_fatal(&error.to_string());
}

fn record(error: &ConnectionError) {
    let counter = match error {
        ConnectionError::NetworkFailure => &metrics::NETWORK_FAILURES,
        ConnectionError::SessionReplaced => &metrics::SESSIONS_REPLACED,
        ConnectionError::AuthRevoked(_) => &metrics::AUTH_REVOKED,
        ConnectionError::ApplicationFault(_) => &metrics::APPLICATION_FAULTS,
        ConnectionError::TransportDecodeFault(_) => &metrics::TRANSPORT_FAULTS,
    };
    counter.increment();
}

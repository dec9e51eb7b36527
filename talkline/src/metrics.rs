//! talkline transport metrics.
//!
//! Process-wide counters, exposed through metriken's registry.

use metriken::{Counter, metric};

// ── Exchanges ────────────────────────────────────────────────────

#[metric(
    name = "talkline/requests/sent",
    description = "RPC requests handed to the HTTP engine"
)]
pub static REQUESTS_SENT: Counter = Counter::new();

#[metric(
    name = "talkline/responses/delivered",
    description = "Responses buffered and handed to a continuation"
)]
pub static RESPONSES_DELIVERED: Counter = Counter::new();

#[metric(
    name = "talkline/responses/stale",
    description = "Completions dropped because their transport was closed"
)]
pub static RESPONSES_STALE: Counter = Counter::new();

// ── Failures ─────────────────────────────────────────────────────

#[metric(
    name = "talkline/errors/network",
    description = "Exchanges that got no response (status 0)"
)]
pub static NETWORK_FAILURES: Counter = Counter::new();

#[metric(
    name = "talkline/errors/session_replaced",
    description = "Exchanges rejected with 403"
)]
pub static SESSIONS_REPLACED: Counter = Counter::new();

#[metric(
    name = "talkline/errors/auth_revoked",
    description = "Responses revoking the device credential"
)]
pub static AUTH_REVOKED: Counter = Counter::new();

#[metric(
    name = "talkline/errors/application",
    description = "Service or application faults raised while decoding"
)]
pub static APPLICATION_FAULTS: Counter = Counter::new();

#[metric(
    name = "talkline/errors/transport",
    description = "Responses that failed to decode"
)]
pub static TRANSPORT_FAULTS: Counter = Counter::new();

// ── Lifecycle ────────────────────────────────────────────────────

#[metric(
    name = "talkline/connection_sets/deferred_destroy",
    description = "Connection sets released on a later loop turn"
)]
pub static DEFERRED_DESTROYS: Counter = Counter::new();

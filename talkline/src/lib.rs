//! talkline — RPC-over-HTTP transport for a chat service client.
//!
//! A stream-oriented RPC codec wants `write` and `read`; the service wants one
//! HTTP POST per call, on a single keep-alive connection, with a session
//! continuation header. talkline bridges the two on top of a callback-driven
//! [`HttpEngine`]: bytes written between sends become one request body, and
//! the whole response body is buffered before a continuation decodes it.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use talkline::{ClientIdentity, MemoryAccount, RpcClient, TransportConfig};
//!
//! let client = RpcClient::new(
//!     engine,
//!     TransportConfig::new("https://talk.example.com/S4"),
//!     ClientIdentity::from_env()?,
//!     Rc::new(MemoryAccount::with_access_token(&token)),
//!     connection,
//! );
//!
//! client.call(
//!     |w| encode_get_profile(w),
//!     |t| {
//!         let profile = decode_get_profile(t)?;
//!         show(profile);
//!         Ok(())
//!     },
//! )?;
//! ```
//!
//! # Threading
//!
//! Everything is single-threaded: handles are `Rc`-based and `!Send`, and the
//! engine runs every callback on the thread that submitted the request.
//!
//! # Failures
//!
//! Each exchange ends delivered, rejected (status 0 or 403) or failed while
//! decoding. Rejections and decode failures become a [`ConnectionError`]
//! reported through the [`ConnectionSink`]; see [`classify`] for the mapping.

pub mod account;
pub mod buffer;
pub mod classify;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod http_client;
pub mod metrics;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use account::{ACCESS_TOKEN_KEY, AccountStore, ConnectionSink, MemoryAccount};
pub use client::RpcClient;
pub use config::{ClientIdentity, HttpClientConfig, TransportConfig};
pub use engine::{HttpEngine, HttpRequest, HttpResponse};
pub use error::{ConnectionError, Error, FaultCode, Result, RevokeReason, RpcFault};
pub use http_client::{HttpClient, RequestFlags};
pub use session::HeaderMode;
pub use transport::{HttpTransport, RequestId};

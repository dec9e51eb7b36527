//! talkline-hyper — a tokio/hyper [`HttpEngine`](talkline::HttpEngine) for
//! talkline transports.
//!
//! HTTP/1.1 over TCP or rustls, with a per-host keep-alive pool that reports
//! connection use counts so talkline can tell a fresh connection from a
//! reused one.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use talkline::testing::RecordingConnection;
//! use talkline::{ClientIdentity, MemoryAccount, RpcClient, TransportConfig};
//! use talkline_hyper::HyperEngine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .enable_all()
//!     .build()?;
//! let local = tokio::task::LocalSet::new();
//!
//! local.block_on(&runtime, async {
//!     let client = RpcClient::new(
//!         HyperEngine::new()?,
//!         TransportConfig::new("https://talk.example.com/S4"),
//!         ClientIdentity::default(),
//!         Rc::new(MemoryAccount::new()),
//!         Rc::new(RecordingConnection::new()),
//!     );
//!     client.send(|_| Ok(()))?;
//!     Ok::<_, Box<dyn std::error::Error>>(())
//! })?;
//! # Ok(())
//! # }
//! ```

mod engine;
mod error;
mod pool;

pub use engine::{ConnectionSet, HyperEngine, default_tls_config};
pub use error::EngineError;
pub use pool::KeepalivePool;

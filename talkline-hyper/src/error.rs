//! Engine errors.
//!
//! These never reach talkline callbacks: the engine logs them and completes
//! the request with status 0.

use std::io;

/// Errors raised while performing one exchange.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The request URL could not be parsed or has no usable host.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// A header or method was rejected while building the request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Socket error (connect, read, write, TLS handshake).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// HTTP protocol error.
    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    /// TLS configuration error.
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),
}

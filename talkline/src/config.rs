//! Transport and client configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default `User-Agent` sent with full header sets.
pub const DEFAULT_USER_AGENT: &str = concat!("talkline/", env!("CARGO_PKG_VERSION"));

/// Default application identifier sent with full header sets.
pub const DEFAULT_APPLICATION: &str = "DESKTOPWIN\t5.0.0\tTALKLINE\t10.0";

/// How this client identifies itself to the service.
///
/// Immutable once a transport is built; shared by every request it sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// `User-Agent` header value.
    pub user_agent: String,
    /// `X-Line-Application` header value.
    pub application: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            application: DEFAULT_APPLICATION.to_string(),
        }
    }
}

impl ClientIdentity {
    /// Create an identity from explicit values.
    pub fn new(user_agent: impl Into<String>, application: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            application: application.into(),
        }
    }

    /// Create an identity from environment variables.
    ///
    /// Uses:
    /// - `TALKLINE_APPLICATION` for the application identifier (required)
    /// - `TALKLINE_USER_AGENT` for the user agent (defaults to
    ///   [`DEFAULT_USER_AGENT`])
    pub fn from_env() -> Result<Self> {
        let application = std::env::var("TALKLINE_APPLICATION").map_err(|_| {
            Error::Config("TALKLINE_APPLICATION environment variable not set".into())
        })?;
        if application.is_empty() {
            return Err(Error::Config("TALKLINE_APPLICATION is empty".into()));
        }

        let user_agent =
            std::env::var("TALKLINE_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());

        Ok(Self {
            user_agent,
            application,
        })
    }
}

/// Configuration for an RPC [`HttpTransport`](crate::transport::HttpTransport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Endpoint every RPC call is POSTed to.
    pub url: String,
    /// Whole-exchange timeout per request.
    pub timeout: Duration,
    /// Maximum concurrent connections per host. Keep at 1: the service pins
    /// a session to one keep-alive connection.
    pub connection_limit: usize,
}

impl TransportConfig {
    /// Default RPC request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default per-host connection limit.
    pub const DEFAULT_CONNECTION_LIMIT: usize = 1;

    /// Defaults for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Self::DEFAULT_TIMEOUT,
            connection_limit: Self::DEFAULT_CONNECTION_LIMIT,
        }
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the per-host connection limit.
    pub fn connection_limit(mut self, limit: usize) -> Self {
        self.connection_limit = limit;
        self
    }
}

/// Configuration for the general-purpose [`HttpClient`](crate::http_client::HttpClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientConfig {
    /// Whole-exchange timeout per request.
    pub timeout: Duration,
    /// Maximum concurrent connections per host.
    pub connection_limit: usize,
}

impl HttpClientConfig {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);
    /// Default per-host connection limit.
    pub const DEFAULT_CONNECTION_LIMIT: usize = 4;
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            connection_limit: Self::DEFAULT_CONNECTION_LIMIT,
        }
    }
}

//! hyper-backed [`HttpEngine`].
//!
//! Every exchange is a `spawn_local` task on the current tokio `LocalSet`:
//!
//! ```text
//!   acquire pool slot ─► reuse idle conn | connect (+TLS) + handshake
//!          │
//!          ▼
//!   before_send(request, use_count) ─► send ─► collect body ─► on_complete
//! ```
//!
//! The whole task runs under the request timeout. Any failure, including
//! the timeout, completes the request with status 0.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::{self, SendRequest};
use hyper::{Request, Uri};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use talkline::engine::{BeforeSend, Deferred, HttpEngine, HttpRequest, HttpResponse, OnComplete};
use tokio::net::TcpStream;
use tokio::task::AbortHandle;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace, warn};

use crate::error::EngineError;
use crate::pool::{KeepalivePool, Origin, PooledConnection};

/// Build a client TLS config trusting the webpki root set.
pub fn default_tls_config() -> Result<rustls::ClientConfig, EngineError> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(config)
}

/// Tracks the tasks submitted through it; dropping it aborts them.
pub struct ConnectionSet {
    tasks: RefCell<Vec<AbortHandle>>,
}

impl ConnectionSet {
    fn track(&self, handle: AbortHandle) {
        let mut tasks = self.tasks.borrow_mut();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Tasks submitted through this set that have not finished.
    pub fn in_flight(&self) -> usize {
        self.tasks
            .borrow()
            .iter()
            .filter(|t| !t.is_finished())
            .count()
    }
}

impl Drop for ConnectionSet {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut();
        if !tasks.is_empty() {
            trace!(tasks = tasks.len(), "aborting connection set");
        }
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

struct EngineInner {
    tls: TlsConnector,
}

/// Single-threaded HTTP/1.1 engine on tokio and hyper.
///
/// Must be driven from inside a [`tokio::task::LocalSet`] (or a local
/// runtime); `submit` and `defer` use `spawn_local`.
#[derive(Clone)]
pub struct HyperEngine {
    inner: Rc<EngineInner>,
}

impl fmt::Debug for HyperEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperEngine").finish_non_exhaustive()
    }
}

impl HyperEngine {
    /// Create an engine using [`default_tls_config`].
    pub fn new() -> Result<Self, EngineError> {
        Ok(Self::with_tls(Arc::new(default_tls_config()?)))
    }

    /// Create an engine with a caller-supplied TLS config.
    pub fn with_tls(config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            inner: Rc::new(EngineInner {
                tls: TlsConnector::from(config),
            }),
        }
    }

    async fn exchange(
        &self,
        pool: &KeepalivePool,
        mut request: HttpRequest,
        before_send: Option<BeforeSend>,
    ) -> Result<HttpResponse, EngineError> {
        let uri: Uri = request
            .url()
            .parse()
            .map_err(|_| EngineError::InvalidUrl(request.url().to_string()))?;
        let origin = Origin::from_uri(&uri)?;

        let mut lease = pool.acquire(&origin).await;
        let mut conn = match lease.take() {
            Some(conn) => {
                debug!(%origin, uses = conn.use_count, "reusing connection");
                conn
            }
            None => self.connect(&origin).await?,
        };

        conn.use_count += 1;
        if let Some(before_send) = before_send {
            before_send(&mut request, conn.use_count);
        }

        let outgoing = build_request(&uri, &origin, &request)?;
        conn.sender.ready().await?;
        let response = conn.sender.send_request(outgoing).await?;

        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();
        lease.restore(conn);

        let headers = parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Ok(HttpResponse::new(parts.status.as_u16(), headers, body))
    }

    async fn connect(&self, origin: &Origin) -> Result<PooledConnection, EngineError> {
        debug!(%origin, "connecting");
        let tcp = TcpStream::connect((origin.host.as_str(), origin.port)).await?;
        tcp.set_nodelay(true)?;

        let sender = if origin.tls {
            let name = ServerName::try_from(origin.host.clone())
                .map_err(|_| EngineError::InvalidUrl(origin.to_string()))?;
            let stream = self.inner.tls.connect(name, tcp).await?;
            handshake(TokioIo::new(stream)).await?
        } else {
            handshake(TokioIo::new(tcp)).await?
        };

        Ok(PooledConnection {
            sender,
            use_count: 0,
        })
    }
}

async fn handshake<T>(io: T) -> Result<SendRequest<Full<Bytes>>, EngineError>
where
    T: hyper::rt::Read + hyper::rt::Write + Unpin + 'static,
{
    let (sender, conn) = http1::handshake(io).await?;
    tokio::task::spawn_local(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "connection closed with error");
        }
    });
    Ok(sender)
}

fn build_request(
    uri: &Uri,
    origin: &Origin,
    request: &HttpRequest,
) -> Result<Request<Full<Bytes>>, EngineError> {
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let mut builder = Request::builder()
        .method(request.method())
        .uri(path)
        .header("host", origin.authority());
    for (name, value) in request.headers() {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Full::new(request.body().clone()))
        .map_err(|e| EngineError::InvalidRequest(e.to_string()))
}

impl HttpEngine for HyperEngine {
    type ConnectionSet = ConnectionSet;
    type KeepalivePool = KeepalivePool;

    fn connection_set(&self) -> ConnectionSet {
        ConnectionSet {
            tasks: RefCell::new(Vec::new()),
        }
    }

    fn keepalive_pool(&self, limit_per_host: usize) -> KeepalivePool {
        KeepalivePool::new(limit_per_host)
    }

    fn set_limit_per_host(&self, pool: &KeepalivePool, limit: usize) {
        pool.set_limit_per_host(limit);
    }

    fn submit(
        &self,
        set: &ConnectionSet,
        pool: &KeepalivePool,
        request: HttpRequest,
        before_send: Option<BeforeSend>,
        on_complete: OnComplete,
    ) {
        let engine = self.clone();
        let pool = pool.clone();
        let task = tokio::task::spawn_local(async move {
            let timeout = request.timeout();
            let url = request.url().to_string();
            let exchange = engine.exchange(&pool, request, before_send);
            let response = match tokio::time::timeout(timeout, exchange).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    warn!(url = %url, error = %e, "request failed");
                    HttpResponse::failed()
                }
                Err(_) => {
                    warn!(url = %url, timeout_ms = timeout.as_millis() as u64, "request timed out");
                    HttpResponse::failed()
                }
            };
            on_complete(response);
        });
        set.track(task.abort_handle());
    }

    fn defer(&self, task: Deferred) {
        tokio::task::spawn_local(async move { task() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_path_and_host() {
        let uri: Uri = "http://127.0.0.1:8080/S4?x=1".parse().unwrap();
        let origin = Origin::from_uri(&uri).unwrap();
        let mut request = HttpRequest::new(uri.to_string());
        request.set_method("POST");
        request.set_header("X-LS", "token");
        request.set_body(Bytes::from_static(b"body"));

        let built = build_request(&uri, &origin, &request).unwrap();
        assert_eq!(built.method(), "POST");
        assert_eq!(built.uri(), "/S4?x=1");
        assert_eq!(built.headers()["host"], "127.0.0.1:8080");
        assert_eq!(built.headers()["x-ls"], "token");
    }

    #[test]
    fn invalid_header_is_rejected() {
        let uri: Uri = "http://example.com/".parse().unwrap();
        let origin = Origin::from_uri(&uri).unwrap();
        let mut request = HttpRequest::new(uri.to_string());
        request.set_header("bad header", "x");
        assert!(matches!(
            build_request(&uri, &origin, &request),
            Err(EngineError::InvalidRequest(_))
        ));
    }

    #[test]
    fn default_tls_config_builds() {
        assert!(default_tls_config().is_ok());
    }
}

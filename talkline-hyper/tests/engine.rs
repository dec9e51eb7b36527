//! Integration tests: talkline transports over HyperEngine against a local
//! hyper server.
//!
//! The server runs on the same LocalSet as the client. It echoes request
//! bodies, hands out an `X-LS` token per TCP connection and logs what it
//! saw so tests can check which header set each request carried.

use std::cell::{Cell, RefCell};
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::LocalSet;

use talkline::testing::RecordingConnection;
use talkline::{
    ClientIdentity, HttpClient, HttpClientConfig, HttpTransport, MemoryAccount, RequestFlags,
    TransportConfig,
};
use talkline_hyper::HyperEngine;

// ── Test server ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Seen {
    connection: u32,
    path: String,
    session: Option<String>,
    access: Option<String>,
    user_agent: Option<String>,
    body: Bytes,
}

struct Server {
    addr: SocketAddr,
    log: Rc<RefCell<Vec<Seen>>>,
    connections: Rc<Cell<u32>>,
}

impl Server {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    fn seen(&self) -> Vec<Seen> {
        self.log.borrow().clone()
    }
}

async fn handle(
    req: Request<Incoming>,
    connection: u32,
    log: Rc<RefCell<Vec<Seen>>>,
) -> Result<Response<Full<Bytes>>, Box<dyn std::error::Error + Send + Sync>> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    log.borrow_mut().push(Seen {
        connection,
        path: parts.uri.path().to_string(),
        session: header("x-ls"),
        access: header("x-line-access"),
        user_agent: header("user-agent"),
        body: body.clone(),
    });

    let response = match parts.uri.path() {
        "/slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Response::new(Full::new(body))
        }
        "/forbidden" => Response::builder()
            .status(StatusCode::FORBIDDEN)
            .body(Full::new(Bytes::new()))?,
        _ => Response::builder()
            .header("x-ls", format!("session-{connection}"))
            .body(Full::new(body))?,
    };
    Ok(response)
}

async fn start_server() -> Server {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    let connections = Rc::new(Cell::new(0));

    let (accept_log, accept_count) = (log.clone(), connections.clone());
    tokio::task::spawn_local(async move {
        while let Ok((stream, _)) = listener.accept().await {
            accept_count.set(accept_count.get() + 1);
            let id = accept_count.get();
            let log = accept_log.clone();
            tokio::task::spawn_local(async move {
                let service = service_fn(move |req| handle(req, id, log.clone()));
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    Server {
        addr,
        log,
        connections,
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

async fn until(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

struct Client {
    account: Rc<MemoryAccount>,
    conn: Rc<RecordingConnection>,
    transport: HttpTransport<HyperEngine>,
}

fn transport(config: TransportConfig) -> Client {
    let account = Rc::new(MemoryAccount::with_access_token("secret"));
    let conn = Rc::new(RecordingConnection::new());
    let transport = HttpTransport::new(
        HyperEngine::new().unwrap(),
        config,
        ClientIdentity::new("talkline-test/1.0", "TESTAPP\t1.0"),
        account.clone(),
        conn.clone(),
    );
    Client {
        account,
        conn,
        transport,
    }
}

type Bodies = Rc<RefCell<Vec<Vec<u8>>>>;

fn send_and_capture(transport: &HttpTransport<HyperEngine>, payload: &[u8], bodies: &Bodies) {
    let bodies = bodies.clone();
    transport.write(payload);
    transport
        .send(move |t| {
            let mut body = vec![0u8; t.remaining()];
            let n = t.read(&mut body);
            body.truncate(n);
            bodies.borrow_mut().push(body);
            Ok(())
        })
        .unwrap();
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn keepalive_switches_to_continuation_header() {
    LocalSet::new()
        .run_until(async {
            let server = start_server().await;
            let client = transport(TransportConfig::new(server.url("/S4")));
            let bodies = Bodies::default();

            client.transport.open();
            send_and_capture(&client.transport, b"one", &bodies);
            until(|| bodies.borrow().len() == 1).await;
            assert_eq!(client.transport.session_token().as_deref(), Some("session-1"));

            send_and_capture(&client.transport, b"two", &bodies);
            until(|| bodies.borrow().len() == 2).await;

            assert_eq!(*bodies.borrow(), vec![b"one".to_vec(), b"two".to_vec()]);
            assert_eq!(server.connections.get(), 1);

            let seen = server.seen();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[0].path, "/S4");
            assert_eq!(seen[0].session, None);
            assert_eq!(seen[0].access.as_deref(), Some("secret"));
            assert_eq!(seen[0].user_agent.as_deref(), Some("talkline-test/1.0"));
            assert_eq!(&seen[0].body[..], b"one");
            assert_eq!(seen[1].connection, 1);
            assert_eq!(seen[1].session.as_deref(), Some("session-1"));
            assert_eq!(seen[1].access, None);
            assert!(client.conn.errors().is_empty());
        })
        .await;
}

#[tokio::test]
async fn reopen_uses_new_connection_and_full_headers() {
    LocalSet::new()
        .run_until(async {
            let server = start_server().await;
            let client = transport(TransportConfig::new(server.url("/S4")));
            let bodies = Bodies::default();

            client.transport.open();
            send_and_capture(&client.transport, b"first", &bodies);
            until(|| bodies.borrow().len() == 1).await;

            client.transport.close();
            client.transport.open();
            send_and_capture(&client.transport, b"second", &bodies);
            until(|| bodies.borrow().len() == 2).await;

            let seen = server.seen();
            assert_eq!(server.connections.get(), 2);
            assert_eq!(seen[1].connection, 2);
            assert_eq!(seen[1].session, None);
            assert_eq!(seen[1].access.as_deref(), Some("secret"));
            assert_eq!(client.transport.session_token().as_deref(), Some("session-2"));
        })
        .await;
}

#[tokio::test]
async fn timeout_reports_network_failure() {
    LocalSet::new()
        .run_until(async {
            let server = start_server().await;
            let config =
                TransportConfig::new(server.url("/slow")).timeout(Duration::from_millis(100));
            let client = transport(config);
            let decoded = Rc::new(Cell::new(false));
            let flag = decoded.clone();

            client.transport.open();
            client
                .transport
                .send(move |_| {
                    flag.set(true);
                    Ok(())
                })
                .unwrap();

            until(|| !client.conn.errors().is_empty()).await;
            assert_eq!(
                client.conn.errors(),
                vec!["could not connect to the talk server".to_string()]
            );
            assert!(!decoded.get());
            assert!(!client.conn.no_reconnect());
            assert_eq!(client.transport.status_code(), 0);
        })
        .await;
}

#[tokio::test]
async fn refused_connection_reports_network_failure() {
    LocalSet::new()
        .run_until(async {
            let addr = {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                listener.local_addr().unwrap()
            };
            let client = transport(TransportConfig::new(format!("http://{addr}/S4")));

            client.transport.open();
            client.transport.send(|_| Ok(())).unwrap();

            until(|| !client.conn.errors().is_empty()).await;
            assert_eq!(client.conn.errors().len(), 1);
            assert_eq!(client.transport.status_code(), 0);
        })
        .await;
}

#[tokio::test]
async fn forbidden_is_unrecoverable() {
    LocalSet::new()
        .run_until(async {
            let server = start_server().await;
            let client = transport(TransportConfig::new(server.url("/forbidden")));

            client.transport.open();
            client.transport.send(|_| Ok(())).unwrap();

            until(|| !client.conn.errors().is_empty()).await;
            assert!(client.conn.no_reconnect());
            assert_eq!(client.transport.status_code(), 403);
            assert!(client.account.contains(talkline::ACCESS_TOKEN_KEY));
        })
        .await;
}

#[tokio::test]
async fn close_inside_continuation() {
    LocalSet::new()
        .run_until(async {
            let server = start_server().await;
            let client = transport(TransportConfig::new(server.url("/S4")));
            let done = Rc::new(Cell::new(false));
            let flag = done.clone();

            client.transport.open();
            client.transport.write(b"bye");
            client
                .transport
                .send(move |t| {
                    t.close();
                    let mut buf = [0u8; 8];
                    assert_eq!(t.read(&mut buf), 0);
                    flag.set(true);
                    Ok(())
                })
                .unwrap();

            until(|| done.get()).await;
            tokio::task::yield_now().await;
            assert!(!client.transport.is_open());
            assert!(client.conn.errors().is_empty());
        })
        .await;
}

#[tokio::test]
async fn http_client_get_with_auth() {
    LocalSet::new()
        .run_until(async {
            let server = start_server().await;
            let http = HttpClient::new(
                HyperEngine::new().unwrap(),
                HttpClientConfig::default(),
                ClientIdentity::new("ua/2.0", "APP\t2.0"),
                Rc::new(MemoryAccount::with_access_token("secret")),
            );
            let result = Rc::new(RefCell::new(None));
            let out = result.clone();

            http.post(
                server.url("/echo"),
                RequestFlags::AUTH,
                "text/plain",
                "hello",
                move |resp| {
                    *out.borrow_mut() = Some((resp.status(), resp.body().clone()));
                },
            );

            until(|| result.borrow().is_some()).await;
            let (status, body) = result.borrow().clone().unwrap();
            assert_eq!(status, 200);
            assert_eq!(&body[..], b"hello");

            let seen = server.seen();
            assert_eq!(seen[0].access.as_deref(), Some("secret"));
            assert_eq!(seen[0].user_agent.as_deref(), Some("ua/2.0"));
        })
        .await;
}

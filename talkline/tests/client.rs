//! Integration tests: RpcClient facade over the mock engine.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;
use std::time::Duration;

use talkline::testing::{MockEngine, RecordingConnection};
use talkline::{
    ClientIdentity, Error, HttpResponse, MemoryAccount, RpcClient, RpcFault, TransportConfig,
};

fn client(engine: &MockEngine) -> (RpcClient<MockEngine>, Rc<RecordingConnection>) {
    let conn = Rc::new(RecordingConnection::new());
    let client = RpcClient::new(
        engine.clone(),
        TransportConfig::new("https://talk.example.com/S4"),
        ClientIdentity::default(),
        Rc::new(MemoryAccount::with_access_token("secret")),
        conn.clone(),
    );
    (client, conn)
}

#[test]
fn send_opens_on_demand() {
    let engine = MockEngine::new();
    let (client, _conn) = client(&engine);
    assert!(!client.transport().is_open());

    client.send(|_| Ok(())).unwrap();
    assert!(client.transport().is_open());
    assert_eq!(engine.pending(), 1);
    assert_eq!(engine.live_connection_sets(), 1);

    client.send(|_| Ok(())).unwrap();
    assert_eq!(engine.live_connection_sets(), 1);
}

#[test]
fn call_encodes_then_sends() {
    let engine = MockEngine::new();
    let (client, conn) = client(&engine);
    let reply = Rc::new(RefCell::new(String::new()));
    let out = reply.clone();

    client
        .call(
            |w| {
                w.write_all(b"\x82\x21\x01")?;
                w.write_all(b"ping")?;
                Ok(())
            },
            move |t| {
                t.read_to_string(&mut out.borrow_mut())?;
                Ok(())
            },
        )
        .unwrap();

    let req = engine.respond(HttpResponse::ok("pong")).unwrap();
    assert_eq!(req.body(), b"\x82\x21\x01ping");
    assert_eq!(*reply.borrow(), "pong");
    assert_eq!(client.status_code(), 200);
    assert!(conn.errors().is_empty());
}

#[test]
fn encode_failure_sends_nothing() {
    let engine = MockEngine::new();
    let (client, _conn) = client(&engine);

    let result = client.call(
        |w| {
            w.write_all(b"partial")?;
            Err(RpcFault::Application("field out of range".into()))
        },
        |_| Ok(()),
    );
    assert!(matches!(result, Err(Error::Encode(RpcFault::Application(_)))));
    assert_eq!(engine.pending(), 0);

    client.send(|_| Ok(())).unwrap();
    let req = engine.respond(HttpResponse::ok("")).unwrap();
    assert!(req.body().is_empty());
}

#[test]
fn settings_forward_to_transport() {
    let engine = MockEngine::new();
    let (client, _conn) = client(&engine);
    client.set_url("https://talk.example.com/P4");
    client.set_timeout(Duration::from_secs(10));
    client.set_connection_limit(2);

    client.send(|_| Ok(())).unwrap();
    let queued = engine.queued_requests();
    assert_eq!(queued[0].url(), "https://talk.example.com/P4");
    assert_eq!(queued[0].timeout(), Duration::from_secs(10));
    assert_eq!(engine.pool_limits(), vec![2]);
}

#[test]
fn close_then_send_reopens() {
    let engine = MockEngine::new();
    let (client, _conn) = client(&engine);
    client.send(|_| Ok(())).unwrap();
    engine.respond(HttpResponse::ok("").with_header("x-ls", "t")).unwrap();

    client.close();
    engine.run_deferred();
    assert_eq!(engine.destroyed_connection_sets(), 1);

    client.send(|_| Ok(())).unwrap();
    let req = engine.respond(HttpResponse::ok("")).unwrap();
    assert_eq!(req.header("x-ls"), None);
    assert_eq!(engine.live_connection_sets(), 1);
}

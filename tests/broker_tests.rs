mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{plain_handler, FakeServer};
use koo_rpc::notify::ScriptedSink;
use koo_rpc::wire::{Protocol, RemoteTransport};
use koo_rpc::{FaultKind, LoginStatus, Session, WireConnection};

fn binds(s: &Session) -> u64 {
    match s.connection().map(WireConnection::transport) {
        Some(RemoteTransport::Broker(b)) => b.binds(),
        other => panic!("not a broker connection: {:?}", other),
    }
}

#[tokio::test]
async fn binding_is_resolved_once_and_reused() {
    let server = FakeServer::start(plain_handler(), None).await;
    let mut s = Session::new(Arc::new(ScriptedSink::default()));
    assert_eq!(s.login(&server.url("pyroloc"), "demo").await, LoginStatus::LoggedIn);
    assert_eq!(s.connection().unwrap().protocol(), Protocol::Broker);

    s.call("/object", "execute", &[json!("res.partner"), json!("read"), json!([1])]).await.unwrap();
    assert_eq!(binds(&s), 1);
    assert_eq!(server.count("__resolve__"), 1);
    let calls = server.calls();
    assert_eq!(calls[0].service, "rpc");
    assert_eq!(calls[1].service, "common");
}

#[tokio::test]
async fn dead_binding_is_re_resolved_once() {
    // every connection dies after the handshake plus one call, like a restarting broker
    let server = FakeServer::start(plain_handler(), Some(2)).await;
    let mut s = Session::new(Arc::new(ScriptedSink::default()));
    assert_eq!(s.login(&server.url("pyroloc"), "demo").await, LoginStatus::LoggedIn);
    // login and the context refresh each needed a binding
    assert_eq!(binds(&s), 2);
    assert_eq!(s.context().get("lang"), Some(&json!("en_US")));

    // let the server side finish closing
    tokio::time::sleep(Duration::from_millis(20)).await;
    let rows = s.call("/object", "execute", &[json!("res.partner"), json!("read"), json!([1])]).await.unwrap();
    assert_eq!(rows[0]["name"], json!("Acme"));
    assert_eq!(binds(&s), 3);
    assert_eq!(server.count("__resolve__"), 3);
}

#[tokio::test]
async fn second_failure_is_a_protocol_fault() {
    let server = FakeServer::start(plain_handler(), Some(2)).await;
    let sink = Arc::new(ScriptedSink::default());
    let mut s = Session::new(sink.clone());
    assert_eq!(s.login(&server.url("pyroloc"), "demo").await, LoginStatus::LoggedIn);
    server.stop();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = s.execute("/object", "execute", &[json!("res.partner"), json!("read"), json!([1])]).await.unwrap_err();
    assert_eq!(err.kind(), FaultKind::Protocol);
    assert_eq!(sink.errors()[0].title, "Connection Refused");
    // no retry loop: one rebind attempt only
    assert_eq!(server.count("__resolve__"), 2);
}

#[tokio::test]
async fn server_faults_do_not_rebind() {
    let server = FakeServer::start(plain_handler(), None).await;
    let mut s = Session::new(Arc::new(ScriptedSink::default()));
    s.login(&server.url("pyroloc"), "demo").await;
    let err = s.call("/object", "execute", &[json!("res.partner"), json!("frobnicate")]).await.unwrap_err();
    assert_eq!(err.kind(), FaultKind::Warning);
    assert_eq!(binds(&s), 1);
}

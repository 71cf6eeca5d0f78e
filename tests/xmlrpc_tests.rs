use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use koo_rpc::notify::ScriptedSink;
use koo_rpc::wire::xmlrpc::{decode_call, encode_fault, encode_response};
use koo_rpc::wire::Protocol;
use koo_rpc::{DatabaseAdmin, FaultKind, LoginStatus, Session};

type Log = Arc<Mutex<Vec<(String, String, Vec<Value>)>>>;

struct XmlRpcServer {
    base: String,
    log: Log,
    handle: JoinHandle<()>,
}

impl Drop for XmlRpcServer {
    fn drop(&mut self) { self.handle.abort(); }
}

fn answer(service: &str, method: &str, params: &[Value]) -> String {
    match (service, method) {
        ("common", "login") if params == [json!("demo"), json!("admin"), json!("s3cret")] => encode_response(&json!(5)),
        ("common", "login") => encode_response(&json!(false)),
        ("db", "list") => encode_response(&json!(["demo", "prod"])),
        ("db", "db_exist") => encode_response(&json!(params.first() == Some(&json!("demo")))),
        ("db", "server_version") => encode_response(&json!("5.0.16")),
        ("db", "list_lang") => encode_response(&json!([["en_US", "English"], ["fr_FR", "French / Fran\u{e7}ais"]])),
        ("object", "execute") => match params.get(4).and_then(Value::as_str) {
            Some("context_get") => encode_response(&json!({"lang": "fr_FR"})),
            Some("read") => encode_response(&json!([{"id": 1, "name": "Acme & Co <intl>", "active": true, "credit": 12.5}])),
            Some("write") => encode_fault(&json!("warning -- ConcurrencyException\n\nRecord changed"), "Traceback"),
            _ => encode_fault(&json!(1), "Traceback (most recent call last): KeyError"),
        },
        _ => encode_fault(&json!("KeyError"), "unknown service"),
    }
}

async fn start() -> XmlRpcServer {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    async fn rpc(State(log): State<Log>, Path(service): Path<String>, body: String) -> impl IntoResponse {
        match decode_call(&body) {
            Ok((method, params)) => {
                koo_rpc::tprintln!("xmlrpc server <- /{}: {}", service, body);
                let xml = answer(&service, &method, &params);
                log.lock().push((service, method, params));
                (StatusCode::OK, [(header::CONTENT_TYPE, "text/xml")], xml).into_response()
            }
            Err(e) => (StatusCode::BAD_REQUEST, e).into_response(),
        }
    }
    let app = Router::new().route("/xmlrpc/{service}", post(rpc)).with_state(log.clone());
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind 127.0.0.1:0");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("xmlrpc test server error: {e:?}");
        }
    });
    XmlRpcServer { base: format!("http://{}", addr), log, handle }
}

fn login_url(server: &XmlRpcServer) -> String { server.base.replacen("http://", "http://admin:s3cret@", 1) }

#[tokio::test]
async fn login_and_read_over_http() {
    let server = start().await;
    let mut s = Session::new(Arc::new(ScriptedSink::default()));
    assert_eq!(s.login(&login_url(&server), "demo").await, LoginStatus::LoggedIn);
    assert_eq!(s.connection().unwrap().protocol(), Protocol::XmlRpc);
    assert_eq!(s.uid(), 5);
    assert_eq!(s.context().get("lang"), Some(&json!("fr_FR")));

    let rows = s.call("/object", "execute", &[json!("res.partner"), json!("read"), json!([1])]).await.unwrap();
    assert_eq!(rows, json!([{"id": 1, "name": "Acme & Co <intl>", "active": true, "credit": 12.5}]));

    let log = server.log.lock();
    assert_eq!(log[0].0, "common");
    assert_eq!(log[0].2, vec![json!("demo"), json!("admin"), json!("s3cret")]);
    let (_, method, params) = &log[2];
    assert_eq!(method, "execute");
    assert_eq!(params[..5], [json!("demo"), json!(5), json!("s3cret"), json!("res.partner"), json!("read")]);
}

#[tokio::test]
async fn wrong_password_over_http() {
    let server = start().await;
    let mut s = Session::default();
    let url = server.base.replacen("http://", "http://admin:nope@", 1);
    assert_eq!(s.login(&url, "demo").await, LoginStatus::InvalidCredentials);
}

#[tokio::test]
async fn fault_codes_are_classified() {
    let server = start().await;
    let sink = Arc::new(ScriptedSink::default());
    let mut s = Session::new(sink.clone());
    s.login(&login_url(&server), "demo").await;

    let err = s.execute("/object", "execute", &[json!("res.partner"), json!("unlink"), json!([1])]).await.unwrap_err();
    // integer fault codes carry no type
    assert_eq!(err.kind(), FaultKind::Application);
    assert_eq!(sink.errors()[0].details, "Traceback (most recent call last): KeyError");

    // fewer than five arguments: shown as a warning, no prompt
    let err = s.execute("/object", "execute", &[json!("res.partner"), json!("write"), json!([1])]).await.unwrap_err();
    assert_eq!(err.kind(), FaultKind::Concurrency);
    assert_eq!(sink.warnings()[0].message, "Record changed");
    assert!(sink.conflicts().is_empty());
}

#[tokio::test]
async fn unknown_path_is_a_protocol_fault() {
    let server = start().await;
    let mut s = Session::default();
    s.login(&login_url(&server), "demo").await;
    let err = s.call("/no/such/service", "ping", &[]).await.unwrap_err();
    assert_eq!(err.kind(), FaultKind::Protocol);
}

#[tokio::test]
async fn database_admin_over_http() {
    let server = start().await;
    let admin = DatabaseAdmin::new(&server.base);
    assert_eq!(admin.list().await.unwrap(), vec!["demo".to_string(), "prod".to_string()]);
    assert!(admin.exists("demo").await.unwrap());
    assert!(!admin.exists("nope").await.unwrap());
    assert_eq!(admin.server_version().await.unwrap(), "5.0.16");
    let langs = admin.list_languages().await.unwrap();
    assert_eq!(langs[1], ("fr_FR".to_string(), "French / Fran\u{e7}ais".to_string()));
    assert_eq!(admin.execute("list", &[]).await.unwrap(), Some(json!(["demo", "prod"])));
    // /db calls are never authenticated
    assert!(server.log.lock().iter().all(|(svc, _, params)| svc == "db" && params.len() <= 1));
}

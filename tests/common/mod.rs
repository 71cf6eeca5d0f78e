// Shared in-process fake object servers for the integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

use koo_rpc::wire::frame;

/// `Err((code, text))` becomes a fault reply.
pub type Reply = Result<Value, (String, String)>;
pub type Handler = Arc<dyn Fn(&str, &str, &[Value]) -> Reply + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub service: String,
    pub method: String,
    pub params: Vec<Value>,
}

pub struct FakeServer {
    pub addr: SocketAddr,
    calls: Arc<Mutex<Vec<Recorded>>>,
    accept: JoinHandle<()>,
}

impl FakeServer {
    /// Frame-speaking server. With `per_connection` set, each connection is closed after
    /// that many requests, like a restarting broker.
    pub async fn start(handler: Handler, per_connection: Option<usize>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind 127.0.0.1:0");
        let addr = listener.local_addr().unwrap();
        let calls: Arc<Mutex<Vec<Recorded>>> = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&calls);
        let accept = tokio::spawn(async move {
            // connection tasks die with the accept task
            let mut conns = JoinSet::new();
            while let Ok((stream, _)) = listener.accept().await {
                conns.spawn(serve_conn(stream, Arc::clone(&handler), Arc::clone(&log), per_connection));
            }
        });
        Self { addr, calls, accept }
    }

    pub fn url(&self, scheme: &str) -> String { format!("{}://admin:secret@{}", scheme, self.addr) }

    pub fn calls(&self) -> Vec<Recorded> { self.calls.lock().clone() }

    pub fn count(&self, method: &str) -> usize { self.calls.lock().iter().filter(|c| c.method == method).count() }

    /// Calls of `/object execute` whose remote method is `remote`.
    pub fn executes(&self, remote: &str) -> Vec<Recorded> {
        self.calls.lock().iter().filter(|c| c.service == "object" && c.params.get(4).and_then(Value::as_str) == Some(remote)).cloned().collect()
    }

    pub fn stop(&self) { self.accept.abort(); }
}

impl Drop for FakeServer {
    fn drop(&mut self) { self.accept.abort(); }
}

async fn serve_conn(mut stream: TcpStream, handler: Handler, log: Arc<Mutex<Vec<Recorded>>>, per_connection: Option<usize>) {
    let mut served = 0usize;
    while let Ok(req) = frame::read_frame(&mut stream).await {
        let Ok((service, method, params)) = frame::decode_request(&req.body) else { return };
        koo_rpc::tprintln!("fake server <- {} {} {}", service, method, Value::Array(params.clone()));
        log.lock().push(Recorded { service: service.clone(), method: method.clone(), params: params.clone() });
        let written = match handler(&service, &method, &params) {
            Ok(v) => frame::write_frame(&mut stream, false, &serde_json::to_vec(&v).unwrap()).await,
            Err((code, text)) => frame::write_frame(&mut stream, true, &frame::fault_body(&code, &text)).await,
        };
        if written.is_err() { return; }
        served += 1;
        if per_connection.is_some_and(|max| served >= max) { return; }
    }
}

pub const UID: i64 = 7;

/// A server that knows `admin`/`secret` on `demo` and answers the usual object calls.
/// `extra` gets the first say on every authenticated `/object execute` call as
/// `(model, method, rest)`.
pub fn erp_handler<F>(extra: F) -> Handler
where
    F: Fn(&str, &str, &[Value]) -> Option<Reply> + Send + Sync + 'static,
{
    Arc::new(move |service: &str, method: &str, params: &[Value]| -> Reply {
        match (service, method) {
            ("rpc", "__resolve__") => Ok(json!(true)),
            ("common", "login") => {
                if params == [json!("demo"), json!("admin"), json!("secret")] { Ok(json!(UID)) } else { Ok(json!(false)) }
            }
            ("db", "list") => Ok(json!(["demo", "prod"])),
            ("object", "execute") => {
                if params.get(..3) != Some(&[json!("demo"), json!(UID), json!("secret")][..]) {
                    return Err(("AccessDenied".into(), "bad credentials".into()));
                }
                let model = params.get(3).and_then(Value::as_str).unwrap_or_default();
                let remote = params.get(4).and_then(Value::as_str).unwrap_or_default();
                let rest = params.get(5..).unwrap_or_default();
                if let Some(reply) = extra(model, remote, rest) { return reply; }
                match (model, remote) {
                    ("res.users", "context_get") => Ok(json!({"lang": "en_US", "tz": "Europe/Brussels"})),
                    (_, "read") => Ok(json!([{"id": 1, "name": "Acme"}])),
                    (_, "fields_view_get") => Ok(json!({"arch": "<form/>", "fields": {}})),
                    _ => Err((format!("warning -- Object Error\n\nno method {}", remote), "Traceback".into())),
                }
            }
            _ => Err(("KeyError".into(), format!("unknown service {}", service))),
        }
    })
}

pub fn plain_handler() -> Handler { erp_handler(|_, _, _| None) }

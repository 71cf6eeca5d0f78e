//! Wire connections to the object server.
//!
//! A [`WireConnection`] carries one request/response pair at a time over one of the
//! interchangeable transports in [`RemoteTransport`]. Authorized connections inject
//! `(database, uid, password)` right after the method name on every protocol.

pub mod frame;
pub mod xmlrpc;
mod broker;
mod socket;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Fault, RpcResult};
use crate::login_url::redact;

pub use broker::BrokerTransport;
pub use socket::SocketTransport;
pub use xmlrpc::XmlRpcTransport;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Framed binary socket, one TCP connection per call.
    Socket,
    /// XML-RPC over HTTP(S).
    XmlRpc,
    /// Legacy object broker: one persistent, stateful binding.
    Broker,
}

impl Protocol {
    /// Closed switch from URL scheme to transport; unknown schemes speak XML-RPC.
    pub fn from_scheme(scheme: &str) -> Self {
        match scheme.to_ascii_lowercase().as_str() {
            "socket" => Protocol::Socket,
            "pyroloc" => Protocol::Broker,
            _ => Protocol::XmlRpc,
        }
    }

    pub fn default_port(&self, scheme: &str) -> u16 {
        match self {
            Protocol::Socket => 8070,
            Protocol::Broker => 8071,
            Protocol::XmlRpc if scheme.eq_ignore_ascii_case("https") => 443,
            Protocol::XmlRpc => 80,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Socket => "socket",
            Protocol::XmlRpc => "xmlrpc",
            Protocol::Broker => "broker",
        }
    }
}

/// Identity bound to a connection. At most one is bound at a time.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub database: String,
    pub uid: i64,
    pub password: String,
    pub authorized: bool,
}

impl Credentials {
    /// Values injected between the method name and the caller's arguments.
    pub fn header(&self) -> Vec<Value> {
        if !self.authorized { return Vec::new(); }
        vec![Value::from(self.database.clone()), Value::from(self.uid), Value::from(self.password.clone())]
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("database", &self.database)
            .field("uid", &self.uid)
            .field("password", &"***")
            .field("authorized", &self.authorized)
            .finish()
    }
}

#[derive(Debug)]
pub enum RemoteTransport {
    Socket(SocketTransport),
    XmlRpc(XmlRpcTransport),
    Broker(BrokerTransport),
}

impl RemoteTransport {
    async fn call(&mut self, creds: &Credentials, target: &str, method: &str, args: &[Value]) -> RpcResult<Value> {
        match self {
            RemoteTransport::Socket(s) => s.call(creds, target, method, args).await,
            RemoteTransport::XmlRpc(x) => x.call(creds, target, method, args).await,
            RemoteTransport::Broker(b) => b.call(creds, target, method, args).await,
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            RemoteTransport::Socket(_) => Protocol::Socket,
            RemoteTransport::XmlRpc(_) => Protocol::XmlRpc,
            RemoteTransport::Broker(_) => Protocol::Broker,
        }
    }

    pub fn ident(&self) -> String {
        match self {
            RemoteTransport::Socket(s) => format!("socket:{}", s.addr()),
            RemoteTransport::XmlRpc(x) => format!("xmlrpc:{}", x.base()),
            RemoteTransport::Broker(b) => format!("broker:{}", b.uri()),
        }
    }
}

/// A connection exclusively owned by one session.
#[derive(Debug)]
pub struct WireConnection {
    id: u64,
    endpoint: String,
    credentials: Credentials,
    transport: RemoteTransport,
}

impl WireConnection {
    /// Pick the transport for `endpoint` (`scheme://host:port`). No I/O happens here.
    pub fn create(endpoint: &str) -> RpcResult<Self> { Self::create_with(endpoint, None) }

    pub fn create_with(endpoint: &str, connect_timeout: Option<Duration>) -> RpcResult<Self> {
        let url = Url::parse(endpoint).map_err(|e| Fault::protocol(format!("invalid endpoint '{}': {}", redact(endpoint), e)))?;
        let protocol = Protocol::from_scheme(url.scheme());
        let host = url.host_str().filter(|h| !h.is_empty())
            .ok_or_else(|| Fault::protocol(format!("endpoint '{}' has no host", redact(endpoint))))?;
        let port = url.port().unwrap_or_else(|| protocol.default_port(url.scheme()));
        let addr = format!("{}:{}", host, port);
        let endpoint = format!("{}://{}", url.scheme(), addr);
        let transport = match protocol {
            Protocol::Socket => RemoteTransport::Socket(SocketTransport::new(addr, connect_timeout)),
            Protocol::Broker => RemoteTransport::Broker(BrokerTransport::new(addr, &endpoint, connect_timeout)),
            Protocol::XmlRpc => RemoteTransport::XmlRpc(XmlRpcTransport::new(&endpoint, connect_timeout)?),
        };
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(target: "koo::wire", "connection #{} created: {}", id, transport.ident());
        Ok(Self { id, endpoint, credentials: Credentials::default(), transport })
    }

    /// Process-unique instance id; copies of a session never share one.
    pub fn id(&self) -> u64 { self.id }

    pub fn protocol(&self) -> Protocol { self.transport.protocol() }

    pub fn endpoint(&self) -> &str { &self.endpoint }

    pub fn transport(&self) -> &RemoteTransport { &self.transport }

    pub fn credentials(&self) -> &Credentials { &self.credentials }

    pub fn is_authorized(&self) -> bool { self.credentials.authorized }

    /// Bind an identity, replacing any previous one.
    pub fn authorize(&mut self, database: &str, uid: i64, password: &str) {
        self.credentials = Credentials { database: database.to_string(), uid, password: password.to_string(), authorized: true };
    }

    pub fn deauthorize(&mut self) { self.credentials = Credentials::default(); }

    pub async fn call(&mut self, target: &str, method: &str, args: &[Value]) -> RpcResult<Value> {
        debug!(target: "koo::wire", "#{} {} {} {} args={}", self.id, self.transport.protocol().name(), target, method, args.len());
        self.transport.call(&self.credentials, target, method, args).await
    }
}

/// Strip the leading slash of a target path (`/object` -> `object`).
pub(crate) fn service_name(target: &str) -> &str { target.strip_prefix('/').unwrap_or(target) }

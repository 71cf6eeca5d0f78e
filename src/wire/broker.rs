use std::io;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::{Fault, RpcResult};
use crate::wire::{frame, socket, Credentials};

/// Object the broker exposes for dispatch.
pub const BROKER_OBJECT: &str = "rpc";
/// Handshake method that resolves [`BROKER_OBJECT`] on a new binding.
pub const RESOLVE_METHOD: &str = "__resolve__";

/// Stateful broker binding. The stream stays open across calls, so a server restart
/// leaves it dead until it is re-resolved.
#[derive(Debug)]
pub struct BrokerTransport {
    addr: String,
    uri: String,
    connect_timeout: Option<Duration>,
    stream: Option<TcpStream>,
    binds: u64,
}

impl BrokerTransport {
    pub fn new(addr: String, endpoint: &str, connect_timeout: Option<Duration>) -> Self {
        Self { addr, uri: format!("{}/{}", endpoint, BROKER_OBJECT), connect_timeout, stream: None, binds: 0 }
    }

    pub fn uri(&self) -> &str { &self.uri }

    /// How many times the remote object has been resolved.
    pub fn binds(&self) -> u64 { self.binds }

    pub fn is_bound(&self) -> bool { self.stream.is_some() }

    pub async fn call(&mut self, creds: &Credentials, target: &str, method: &str, args: &[Value]) -> RpcResult<Value> {
        let body = frame::request_body(creds, target, method, args)?;
        let was_bound = self.stream.is_some();
        match self.round_trip(&body).await {
            Ok(reply) => frame::decode_reply(reply),
            Err(BrokerError::Io(e)) if was_bound && is_dead_binding(&e) => {
                warn!(target: "koo::wire", "broker binding {} is dead ({}); re-resolving once", self.uri, e);
                self.stream = None;
                match self.round_trip(&body).await {
                    Ok(reply) => frame::decode_reply(reply),
                    Err(err) => { self.stream = None; Err(err.into()) }
                }
            }
            Err(err) => { self.stream = None; Err(err.into()) }
        }
    }

    async fn round_trip(&mut self, body: &[u8]) -> Result<frame::Frame, BrokerError> {
        if self.stream.is_none() {
            let bound = self.bind().await?;
            self.stream = Some(bound);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(BrokerError::Io(io::Error::new(io::ErrorKind::NotConnected, "broker not bound")));
        };
        frame::write_frame(stream, false, body).await?;
        Ok(frame::read_frame(stream).await?)
    }

    async fn bind(&mut self) -> Result<TcpStream, BrokerError> {
        let mut stream = socket::connect(&self.addr, self.connect_timeout).await.map_err(BrokerError::Fault)?;
        let hello = frame::request_body(&Credentials::default(), BROKER_OBJECT, RESOLVE_METHOD, &[])
            .map_err(BrokerError::Fault)?;
        frame::write_frame(&mut stream, false, &hello).await?;
        let reply = frame::read_frame(&mut stream).await?;
        if let Err(fault) = frame::decode_reply(reply) {
            return Err(BrokerError::Fault(Fault::protocol(format!("broker cannot resolve {}: {}", self.uri, fault))));
        }
        self.binds += 1;
        debug!(target: "koo::wire", "broker bound to {} (bind #{})", self.uri, self.binds);
        Ok(stream)
    }
}

#[derive(Debug)]
enum BrokerError {
    Io(io::Error),
    Fault(Fault),
}

impl From<io::Error> for BrokerError {
    fn from(e: io::Error) -> Self { BrokerError::Io(e) }
}

impl From<BrokerError> for Fault {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::Io(io) => Fault::from(io),
            BrokerError::Fault(f) => f,
        }
    }
}

fn is_dead_binding(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}

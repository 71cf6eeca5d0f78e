use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::{Fault, RpcResult};
use crate::wire::{frame, Credentials};

/// One fresh TCP connection per call; nothing is pooled.
#[derive(Debug, Clone)]
pub struct SocketTransport {
    addr: String,
    connect_timeout: Option<Duration>,
}

impl SocketTransport {
    pub fn new(addr: String, connect_timeout: Option<Duration>) -> Self { Self { addr, connect_timeout } }

    pub fn addr(&self) -> &str { &self.addr }

    pub async fn call(&self, creds: &Credentials, target: &str, method: &str, args: &[Value]) -> RpcResult<Value> {
        let body = frame::request_body(creds, target, method, args)?;
        let mut stream = connect(&self.addr, self.connect_timeout).await?;
        frame::write_frame(&mut stream, false, &body).await?;
        let reply = frame::read_frame(&mut stream).await?;
        // best-effort close; the reply is already in hand
        let _ = stream.shutdown().await;
        frame::decode_reply(reply)
    }
}

pub(crate) async fn connect(addr: &str, timeout: Option<Duration>) -> RpcResult<TcpStream> {
    let stream = match timeout {
        Some(t) => tokio::time::timeout(t, TcpStream::connect(addr))
            .await
            .map_err(|_| Fault::protocol(format!("connect to {} timed out after {} ms", addr, t.as_millis())))??,
        None => TcpStream::connect(addr).await?,
    };
    stream.set_nodelay(true)?;
    Ok(stream)
}

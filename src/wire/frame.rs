//! Length-prefixed frames shared by the socket and broker transports.
//!
//! Layout: 8 ASCII digits of body length (left-aligned, space padded), one flag byte
//! (`'0'` reply, `'1'` fault), then a JSON body. Requests are the JSON array
//! `[service, method, (db, uid, password)?, args...]`; fault bodies are `[code, string]`.

use std::io;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Fault, RpcResult, ServerFault};
use crate::wire::{service_name, Credentials};

pub const SIZE_LEN: usize = 8;
pub const HEADER_LEN: usize = SIZE_LEN + 1;
/// Largest body the 8-digit size field can announce.
pub const MAX_FRAME_LEN: usize = 99_999_999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fault: bool,
    pub body: Vec<u8>,
}

pub fn request_body(creds: &Credentials, target: &str, method: &str, args: &[Value]) -> RpcResult<Vec<u8>> {
    let mut items: Vec<Value> = Vec::with_capacity(2 + 3 + args.len());
    items.push(Value::from(service_name(target)));
    items.push(Value::from(method));
    items.extend(creds.header());
    items.extend(args.iter().cloned());
    serde_json::to_vec(&Value::Array(items)).map_err(|e| Fault::protocol(format!("cannot encode request: {}", e)))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, fault: bool, body: &[u8]) -> io::Result<()> {
    if body.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("frame too large: {} bytes", body.len())));
    }
    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.extend_from_slice(format!("{:<width$}", body.len(), width = SIZE_LEN).as_bytes());
    buf.push(if fault { b'1' } else { b'0' });
    buf.extend_from_slice(body);
    w.write_all(&buf).await?;
    w.flush().await
}

pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<Frame> {
    let mut header = [0u8; HEADER_LEN];
    r.read_exact(&mut header).await?;
    let (len, fault) = parse_header(&header)?;
    // grows with what actually arrives, not with the announced size
    let mut body = Vec::new();
    (&mut *r).take(len as u64).read_to_end(&mut body).await?;
    if body.len() < len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, format!("frame body cut short: {} of {} bytes", body.len(), len)));
    }
    Ok(Frame { fault, body })
}

pub fn parse_header(header: &[u8; HEADER_LEN]) -> io::Result<(usize, bool)> {
    let size = std::str::from_utf8(&header[..SIZE_LEN])
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed frame size"))?;
    if size > MAX_FRAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame size out of range"));
    }
    let fault = match header[SIZE_LEN] {
        b'0' => false,
        b'1' => true,
        other => return Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown frame flag 0x{:02x}", other))),
    };
    Ok((size, fault))
}

/// Turn a reply frame into the call result or the server fault it carries.
pub fn decode_reply(frame: Frame) -> RpcResult<Value> {
    let body: Value = serde_json::from_slice(&frame.body)
        .map_err(|e| Fault::protocol(format!("malformed reply body: {}", e)))?;
    if !frame.fault { return Ok(body); }
    match body {
        Value::Array(mut parts) if parts.len() == 2 => {
            let text = match parts.pop() { Some(Value::String(s)) => s, Some(other) => other.to_string(), None => String::new() };
            match parts.pop() {
                Some(Value::String(code)) => Err(Fault::Server(ServerFault::from_code(code, text))),
                _ => Err(Fault::Server(ServerFault::untyped(text))),
            }
        }
        other => Err(Fault::protocol(format!("malformed fault body: {}", other))),
    }
}

/// Server side of a request: `(service, method, remaining params)`.
pub fn decode_request(body: &[u8]) -> io::Result<(String, String, Vec<Value>)> {
    let invalid = |m: &str| io::Error::new(io::ErrorKind::InvalidData, m.to_string());
    let parts: Vec<Value> = serde_json::from_slice(body).map_err(|e| invalid(&e.to_string()))?;
    let mut it = parts.into_iter();
    let service = it.next().and_then(|v| v.as_str().map(str::to_string)).ok_or_else(|| invalid("missing service"))?;
    let method = it.next().and_then(|v| v.as_str().map(str::to_string)).ok_or_else(|| invalid("missing method"))?;
    Ok((service, method, it.collect()))
}

pub fn fault_body(code: &str, text: &str) -> Vec<u8> {
    // serializing two strings cannot fail
    serde_json::to_vec(&Value::Array(vec![Value::from(code), Value::from(text)])).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn header_is_padded_length_then_flag() {
        let mut out: Vec<u8> = Vec::new();
        write_frame(&mut out, false, b"[1]").await.unwrap();
        assert_eq!(&out, b"3       0[1]");
    }

    #[tokio::test]
    async fn read_back_written_fault_frame() {
        let mut out: Vec<u8> = Vec::new();
        write_frame(&mut out, true, &fault_body("warning -- x", "bt")).await.unwrap();
        let mut rd: &[u8] = &out;
        let frame = read_frame(&mut rd).await.unwrap();
        assert!(frame.fault);
        match decode_reply(frame) {
            Err(Fault::Server(s)) => { assert_eq!(s.kind, "warning"); assert_eq!(s.info, "x"); assert_eq!(s.backtrace, "bt"); }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn announced_size_beyond_the_data_is_unexpected_eof() {
        // the largest announceable body, but only three bytes follow
        let mut rd: &[u8] = b"999999990[1]";
        let err = read_frame(&mut rd).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn request_injects_credentials_after_method() {
        let creds = Credentials { database: "demo".into(), uid: 3, password: "secret".into(), authorized: true };
        let body = request_body(&creds, "/object", "execute", &[json!("res.partner"), json!("read")]).unwrap();
        let (service, method, params) = decode_request(&body).unwrap();
        assert_eq!(service, "object");
        assert_eq!(method, "execute");
        assert_eq!(params, vec![json!("demo"), json!(3), json!("secret"), json!("res.partner"), json!("read")]);
    }

    #[test]
    fn unauthorized_request_has_no_credentials() {
        let body = request_body(&Credentials::default(), "/common", "login", &[json!("demo"), json!("admin"), json!("pw")]).unwrap();
        let (_, _, params) = decode_request(&body).unwrap();
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn bad_headers_are_invalid_data() {
        assert!(parse_header(b"abc     0").is_err());
        assert!(parse_header(b"12      7").is_err());
        assert_eq!(parse_header(b"12      1").unwrap(), (12, true));
    }

    #[test]
    fn malformed_bodies_are_protocol_faults() {
        let f = decode_reply(Frame { fault: false, body: b"{not json".to_vec() }).unwrap_err();
        assert!(matches!(f, Fault::Protocol(_)));
        let f = decode_reply(Frame { fault: true, body: b"\"just text\"".to_vec() }).unwrap_err();
        assert!(matches!(f, Fault::Protocol(_)));
    }

    #[test]
    fn non_textual_fault_code_is_untyped() {
        let body = serde_json::to_vec(&json!([42, "ZeroDivisionError"])).unwrap();
        match decode_reply(Frame { fault: true, body }) {
            Err(Fault::Server(s)) => { assert_eq!(s.kind, "error"); assert_eq!(s.info, "ZeroDivisionError"); }
            other => panic!("unexpected {:?}", other),
        }
    }
}

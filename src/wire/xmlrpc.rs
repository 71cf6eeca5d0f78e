//! XML-RPC transport and the value codec behind it.
//!
//! Only the subset the object server speaks is handled: scalars, `nil`, `dateTime.iso8601`,
//! `base64` (kept as text), arrays and structs. Integers outside the i32 range go out as
//! `double`, the only portable choice for classic XML-RPC peers.

use std::time::Duration;

use chrono::NaiveDateTime;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde_json::{Map, Number, Value};

use crate::error::{Fault, RpcResult, ServerFault};
use crate::wire::Credentials;

pub const XMLRPC_PATH: &str = "/xmlrpc";

#[derive(Debug, Clone)]
pub struct XmlRpcTransport {
    base: String,
    client: reqwest::Client,
}

impl XmlRpcTransport {
    pub fn new(endpoint: &str, connect_timeout: Option<Duration>) -> RpcResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = connect_timeout { builder = builder.connect_timeout(t); }
        let client = builder.build()?;
        Ok(Self { base: format!("{}{}", endpoint, XMLRPC_PATH), client })
    }

    pub fn base(&self) -> &str { &self.base }

    pub async fn call(&self, creds: &Credentials, target: &str, method: &str, args: &[Value]) -> RpcResult<Value> {
        let mut params = creds.header();
        params.extend(args.iter().cloned());
        let url = format!("{}{}", self.base, target);
        let resp = self.client
            .post(url)
            .header(CONTENT_TYPE, HeaderValue::from_static("text/xml"))
            .body(encode_call(method, &params))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Fault::protocol(format!("HTTP {} from {}{}", status, self.base, target)));
        }
        let text = resp.text().await?;
        decode_response(&text)
    }
}

// ---------------------------------------------------------------------------------------
// encoding

pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for p in params {
        out.push_str("<param>");
        encode_value(p, &mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>\n");
    out
}

pub fn encode_response(value: &Value) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodResponse><params><param>");
    encode_value(value, &mut out);
    out.push_str("</param></params></methodResponse>\n");
    out
}

pub fn encode_fault(code: &Value, text: &str) -> String {
    let mut fault = Map::new();
    fault.insert("faultCode".into(), code.clone());
    fault.insert("faultString".into(), Value::from(text));
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodResponse><fault>");
    encode_value(&Value::Object(fault), &mut out);
    out.push_str("</fault></methodResponse>\n");
    out
}

fn encode_value(v: &Value, out: &mut String) {
    out.push_str("<value>");
    match v {
        Value::Null => out.push_str("<nil/>"),
        Value::Bool(b) => { out.push_str("<boolean>"); out.push(if *b { '1' } else { '0' }); out.push_str("</boolean>"); }
        Value::Number(n) => match n.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => out.push_str(&format!("<int>{}</int>", i)),
            _ => out.push_str(&format!("<double>{}</double>", n.as_f64().unwrap_or(0.0))),
        },
        Value::String(s) => { out.push_str("<string>"); out.push_str(&escape(s.as_str())); out.push_str("</string>"); }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for it in items { encode_value(it, out); }
            out.push_str("</data></array>");
        }
        Value::Object(map) => {
            out.push_str("<struct>");
            for (k, it) in map {
                out.push_str("<member><name>");
                out.push_str(&escape(k.as_str()));
                out.push_str("</name>");
                encode_value(it, out);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

// ---------------------------------------------------------------------------------------
// decoding

#[derive(Debug, Default)]
struct Node {
    name: String,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn child(&self, name: &str) -> Option<&Node> { self.children.iter().find(|c| c.name == name) }
}

fn parse_tree(xml: &str) -> Result<Node, String> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Node> = vec![Node::default()];
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.push(Node { name, ..Node::default() });
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if let Some(top) = stack.last_mut() { top.children.push(Node { name, ..Node::default() }); }
            }
            Ok(Event::Text(t)) => {
                let s = t.unescape().map_err(|e| e.to_string())?;
                if let Some(top) = stack.last_mut() { top.text.push_str(&s); }
            }
            Ok(Event::CData(c)) => {
                let raw = c.into_inner();
                if let Some(top) = stack.last_mut() { top.text.push_str(&String::from_utf8_lossy(&raw)); }
            }
            Ok(Event::End(_)) => {
                let node = stack.pop().ok_or("unbalanced end tag")?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Err("unbalanced end tag".into()),
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(format!("at byte {}: {}", reader.buffer_position(), e)),
        }
    }
    if stack.len() != 1 { return Err("unclosed element".into()); }
    let root = stack.pop().ok_or("empty document")?;
    root.children.into_iter().next().ok_or_else(|| "empty document".to_string())
}

/// Decode a `<methodResponse>` into the result or the fault it carries.
pub fn decode_response(xml: &str) -> RpcResult<Value> {
    let bad = |m: String| Fault::protocol(format!("malformed XML-RPC response: {}", m));
    let root = parse_tree(xml).map_err(bad)?;
    if root.name != "methodResponse" {
        return Err(bad(format!("unexpected root <{}>", root.name)));
    }
    if let Some(fault) = root.child("fault") {
        let v = fault.child("value").ok_or_else(|| bad("fault without value".into()))?;
        let fv = decode_value(v).map_err(bad)?;
        let text = match fv.get("faultString") { Some(Value::String(s)) => s.clone(), Some(other) => other.to_string(), None => String::new() };
        return Err(match fv.get("faultCode") {
            Some(Value::String(code)) => Fault::Server(ServerFault::from_code(code.clone(), text)),
            _ => Fault::Server(ServerFault::untyped(text)),
        });
    }
    let value = root.child("params")
        .and_then(|p| p.child("param"))
        .and_then(|p| p.child("value"))
        .ok_or_else(|| bad("missing params/param/value".into()))?;
    decode_value(value).map_err(bad)
}

/// Server side of a call: `(method, params)`.
pub fn decode_call(xml: &str) -> Result<(String, Vec<Value>), String> {
    let root = parse_tree(xml)?;
    if root.name != "methodCall" { return Err(format!("unexpected root <{}>", root.name)); }
    let method = root.child("methodName").map(|n| n.text.trim().to_string()).ok_or("missing methodName")?;
    let mut params = Vec::new();
    if let Some(ps) = root.child("params") {
        for p in ps.children.iter().filter(|c| c.name == "param") {
            let v = p.child("value").ok_or("param without value")?;
            params.push(decode_value(v)?);
        }
    }
    Ok((method, params))
}

fn decode_value(node: &Node) -> Result<Value, String> {
    let Some(inner) = node.children.first() else {
        // untyped value content is a string
        return Ok(Value::String(node.text.clone()));
    };
    let text = inner.text.trim();
    match inner.name.as_str() {
        "int" | "i4" | "i8" => text.parse::<i64>().map(Value::from).map_err(|e| format!("bad integer '{}': {}", text, e)),
        "boolean" => match text {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            other => Err(format!("bad boolean '{}'", other)),
        },
        "double" => {
            let f = text.parse::<f64>().map_err(|e| format!("bad double '{}': {}", text, e))?;
            Number::from_f64(f).map(Value::Number).ok_or_else(|| format!("non-finite double '{}'", text))
        }
        "string" => Ok(Value::String(inner.text.clone())),
        "nil" => Ok(Value::Null),
        "dateTime.iso8601" => Ok(Value::String(normalize_datetime(text))),
        "base64" => Ok(Value::String(text.split_whitespace().collect())),
        "array" => {
            let data = inner.child("data").ok_or("array without data")?;
            data.children.iter().filter(|c| c.name == "value").map(decode_value).collect::<Result<Vec<_>, _>>().map(Value::Array)
        }
        "struct" => {
            let mut map = Map::new();
            for m in inner.children.iter().filter(|c| c.name == "member") {
                let name = m.child("name").map(|n| n.text.clone()).ok_or("member without name")?;
                let v = m.child("value").ok_or("member without value")?;
                map.insert(name, decode_value(v)?);
            }
            Ok(Value::Object(map))
        }
        other => Err(format!("unsupported type <{}>", other)),
    }
}

// `20200101T00:00:00` -> `2020-01-01 00:00:00`, the server's own datetime format.
fn normalize_datetime(text: &str) -> String {
    for fmt in ["%Y%m%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y%m%dT%H%M%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return dt.format("%Y-%m-%d %H:%M:%S").to_string();
        }
    }
    text.to_string()
}

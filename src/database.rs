//! Unauthenticated `/db` service: listing, probing and version queries that happen
//! before anyone logs in. Every call opens its own throwaway connection.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{Fault, RpcResult};
use crate::notify::{Notice, NotificationSink, TracingSink};
use crate::wire::WireConnection;

const DB_TARGET: &str = "/db";

pub struct DatabaseAdmin {
    url: String,
    connect_timeout: Option<Duration>,
    sink: Arc<dyn NotificationSink>,
}

impl DatabaseAdmin {
    /// `url` is any server URL; credentials in it are ignored.
    pub fn new(url: &str) -> Self {
        Self { url: url.to_string(), connect_timeout: None, sink: Arc::new(TracingSink) }
    }

    pub fn with_config(url: &str, config: &ClientConfig, sink: Arc<dyn NotificationSink>) -> Self {
        Self { url: url.to_string(), connect_timeout: config.connect_timeout(), sink }
    }

    pub async fn call(&self, method: &str, args: &[Value]) -> RpcResult<Value> {
        let mut connection = WireConnection::create_with(&self.url, self.connect_timeout)?;
        debug!(target: "koo::rpc", "{} {} on {}", DB_TARGET, method, connection.endpoint());
        connection.call(DB_TARGET, method, args).await
    }

    /// Like [`DatabaseAdmin::call`], but an unreachable server is reported through the
    /// sink and yields `None`. Server faults are still returned.
    pub async fn execute(&self, method: &str, args: &[Value]) -> RpcResult<Option<Value>> {
        match self.call(method, args).await {
            Ok(v) => Ok(Some(v)),
            Err(Fault::Protocol(p)) => {
                warn!(target: "koo::rpc", "{} {} failed: {}", DB_TARGET, method, p);
                self.sink.notify_warning(&Notice {
                    title: String::new(),
                    message: "Could not contact server!".to_string(),
                    details: p.message,
                });
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    pub async fn list(&self) -> RpcResult<Vec<String>> {
        let v = self.call("list", &[]).await?;
        string_list(&v).ok_or_else(|| Fault::protocol(format!("unexpected database list: {}", v)))
    }

    pub async fn exists(&self, name: &str) -> RpcResult<bool> {
        let v = self.call("db_exist", &[Value::from(name)]).await?;
        Ok(crate::expr::truthy(&v))
    }

    pub async fn server_version(&self) -> RpcResult<String> {
        match self.call("server_version", &[]).await? {
            Value::String(s) => Ok(s),
            other => Err(Fault::protocol(format!("unexpected server version: {}", other))),
        }
    }

    /// `(code, name)` pairs such as `("fr_FR", "French / Français")`.
    pub async fn list_languages(&self) -> RpcResult<Vec<(String, String)>> {
        let v = self.call("list_lang", &[]).await?;
        let pairs = v.as_array().map(|items| {
            items.iter().filter_map(|pair| {
                let p = pair.as_array()?;
                Some((p.first()?.as_str()?.to_string(), p.get(1)?.as_str()?.to_string()))
            }).collect()
        });
        pairs.ok_or_else(|| Fault::protocol(format!("unexpected language list: {}", v)))
    }
}

fn string_list(v: &Value) -> Option<Vec<String>> {
    v.as_array()?.iter().map(|s| s.as_str().map(str::to_string)).collect()
}

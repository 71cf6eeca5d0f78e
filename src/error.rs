//! Client-side fault model for remote object calls.
//! Every transport maps its failures into [`Fault`]; callers classify with [`Fault::kind`]
//! to decide how (and whether) a human should be told.

use serde::{Deserialize, Serialize};

/// Server info tag identifying a stale write.
pub const CONCURRENCY_INFO: &str = "ConcurrencyException";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Fault {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("{0}")]
    Protocol(#[from] ProtocolFault),
    #[error("{0}")]
    Server(#[from] ServerFault),
}

/// Network or transport failure: refused connections, broken sockets, malformed frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("protocol error: {message}")]
pub struct ProtocolFault {
    pub message: String,
}

/// Application fault raised by the remote object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {info}")]
pub struct ServerFault {
    /// Raw fault code as sent by the server, when it was textual.
    pub code: Option<String>,
    /// Leading tag of the code (`warning`, `UserError`, `AccessDenied`, ...), or `error`.
    pub kind: String,
    pub info: String,
    pub data: String,
    pub backtrace: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Protocol,
    Warning,
    Concurrency,
    Application,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Blocking error presentation.
    Error,
    /// Non-blocking message.
    Warning,
    /// Needs an explicit decision from the user.
    Prompt,
}

/// What a notification sink is asked to show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub message: String,
    pub details: String,
}

impl ProtocolFault {
    pub fn new<S: Into<String>>(message: S) -> Self { Self { message: message.into() } }
}

impl ServerFault {
    /// Build from a textual fault code. The first line reads `<kind> -- <info>`;
    /// lines after the second are the fault data.
    pub fn from_code<C: Into<String>, B: Into<String>>(code: C, backtrace: B) -> Self {
        let code = code.into();
        let backtrace = backtrace.into();
        let lines: Vec<&str> = code.split('\n').collect();
        let head = lines.first().copied().unwrap_or("");
        let (kind, info) = match head.split_once(" -- ") {
            Some((k, rest)) => {
                // only the segment up to the next separator is the info tag
                let info = rest.split(" -- ").next().unwrap_or("");
                (k.to_string(), info.to_string())
            }
            None => (head.to_string(), String::new()),
        };
        let data = if lines.len() > 2 { lines[2..].join("\n") } else { String::new() };
        Self { code: Some(code), kind, info, data, backtrace }
    }

    /// Build from a non-textual fault code (e.g. an XML-RPC integer code).
    pub fn untyped<B: Into<String>>(backtrace: B) -> Self {
        let backtrace = backtrace.into();
        Self { code: None, kind: "error".to_string(), info: backtrace.clone(), data: backtrace.clone(), backtrace }
    }

    pub fn is_soft(&self) -> bool { self.kind == "warning" || self.kind == "UserError" }

    pub fn is_concurrency(&self) -> bool { self.is_soft() && self.info == CONCURRENCY_INFO }
}

impl Fault {
    pub fn protocol<S: Into<String>>(message: S) -> Self { Fault::Protocol(ProtocolFault::new(message)) }

    pub fn server<C: Into<String>, B: Into<String>>(code: C, backtrace: B) -> Self {
        Fault::Server(ServerFault::from_code(code, backtrace))
    }

    pub fn kind(&self) -> FaultKind {
        match self {
            Fault::NotLoggedIn | Fault::Protocol(_) => FaultKind::Protocol,
            Fault::Server(s) if s.is_concurrency() => FaultKind::Concurrency,
            Fault::Server(s) if s.is_soft() => FaultKind::Warning,
            Fault::Server(_) => FaultKind::Application,
        }
    }

    pub fn as_server(&self) -> Option<&ServerFault> {
        match self { Fault::Server(s) => Some(s), _ => None }
    }

    /// Human-readable summary line.
    pub fn info(&self) -> String {
        match self {
            Fault::NotLoggedIn => "Not logged in".to_string(),
            Fault::Protocol(p) => p.message.clone(),
            Fault::Server(s) => s.info.clone(),
        }
    }

    /// Notice for the error/warning presentation paths. Concurrency faults are shown
    /// as warnings when they cannot be resolved (no values map to retry with).
    pub fn notice(&self) -> Notice {
        match self {
            Fault::NotLoggedIn => Notice { title: "Not logged in".into(), message: String::new(), details: String::new() },
            Fault::Protocol(p) => Notice { title: "Connection Refused".into(), message: p.message.clone(), details: p.message.clone() },
            Fault::Server(s) if s.is_soft() => Notice { title: s.info.clone(), message: s.data.clone(), details: String::new() },
            Fault::Server(s) => Notice { title: "Application Error".into(), message: "View details".into(), details: s.backtrace.clone() },
        }
    }
}

impl FaultKind {
    pub fn severity(&self) -> Severity {
        match self {
            FaultKind::Protocol | FaultKind::Application => Severity::Error,
            FaultKind::Warning => Severity::Warning,
            FaultKind::Concurrency => Severity::Prompt,
        }
    }
}

pub type RpcResult<T> = Result<T, Fault>;

impl From<std::io::Error> for Fault {
    fn from(err: std::io::Error) -> Self { Fault::protocol(err.to_string()) }
}

impl From<reqwest::Error> for Fault {
    fn from(err: reqwest::Error) -> Self { Fault::protocol(err.to_string()) }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;

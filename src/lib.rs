//! RPC and session layer of the Koo desktop client.
//!
//! [`Session`] owns the login state and the single connection to the object server;
//! [`wire`] holds the interchangeable transports (framed socket, XML-RPC, broker).
//! Faults are classified in [`error`] and shown to the user through a
//! [`notify::NotificationSink`].

pub mod async_call;
pub mod cache;
pub mod concurrency;
pub mod config;
pub mod database;
pub mod error;
pub mod expr;
pub mod login_url;
pub mod notify;
pub mod session;
pub mod wire;

pub use async_call::CallId;
pub use cache::{CachePolicy, ResultCache};
pub use config::ClientConfig;
pub use database::DatabaseAdmin;
pub use error::{Fault, FaultKind, RpcResult, ServerFault};
pub use login_url::LoginUrl;
pub use notify::{ConflictDecision, NotificationSink, ScriptedSink, TracingSink};
pub use session::{LoginStatus, ModelProxy, Probe, Session};
pub use wire::{Protocol, WireConnection};

/// Diagnostic print for tests and debug builds, e.g. dumping the frames or XML bodies a
/// fake server receives. Compiles to nothing in release builds.
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        if false { let _ = format!($($arg)*); }
    });
}

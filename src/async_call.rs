//! Background calls with callbacks delivered on the owning context.
//!
//! Every call runs on its own tokio task with a private [`Session::copy`], so no
//! connection is ever shared. Workers only talk to the server; they post their outcome
//! on a channel owned by the originating session. Callbacks, notifications and conflict
//! prompts happen when the owner drains that channel with
//! [`Session::dispatch_completions`] or [`Session::settle`].

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Fault, RpcResult};
use crate::session::{route_fault, Session};

pub type CallId = Uuid;

/// Receives the final outcome of an async call, exactly once.
pub type Callback = Box<dyn FnOnce(RpcResult<Value>) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// Silent, like [`Session::call`].
    Call,
    /// Faults are routed to the sink at delivery, like [`Session::execute`].
    Execute,
}

/// What a worker posts back to its owner.
#[derive(Debug)]
pub struct Completion {
    pub id: CallId,
    pub outcome: RpcResult<Value>,
}

pub struct PendingAsyncCall {
    pub id: CallId,
    pub target: String,
    pub method: String,
    pub args: Vec<Value>,
    pub mode: CallMode,
    callback: Callback,
    handle: Option<JoinHandle<()>>,
}

impl PendingAsyncCall {
    /// Whether the worker task is still running. A finished call may still wait for
    /// delivery.
    pub fn is_running(&self) -> bool { self.handle.as_ref().is_some_and(|h| !h.is_finished()) }
}

impl fmt::Debug for PendingAsyncCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAsyncCall")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("method", &self.method)
            .field("args", &self.args.len())
            .field("mode", &self.mode)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Calls started by one session and not delivered yet.
pub struct AsyncRegistry {
    pending: HashMap<CallId, PendingAsyncCall>,
    tx: UnboundedSender<Completion>,
    rx: UnboundedReceiver<Completion>,
}

impl Default for AsyncRegistry {
    fn default() -> Self { Self::new() }
}

impl AsyncRegistry {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { pending: HashMap::new(), tx, rx }
    }

    pub fn len(&self) -> usize { self.pending.len() }

    pub fn is_empty(&self) -> bool { self.pending.is_empty() }

    pub fn get(&self, id: &CallId) -> Option<&PendingAsyncCall> { self.pending.get(id) }
}

impl Session {
    /// Run `target`/`method` in the background; `callback` gets the raw outcome.
    /// Must be called from within a tokio runtime.
    pub fn call_async<F>(&mut self, callback: F, target: &str, method: &str, args: &[Value]) -> CallId
    where
        F: FnOnce(RpcResult<Value>) + Send + 'static,
    {
        self.start(CallMode::Call, Box::new(callback), target, method, args.to_vec())
    }

    /// Background variant of [`Session::execute`]: faults are shown and stale writes
    /// resolved on delivery, then `callback` gets the final outcome.
    pub fn execute_async<F>(&mut self, callback: F, target: &str, method: &str, args: &[Value]) -> CallId
    where
        F: FnOnce(RpcResult<Value>) + Send + 'static,
    {
        self.start(CallMode::Execute, Box::new(callback), target, method, args.to_vec())
    }

    pub fn pending_calls(&self) -> usize { self.registry.len() }

    pub fn pending_call(&self, id: &CallId) -> Option<&PendingAsyncCall> { self.registry.get(id) }

    /// Deliver every completion that has already arrived, without waiting.
    /// Returns how many callbacks ran.
    pub fn dispatch_completions(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(done) = self.registry.rx.try_recv() {
            if self.deliver(done) { delivered += 1; }
        }
        delivered
    }

    /// Wait for every pending call and deliver it. Returns how many callbacks ran.
    pub async fn settle(&mut self) -> usize {
        let mut delivered = self.dispatch_completions();
        while !self.registry.is_empty() {
            // the registry holds a sender, so the channel never closes under us
            let Some(done) = self.registry.rx.recv().await else { break };
            if self.deliver(done) { delivered += 1; }
        }
        delivered
    }

    fn start(&mut self, mode: CallMode, callback: Callback, target: &str, method: &str, args: Vec<Value>) -> CallId {
        let id = Uuid::new_v4();
        let handle = self.launch(id, target, method, args.clone());
        debug!(target: "koo::async", "{} started: {} {} ({:?})", id, target, method, mode);
        self.registry.pending.insert(id, PendingAsyncCall {
            id,
            target: target.to_string(),
            method: method.to_string(),
            args,
            mode,
            callback,
            handle,
        });
        id
    }

    // Spawn the worker plus a watcher that turns a panicked or cancelled worker into a
    // protocol fault. Without a copy the fault is queued right away.
    fn launch(&self, id: CallId, target: &str, method: &str, args: Vec<Value>) -> Option<JoinHandle<()>> {
        let tx = self.registry.tx.clone();
        let mut worker = match self.copy() {
            Ok(s) => s,
            Err(fault) => {
                let _ = tx.send(Completion { id, outcome: Err(fault) });
                return None;
            }
        };
        let (target, method) = (target.to_string(), method.to_string());
        let job = tokio::spawn(async move { worker.call(&target, &method, &args).await });
        Some(tokio::spawn(async move {
            let outcome = match job.await {
                Ok(outcome) => outcome,
                Err(e) => Err(Fault::protocol(format!("async call {} did not finish: {}", id, e))),
            };
            if tx.send(Completion { id, outcome }).is_err() {
                debug!(target: "koo::async", "{} finished after its session was dropped", id);
            }
        }))
    }

    // Returns true when the callback ran, false when the call was re-issued or unknown.
    fn deliver(&mut self, done: Completion) -> bool {
        let Some(mut call) = self.registry.pending.remove(&done.id) else {
            warn!(target: "koo::async", "completion for unknown call {}", done.id);
            return false;
        };
        if call.mode == CallMode::Execute {
            if let Err(fault) = &done.outcome {
                if let Some(stripped) = route_fault(self.sink.as_ref(), fault, &call.args) {
                    debug!(target: "koo::async", "{} re-issued without the concurrency token", call.id);
                    call.handle = self.launch(call.id, &call.target, &call.method, stripped.clone());
                    call.args = stripped;
                    self.registry.pending.insert(call.id, call);
                    return false;
                }
            }
        }
        debug!(target: "koo::async", "{} delivered ({})", call.id, if done.outcome.is_ok() { "ok" } else { "fault" });
        (call.callback)(done.outcome);
        true
    }
}

//! Seam to whatever shows faults to a human.
//!
//! Sinks are only ever invoked from the context that owns the session, never from an
//! async-call worker.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

pub use crate::error::Notice;

/// A stale write the user has to decide about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub model: String,
    pub record_id: Option<i64>,
    pub values: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictDecision {
    /// Overwrite: retry once without the concurrency-check token.
    SaveAnyway,
    /// Keep the server's version; the caller gets the original fault.
    Discard,
    /// Show a comparison first, then decide.
    Compare,
}

pub trait NotificationSink: Send + Sync {
    fn notify_error(&self, notice: &Notice);

    fn notify_warning(&self, notice: &Notice);

    fn resolve_conflict(&self, report: &ConflictReport) -> ConflictDecision;

    /// Asked once after a [`ConflictDecision::Compare`] answer.
    fn decide_after_compare(&self, _report: &ConflictReport) -> ConflictDecision { ConflictDecision::Discard }
}

/// Default sink: logs every notice and never overwrites.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify_error(&self, notice: &Notice) {
        error!(target: "koo::notify", "{}: {}", notice.title, notice.message);
    }

    fn notify_warning(&self, notice: &Notice) {
        warn!(target: "koo::notify", "{}: {}", notice.title, notice.message);
    }

    fn resolve_conflict(&self, report: &ConflictReport) -> ConflictDecision {
        info!(target: "koo::notify", "write conflict on {} {:?}; discarding local changes", report.model, report.record_id);
        ConflictDecision::Discard
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Error(Notice),
    Warning(Notice),
    Conflict(ConflictReport, ConflictDecision),
    Compared(ConflictReport, ConflictDecision),
}

/// Records everything it is told and answers conflicts from a script. Once the script is
/// exhausted the fallback answer is used.
#[derive(Debug)]
pub struct ScriptedSink {
    decisions: Mutex<VecDeque<ConflictDecision>>,
    after_compare: Mutex<VecDeque<ConflictDecision>>,
    fallback: ConflictDecision,
    seen: Mutex<Vec<Notification>>,
}

impl Default for ScriptedSink {
    fn default() -> Self { Self::new(ConflictDecision::Discard) }
}

impl ScriptedSink {
    pub fn new(fallback: ConflictDecision) -> Self {
        Self {
            decisions: Mutex::new(VecDeque::new()),
            after_compare: Mutex::new(VecDeque::new()),
            fallback,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_decisions<I: IntoIterator<Item = ConflictDecision>>(self, decisions: I) -> Self {
        self.decisions.lock().extend(decisions);
        self
    }

    pub fn with_after_compare<I: IntoIterator<Item = ConflictDecision>>(self, decisions: I) -> Self {
        self.after_compare.lock().extend(decisions);
        self
    }

    pub fn notifications(&self) -> Vec<Notification> { self.seen.lock().clone() }

    pub fn errors(&self) -> Vec<Notice> {
        self.seen.lock().iter().filter_map(|n| match n { Notification::Error(x) => Some(x.clone()), _ => None }).collect()
    }

    pub fn warnings(&self) -> Vec<Notice> {
        self.seen.lock().iter().filter_map(|n| match n { Notification::Warning(x) => Some(x.clone()), _ => None }).collect()
    }

    pub fn conflicts(&self) -> Vec<ConflictReport> {
        self.seen.lock().iter().filter_map(|n| match n { Notification::Conflict(r, _) => Some(r.clone()), _ => None }).collect()
    }
}

impl NotificationSink for ScriptedSink {
    fn notify_error(&self, notice: &Notice) { self.seen.lock().push(Notification::Error(notice.clone())); }

    fn notify_warning(&self, notice: &Notice) { self.seen.lock().push(Notification::Warning(notice.clone())); }

    fn resolve_conflict(&self, report: &ConflictReport) -> ConflictDecision {
        let d = self.decisions.lock().pop_front().unwrap_or(self.fallback);
        self.seen.lock().push(Notification::Conflict(report.clone(), d));
        d
    }

    fn decide_after_compare(&self, report: &ConflictReport) -> ConflictDecision {
        let d = self.after_compare.lock().pop_front().unwrap_or(ConflictDecision::Discard);
        self.seen.lock().push(Notification::Compared(report.clone(), d));
        d
    }
}

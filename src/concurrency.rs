//! Recovery from stale writes.
//!
//! Write-style calls look like `execute(model, method, ids, values)` or
//! `execute(model, method, ids, values, context)`; the modification token travels in one of
//! the two maps. When the server rejects a write because that token is outdated, the user
//! may overwrite: the call is issued again, once, without the token. Every further conflict
//! needs a fresh decision.

use serde_json::{Map, Value};
use tracing::info;

use crate::error::{Fault, FaultKind};
use crate::notify::{ConflictDecision, ConflictReport, NotificationSink};

/// Reserved key carrying the last known modification timestamp of a record.
pub const CONCURRENCY_CHECK_FIELD: &str = "__last_update";

/// Index of the record ids in the argument list.
pub const IDS_ARG: usize = 2;
/// Positions that may carry the token: the values map and the trailing context map.
pub const TOKEN_ARGS: [usize; 2] = [3, 4];
/// Position of the map shown to the user in a conflict report.
pub const VALUES_ARG: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Re-issue the call with the token stripped.
    Retry,
    /// Hand the original fault back to the caller.
    GiveUp,
}

/// Whether `fault` on a call with `args` goes through conflict resolution at all.
pub fn is_resolvable(fault: &Fault, args: &[Value]) -> bool {
    fault.kind() == FaultKind::Concurrency && (args.len() > VALUES_ARG || token_slots(args).next().is_some())
}

fn token_slots(args: &[Value]) -> impl Iterator<Item = usize> + '_ {
    TOKEN_ARGS.into_iter().filter(move |&i| matches!(args.get(i), Some(Value::Object(_))))
}

pub fn conflict_report(args: &[Value]) -> ConflictReport {
    let model = args.first().and_then(Value::as_str).unwrap_or_default().to_string();
    let record_id = args.get(IDS_ARG).and_then(|ids| match ids {
        Value::Array(items) => items.first().and_then(Value::as_i64),
        other => other.as_i64(),
    });
    let values = match args.get(VALUES_ARG) {
        Some(v @ Value::Object(_)) => v.clone(),
        _ => args.get(3).filter(|v| v.is_object()).cloned().unwrap_or(Value::Null),
    };
    ConflictReport { model, record_id, values }
}

/// Ask the sink what to do. A `Compare` answer gets exactly one follow-up question.
pub fn resolve(sink: &dyn NotificationSink, report: &ConflictReport) -> Resolution {
    let mut decision = sink.resolve_conflict(report);
    if decision == ConflictDecision::Compare {
        decision = sink.decide_after_compare(report);
    }
    info!(target: "koo::session", "write conflict on {} {:?}: {:?}", report.model, report.record_id, decision);
    match decision {
        ConflictDecision::SaveAnyway => Resolution::Retry,
        ConflictDecision::Discard | ConflictDecision::Compare => Resolution::GiveUp,
    }
}

/// Copy of `args` whose maps lack the concurrency-check token. Other keys keep their
/// values and order; everything else is left alone.
pub fn strip_token(args: &[Value]) -> Vec<Value> {
    let mut out = args.to_vec();
    for i in TOKEN_ARGS {
        if let Some(Value::Object(values)) = out.get_mut(i) {
            if values.contains_key(CONCURRENCY_CHECK_FIELD) {
                let kept: Map<String, Value> = std::mem::take(values)
                    .into_iter()
                    .filter(|(k, _)| k != CONCURRENCY_CHECK_FIELD)
                    .collect();
                *values = kept;
            }
        }
    }
    out
}

//! Read-mostly result cache keyed by the full call signature.
//!
//! Keys compare structurally: two calls hit the same entry when target, method and every
//! argument are equal as values (object key order does not matter). Entries never expire;
//! the session clears the whole cache on login and logout.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which calls may be served from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    Disabled,
    /// Every successful call.
    All,
    /// View definitions, field descriptions, client actions and `ir.values` lookups.
    #[default]
    ViewsAndActions,
}

const VIEW_METHODS: &[&str] = &["fields_view_get", "fields_get"];

impl CachePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" | "none" => Some(CachePolicy::Disabled),
            "all" => Some(CachePolicy::All),
            "views_and_actions" | "views" => Some(CachePolicy::ViewsAndActions),
            _ => None,
        }
    }

    pub fn admits(&self, target: &str, method: &str, args: &[Value]) -> bool {
        match self {
            CachePolicy::Disabled => false,
            CachePolicy::All => true,
            CachePolicy::ViewsAndActions => {
                if target != "/object" || method != "execute" { return false; }
                let (Some(model), Some(remote)) = (args.first().and_then(Value::as_str), args.get(1).and_then(Value::as_str)) else {
                    return false;
                };
                VIEW_METHODS.contains(&remote)
                    || (model == "ir.values" && remote == "get")
                    || (model.starts_with("ir.actions.") && remote == "read")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(target: &str, method: &str, args: &[Value]) -> Self {
        let mut s = String::with_capacity(64);
        s.push_str(target);
        s.push('\u{1f}');
        s.push_str(method);
        for a in args {
            s.push('\u{1f}');
            write_canonical(a, &mut s);
        }
        CacheKey(s)
    }
}

// JSON text with object keys sorted, so equal values always yield equal keys.
fn write_canonical(v: &Value, out: &mut String) {
    match v {
        Value::Array(items) => {
            out.push('[');
            for (i, it) in items.iter().enumerate() {
                if i > 0 { out.push(','); }
                write_canonical(it, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.into_iter().enumerate() {
                if i > 0 { out.push(','); }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                if let Some(it) = map.get(k) { write_canonical(it, out); }
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[derive(Debug, Default)]
pub struct ResultCache {
    policy: CachePolicy,
    entries: HashMap<CacheKey, Value>,
    hits: u64,
    misses: u64,
}

impl ResultCache {
    pub fn new(policy: CachePolicy) -> Self { Self { policy, ..Self::default() } }

    pub fn policy(&self) -> CachePolicy { self.policy }

    pub fn exists(&self, target: &str, method: &str, args: &[Value]) -> bool {
        self.policy.admits(target, method, args) && self.entries.contains_key(&CacheKey::new(target, method, args))
    }

    /// Cached result, counting the lookup as a hit or a miss.
    pub fn get(&mut self, target: &str, method: &str, args: &[Value]) -> Option<Value> {
        if !self.policy.admits(target, method, args) { return None; }
        match self.entries.get(&CacheKey::new(target, method, args)) {
            Some(v) => { self.hits += 1; Some(v.clone()) }
            None => { self.misses += 1; None }
        }
    }

    /// Store `result` verbatim; returns false when the policy does not admit the call.
    pub fn add(&mut self, result: Value, target: &str, method: &str, args: &[Value]) -> bool {
        if !self.policy.admits(target, method, args) { return false; }
        self.entries.insert(CacheKey::new(target, method, args), result);
        true
    }

    pub fn clear(&mut self) { self.entries.clear(); }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn hits(&self) -> u64 { self.hits }

    pub fn misses(&self) -> u64 { self.misses }
}

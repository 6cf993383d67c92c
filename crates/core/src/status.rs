//! Typed status conditions.
//!
//! Conditions are kept in payload order and looked up by `type`. A missing
//! condition reads as [`ConditionStatus::Unknown`], never as false.

#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("true") {
            ConditionStatus::True
        } else if s.eq_ignore_ascii_case("false") {
            ConditionStatus::False
        } else {
            ConditionStatus::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub last_transition_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct Conditions(SmallVec<[Condition; 4]>);

impl Conditions {
    /// Read `status.conditions` from a raw object. Entries without a `type` are skipped.
    pub fn from_object(raw: &serde_json::Value) -> Self {
        let mut out = SmallVec::new();
        let items = raw
            .get("status")
            .and_then(|s| s.get("conditions"))
            .and_then(|c| c.as_array());
        for c in items.into_iter().flatten() {
            let Some(type_) = c.get("type").and_then(|x| x.as_str()) else { continue };
            let text = |key: &str| c.get(key).and_then(|x| x.as_str()).map(|s| s.to_string());
            out.push(Condition {
                type_: type_.to_string(),
                status: c.get("status").and_then(|x| x.as_str()).map(ConditionStatus::parse).unwrap_or_default(),
                reason: text("reason"),
                message: text("message"),
                last_transition_time: text("lastTransitionTime"),
            });
        }
        Self(out)
    }

    pub fn get(&self, type_: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    pub fn status(&self, type_: &str) -> ConditionStatus {
        self.get(type_).map(|c| c.status).unwrap_or_default()
    }

    pub fn is_true(&self, type_: &str) -> bool { self.status(type_) == ConditionStatus::True }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> { self.0.iter() }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_defaults_to_unknown() {
        let raw = serde_json::json!({
            "status": { "conditions": [
                { "type": "Synced", "status": "True", "reason": "ReconcileSuccess" },
                { "type": "Ready", "status": "False", "message": "creating" },
                { "status": "True" }
            ]}
        });
        let c = Conditions::from_object(&raw);
        assert_eq!(c.len(), 2);
        assert_eq!(c.status("Synced"), ConditionStatus::True);
        assert_eq!(c.status("Ready"), ConditionStatus::False);
        assert_eq!(c.status("Healthy"), ConditionStatus::Unknown);
        assert_eq!(c.get("Ready").and_then(|x| x.message.as_deref()), Some("creating"));
    }

    #[test]
    fn no_status_block() {
        let c = Conditions::from_object(&serde_json::json!({ "kind": "ConfigMap" }));
        assert!(c.is_empty());
        assert!(!c.is_true("Ready"));
    }
}

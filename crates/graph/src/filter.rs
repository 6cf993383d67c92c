//! Ancestor-preserving filter and the table's expand state.
//!
//! Within one attribute the values are OR'ed, across attributes they are AND'ed.
//! Matching is case-insensitive substring unless noted on the attribute.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashSet;
use serde::Serialize;
use strata_core::{display_group, Category, Flavor, Node, NodeId};

use crate::build::Graph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    /// Category, or its badge (`Claim`, `XR`, `MR`).
    Category,
    Name,
    /// Cluster-scoped nodes match any value containing `cluster`.
    Namespace,
    /// The legacy core group is `core`.
    Group,
    Kind,
    /// `Synced`, `Not Synced`, `Ready`, `Not Ready` compare exactly on composite and
    /// managed nodes; other nodes match condition types and statuses by substring.
    Status,
    /// Relative age (`3 days ago`) or the creation timestamp.
    Created,
}

impl Attribute {
    pub const ALL: [Attribute; 7] = [
        Attribute::Category,
        Attribute::Name,
        Attribute::Namespace,
        Attribute::Group,
        Attribute::Kind,
        Attribute::Status,
        Attribute::Created,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Category => "category",
            Attribute::Name => "name",
            Attribute::Namespace => "namespace",
            Attribute::Group => "group",
            Attribute::Kind => "kind",
            Attribute::Status => "status",
            Attribute::Created => "created",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterParseError {
    #[error("unknown filter attribute: {0}")]
    UnknownAttribute(String),
    #[error("expected attr=value, got: {0}")]
    MissingValue(String),
}

impl FromStr for Attribute {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "category" | "type" => Ok(Attribute::Category),
            "name" => Ok(Attribute::Name),
            "namespace" | "ns" => Ok(Attribute::Namespace),
            "group" => Ok(Attribute::Group),
            "kind" => Ok(Attribute::Kind),
            "status" => Ok(Attribute::Status),
            "created" | "age" => Ok(Attribute::Created),
            other => Err(FilterParseError::UnknownAttribute(other.to_string())),
        }
    }
}

/// Badge shown for a category in the table.
pub fn badge(category: Category) -> &'static str {
    match category {
        Category::Root => "Claim",
        Category::Intermediate => "XR",
        Category::Leaf => "MR",
    }
}

/// Human relative age with 30-day months and 12-month years.
pub fn relative_age(created_ts: Option<i64>, now_ts: i64) -> String {
    let Some(ts) = created_ts else { return "Unknown".to_string() };
    fn plural(n: i64, unit: &str) -> String {
        format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
    }
    let secs = (now_ts - ts).max(0);
    if secs < 60 {
        return plural(secs, "second");
    }
    let mins = secs / 60;
    if mins < 60 {
        return plural(mins, "minute");
    }
    let hours = mins / 60;
    if hours < 24 {
        return plural(hours, "hour");
    }
    let days = hours / 24;
    if days < 30 {
        return plural(days, "day");
    }
    let months = days / 30;
    if months < 12 {
        return plural(months, "month");
    }
    plural(months / 12, "year")
}

/// Derived status labels (`Synced`/`Not Synced`, `Ready`/`Not Ready`).
pub fn status_labels(node: &Node) -> [&'static str; 2] {
    [
        if node.synced() { "Synced" } else { "Not Synced" },
        if node.ready() { "Ready" } else { "Not Ready" },
    ]
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn matches_value(attr: Attribute, node: &Node, value: &str, now_ts: i64) -> bool {
    match attr {
        Attribute::Category => contains_ci(node.category.as_str(), value) || contains_ci(badge(node.category), value),
        Attribute::Name => contains_ci(&node.name, value),
        Attribute::Namespace => match &node.namespace {
            Some(ns) => contains_ci(ns, value),
            None => contains_ci(value, "cluster"),
        },
        Attribute::Group => contains_ci(display_group(&node.api_version), value),
        Attribute::Kind => contains_ci(&node.kind, value),
        Attribute::Status => match node.flavor {
            Flavor::Composite | Flavor::Managed => {
                status_labels(node).iter().any(|l| l.eq_ignore_ascii_case(value.trim()))
            }
            Flavor::Plain => node
                .conditions
                .iter()
                .any(|c| contains_ci(&c.type_, value) || contains_ci(c.status.as_str(), value)),
        },
        Attribute::Created => {
            contains_ci(&relative_age(node.creation_ts, now_ts), value)
                || node.created_at.as_deref().map(|c| contains_ci(c, value)).unwrap_or(false)
        }
    }
}

/// Selected values per attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterState(BTreeMap<Attribute, Vec<String>>);

impl FilterState {
    pub fn new() -> Self { Self::default() }

    /// Replace the values of one attribute. An empty list clears it.
    pub fn set(&mut self, attr: Attribute, values: Vec<String>) {
        if values.is_empty() {
            self.0.remove(&attr);
        } else {
            self.0.insert(attr, values);
        }
    }

    pub fn add(&mut self, attr: Attribute, value: impl Into<String>) {
        self.0.entry(attr).or_default().push(value.into());
    }

    /// Parse and add one `attr=value` clause.
    pub fn add_clause(&mut self, clause: &str) -> Result<(), FilterParseError> {
        let (attr, value) = clause.split_once('=').ok_or_else(|| FilterParseError::MissingValue(clause.to_string()))?;
        if value.trim().is_empty() {
            return Err(FilterParseError::MissingValue(clause.to_string()));
        }
        self.add(attr.parse()?, value.trim());
        Ok(())
    }

    pub fn values(&self, attr: Attribute) -> &[String] { self.0.get(&attr).map(|v| v.as_slice()).unwrap_or(&[]) }

    pub fn clear(&mut self) { self.0.clear() }

    pub fn is_active(&self) -> bool { self.0.values().any(|v| !v.is_empty()) }

    pub fn matches(&self, node: &Node, now_ts: i64) -> bool {
        self.0
            .iter()
            .all(|(attr, values)| values.is_empty() || values.iter().any(|v| matches_value(*attr, node, v, now_ts)))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterOutcome {
    pub matched: BTreeSet<NodeId>,
    /// Strict ancestors of matched nodes.
    pub auto_expand: BTreeSet<NodeId>,
    /// `matched` plus `auto_expand`.
    pub visible: BTreeSet<NodeId>,
    /// False when no constraint was set; everything is visible then.
    pub active: bool,
}

impl FilterOutcome {
    pub fn is_visible(&self, id: &NodeId) -> bool { self.visible.contains(id) }
}

pub fn filter(graph: &Graph, state: &FilterState, now_ts: i64) -> FilterOutcome {
    if !state.is_active() {
        let all: BTreeSet<NodeId> = graph.nodes().iter().map(|n| n.id.clone()).collect();
        return FilterOutcome { matched: all.clone(), auto_expand: BTreeSet::new(), visible: all, active: false };
    }
    filter_by(graph, |n| state.matches(n, now_ts))
}

/// Keep nodes accepted by `pred` together with their `parent_id` chain.
pub fn filter_by(graph: &Graph, pred: impl Fn(&Node) -> bool) -> FilterOutcome {
    let mut out = FilterOutcome { active: true, ..Default::default() };
    for n in graph.nodes().iter().filter(|n| pred(*n)) {
        out.matched.insert(n.id.clone());
        out.visible.insert(n.id.clone());
        let mut seen: FxHashSet<&NodeId> = FxHashSet::default();
        let mut cur = n.parent_id.as_ref();
        while let Some(p) = cur {
            if !seen.insert(p) {
                break;
            }
            out.auto_expand.insert(p.clone());
            out.visible.insert(p.clone());
            cur = graph.node(p).and_then(|pn| pn.parent_id.as_ref());
        }
    }
    out
}

/// Sorted distinct values per attribute, for building filter menus.
pub fn options(graph: &Graph, now_ts: i64) -> BTreeMap<Attribute, Vec<String>> {
    let mut sets: BTreeMap<Attribute, BTreeSet<String>> = Attribute::ALL.iter().map(|a| (*a, BTreeSet::new())).collect();
    let mut put = |a: Attribute, v: &str| {
        if let Some(s) = sets.get_mut(&a) {
            s.insert(v.to_string());
        }
    };
    for n in graph.nodes() {
        put(Attribute::Category, badge(n.category));
        put(Attribute::Name, &n.name);
        put(Attribute::Namespace, n.namespace.as_deref().unwrap_or("cluster-scoped"));
        put(Attribute::Group, display_group(&n.api_version));
        put(Attribute::Kind, &n.kind);
        match n.flavor {
            Flavor::Composite | Flavor::Managed => {
                for l in status_labels(n) {
                    put(Attribute::Status, l);
                }
            }
            Flavor::Plain => {
                for c in n.conditions.iter() {
                    put(Attribute::Status, &c.type_);
                    put(Attribute::Status, c.status.as_str());
                }
            }
        }
        put(Attribute::Created, &relative_age(n.creation_ts, now_ts));
    }
    sets.into_iter().map(|(a, s)| (a, s.into_iter().collect())).collect()
}

/// Rows the user expanded by hand. Filter ancestors are merged in, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpandState {
    manual: BTreeSet<NodeId>,
}

impl ExpandState {
    pub fn new() -> Self { Self::default() }

    pub fn toggle(&mut self, id: &NodeId) -> bool {
        if self.manual.remove(id) {
            false
        } else {
            self.manual.insert(id.clone());
            true
        }
    }

    pub fn expand(&mut self, id: NodeId) { self.manual.insert(id); }
    pub fn is_manual(&self, id: &NodeId) -> bool { self.manual.contains(id) }
    pub fn manual(&self) -> &BTreeSet<NodeId> { &self.manual }

    /// Expand every node that has children, like the table's initial view.
    pub fn expand_all(&mut self, graph: &Graph) {
        for n in graph.nodes() {
            if graph.has_children(&n.id) {
                self.manual.insert(n.id.clone());
            }
        }
    }

    pub fn merged(&self, outcome: &FilterOutcome) -> BTreeSet<NodeId> {
        self.manual.union(&outcome.auto_expand).cloned().collect()
    }
}

impl FromIterator<NodeId> for ExpandState {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self { Self { manual: iter.into_iter().collect() } }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_age_buckets() {
        let now = 1_700_000_000;
        assert_eq!(relative_age(Some(now - 1), now), "1 second ago");
        assert_eq!(relative_age(Some(now - 125), now), "2 minutes ago");
        assert_eq!(relative_age(Some(now - 3 * 86_400), now), "3 days ago");
        assert_eq!(relative_age(Some(now - 45 * 86_400), now), "1 month ago");
        assert_eq!(relative_age(Some(now - 400 * 86_400), now), "1 year ago");
        assert_eq!(relative_age(None, now), "Unknown");
    }

    #[test]
    fn clauses_parse() {
        let mut f = FilterState::new();
        f.add_clause("kind=Bucket").unwrap();
        f.add_clause("TYPE = XR").unwrap();
        assert_eq!(f.values(Attribute::Kind), ["Bucket"]);
        assert_eq!(f.values(Attribute::Category), ["XR"]);
        assert!(matches!(f.add_clause("colour=red"), Err(FilterParseError::UnknownAttribute(_))));
        assert!(matches!(f.add_clause("kind"), Err(FilterParseError::MissingValue(_))));
        f.set(Attribute::Kind, vec![]);
        assert!(f.values(Attribute::Kind).is_empty());
    }

    #[test]
    fn manual_toggle_is_independent_of_filter() {
        let mut e = ExpandState::new();
        let a = NodeId::from("a");
        e.toggle(&a);
        let outcome = FilterOutcome {
            auto_expand: [NodeId::from("b")].into_iter().collect(),
            ..Default::default()
        };
        let merged = e.merged(&outcome);
        assert!(merged.contains(&a) && merged.contains(&NodeId::from("b")));
        assert!(!e.is_manual(&NodeId::from("b")));
    }
}

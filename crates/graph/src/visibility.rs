//! Collapse and hover derivations over a built graph.

#![forbid(unsafe_code)]

use std::collections::{BTreeSet, VecDeque};

use rustc_hash::FxHashSet;
use serde::Serialize;
use strata_core::{Edge, NodeId};

use crate::build::Graph;

/// Node ids the user toggled closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollapseSet(BTreeSet<NodeId>);

impl CollapseSet {
    pub fn new() -> Self { Self::default() }

    /// Flip `id`; returns true when it is now collapsed.
    pub fn toggle(&mut self, id: &NodeId) -> bool {
        if self.0.remove(id) {
            false
        } else {
            self.0.insert(id.clone());
            true
        }
    }

    pub fn insert(&mut self, id: NodeId) { self.0.insert(id); }
    pub fn contains(&self, id: &NodeId) -> bool { self.0.contains(id) }
    pub fn iter(&self) -> impl Iterator<Item = &NodeId> { self.0.iter() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn clear(&mut self) { self.0.clear() }

    /// Drop ids that are not part of `graph` anymore.
    pub fn retain_known(&mut self, graph: &Graph) { self.0.retain(|id| graph.contains(id)); }
}

impl FromIterator<NodeId> for CollapseSet {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self { Self(iter.into_iter().collect()) }
}

fn walk(graph: &Graph, start: usize, forward: bool) -> Vec<usize> {
    let mut seen: FxHashSet<usize> = FxHashSet::default();
    seen.insert(start);
    let mut out = Vec::new();
    let mut queue = VecDeque::from([start]);
    while let Some(cur) = queue.pop_front() {
        let edges = if forward { graph.out_edges(cur) } else { graph.in_edges(cur) };
        for &e in edges {
            let edge = &graph.edges()[e];
            let other = if forward { &edge.target } else { &edge.source };
            let Some(j) = graph.index_of(other) else { continue };
            if seen.insert(j) {
                out.push(j);
                queue.push_back(j);
            }
        }
    }
    out
}

/// Strict forward descendants of `id`, breadth-first. Unknown ids have none.
pub fn descendants(graph: &Graph, id: &NodeId) -> Vec<NodeId> {
    match graph.index_of(id) {
        Some(i) => walk(graph, i, true).into_iter().map(|j| graph.nodes()[j].id.clone()).collect(),
        None => Vec::new(),
    }
}

/// Strict backward ancestors of `id`, breadth-first.
pub fn ancestors(graph: &Graph, id: &NodeId) -> Vec<NodeId> {
    match graph.index_of(id) {
        Some(i) => walk(graph, i, false).into_iter().map(|j| graph.nodes()[j].id.clone()).collect(),
        None => Vec::new(),
    }
}

/// Union of the strict descendants of every collapsed node.
///
/// A collapsed node can still be hidden by another collapsed ancestor; it is never
/// hidden by its own entry.
pub fn hidden_by_collapse(graph: &Graph, collapsed: &CollapseSet) -> BTreeSet<NodeId> {
    let mut hidden = BTreeSet::new();
    for c in collapsed.iter() {
        hidden.extend(descendants(graph, c));
    }
    hidden
}

/// Edge whose target is not `Ready=True`, including targets with no Ready condition.
pub fn is_degraded(graph: &Graph, edge: &Edge) -> bool { graph.node(&edge.target).map(|n| !n.ready()).unwrap_or(false) }

/// Renderable subset for one collapse state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Visibility {
    /// Visible node ids in graph order.
    pub nodes: Vec<NodeId>,
    /// Visible edges, healthy first, degraded last.
    pub edges: Vec<Edge>,
    pub hidden: BTreeSet<NodeId>,
}

impl Visibility {
    pub fn is_visible(&self, id: &NodeId) -> bool { !self.hidden.contains(id) && self.nodes.contains(id) }
}

pub fn visible(graph: &Graph, collapsed: &CollapseSet) -> Visibility {
    let hidden = hidden_by_collapse(graph, collapsed);
    let nodes: Vec<NodeId> = graph.nodes().iter().filter(|n| !hidden.contains(&n.id)).map(|n| n.id.clone()).collect();
    let (mut healthy, mut degraded): (Vec<Edge>, Vec<Edge>) = (Vec::new(), Vec::new());
    for e in graph.edges() {
        if collapsed.contains(&e.source) || hidden.contains(&e.source) || hidden.contains(&e.target) {
            continue;
        }
        if is_degraded(graph, e) {
            degraded.push(e.clone());
        } else {
            healthy.push(e.clone());
        }
    }
    healthy.extend(degraded);
    Visibility { nodes, edges: healthy, hidden }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Emphasis {
    Normal,
    Emphasized,
    Dimmed,
}

/// Hover path: ancestors, descendants and the hovered node itself.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Highlight {
    pub hover: Option<NodeId>,
    pub path: BTreeSet<NodeId>,
}

impl Highlight {
    pub fn none() -> Self { Self::default() }

    pub fn is_active(&self) -> bool { !self.path.is_empty() }

    pub fn on_path(&self, id: &NodeId) -> bool { self.path.contains(id) }

    pub fn edge(&self, edge: &Edge) -> Emphasis {
        if !self.is_active() {
            Emphasis::Normal
        } else if self.path.contains(&edge.source) && self.path.contains(&edge.target) {
            Emphasis::Emphasized
        } else {
            Emphasis::Dimmed
        }
    }

    pub fn node(&self, id: &NodeId) -> Emphasis {
        if !self.is_active() {
            Emphasis::Normal
        } else if self.on_path(id) {
            Emphasis::Emphasized
        } else {
            Emphasis::Dimmed
        }
    }
}

/// Hovering an id outside the graph yields an inactive highlight.
pub fn path_highlight(graph: &Graph, hover: Option<&NodeId>) -> Highlight {
    let Some(h) = hover.filter(|h| graph.contains(h)) else { return Highlight::none() };
    let mut path: BTreeSet<NodeId> = ancestors(graph, h).into_iter().collect();
    path.extend(descendants(graph, h));
    path.insert(h.clone());
    Highlight { hover: Some(h.clone()), path }
}

/// Edge as handed to a renderer.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeStyle {
    #[serde(flatten)]
    pub edge: Edge,
    pub emphasis: Emphasis,
    pub degraded: bool,
}

pub fn styled_edges(graph: &Graph, vis: &Visibility, highlight: &Highlight) -> Vec<EdgeStyle> {
    vis.edges
        .iter()
        .map(|e| EdgeStyle { edge: e.clone(), emphasis: highlight.edge(e), degraded: is_degraded(graph, e) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_from_values;
    use serde_json::json;

    fn obj(kind: &str, name: &str, owner: Option<&str>, refs: &[&str]) -> serde_json::Value {
        let mut v = json!({ "apiVersion": "example.org/v1", "kind": kind, "metadata": { "name": name, "uid": name } });
        if let Some(o) = owner {
            v["metadata"]["ownerReferences"] = json!([{ "apiVersion": "example.org/v1", "kind": "K", "name": o, "uid": o }]);
        }
        if !refs.is_empty() {
            let r: Vec<_> = refs.iter().map(|n| json!({ "apiVersion": "example.org/v1", "kind": "K", "name": n })).collect();
            v["spec"] = json!({ "resourceRefs": r });
        }
        v
    }

    #[test]
    fn collapsed_node_keeps_itself() {
        let g = build_from_values(vec![obj("K", "a", None, &["b"]), obj("K", "b", None, &["c"]), obj("K", "c", None, &[])], None);
        let c: CollapseSet = [NodeId::from("a")].into_iter().collect();
        let hidden = hidden_by_collapse(&g, &c);
        assert!(!hidden.contains(&NodeId::from("a")));
        assert_eq!(hidden.len(), 2);
        let vis = visible(&g, &c);
        assert_eq!(vis.nodes, vec![NodeId::from("a")]);
        assert!(vis.edges.is_empty());
    }

    #[test]
    fn cycles_terminate() {
        let g = build_from_values(vec![obj("K", "a", None, &["b"]), obj("K", "b", None, &["a"])], None);
        let c: CollapseSet = [NodeId::from("a")].into_iter().collect();
        // b is hidden; a reaches itself through b but stays out of its own hidden set
        let hidden = hidden_by_collapse(&g, &c);
        assert_eq!(hidden.into_iter().collect::<Vec<_>>(), vec![NodeId::from("b")]);
    }

    #[test]
    fn degraded_edges_sort_last() {
        let ready = |mut v: serde_json::Value, status: &str| {
            v["status"] = json!({ "conditions": [{ "type": "Ready", "status": status }] });
            v
        };
        // b reports Ready=False, c is Ready, d has no conditions at all
        let g = build_from_values(
            vec![
                obj("K", "a", None, &["b", "c", "d"]),
                ready(obj("K", "b", None, &[]), "False"),
                ready(obj("K", "c", None, &[]), "True"),
                obj("K", "d", None, &[]),
            ],
            None,
        );
        let vis = visible(&g, &CollapseSet::new());
        let targets: Vec<_> = vis.edges.iter().map(|e| e.target.as_str()).collect();
        assert_eq!(targets, ["c", "b", "d"]);
        let styled = styled_edges(&g, &vis, &Highlight::none());
        let flags: Vec<_> = styled.iter().map(|s| s.degraded).collect();
        assert_eq!(flags, [false, true, true]);
        assert_eq!(styled[0].emphasis, Emphasis::Normal);
    }

    #[test]
    fn unknown_hover_is_inactive() {
        let g = build_from_values(vec![obj("K", "a", None, &[])], None);
        let h = path_highlight(&g, Some(&NodeId::from("nope")));
        assert!(!h.is_active());
        assert_eq!(h.node(&NodeId::from("a")), Emphasis::Normal);
    }

    #[test]
    fn toggle_flips() {
        let mut c = CollapseSet::new();
        assert!(c.toggle(&NodeId::from("x")));
        assert!(c.contains(&NodeId::from("x")));
        assert!(!c.toggle(&NodeId::from("x")));
        assert!(c.is_empty());
    }
}

//! Graph builder: resources in, deduplicated and classified graph out.
//!
//! The graph is immutable once built. Nodes live in a `Vec` in discovery order and
//! edges refer to them by index; ids map back to indices through `FxHashMap`s.

#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::time::Instant;

use metrics::{gauge, histogram};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use strata_core::{
    Category, Conditions, Edge, EdgeId, EdgeKind, GraphError, Node, NodeId, ObjectRef, Resource,
};
use tracing::{debug, info};

use crate::extract;

/// Identifies the anchor object: name and kind compare case-insensitively, the
/// optional group must prefix the object's apiVersion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorHint {
    pub name: String,
    pub kind: String,
    pub group: Option<String>,
}

impl AnchorHint {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: kind.into(), group: None }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn matches(&self, r: &Resource) -> bool {
        r.name.eq_ignore_ascii_case(&self.name)
            && r.kind.eq_ignore_ascii_case(&self.kind)
            && self
                .group
                .as_deref()
                .map(|g| r.api_version.to_ascii_lowercase().starts_with(&g.to_ascii_lowercase()))
                .unwrap_or(true)
    }
}

/// Reference that named no object in the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dangling {
    pub from: NodeId,
    pub target: ObjectRef,
}

#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    index: FxHashMap<NodeId, usize>,
    edges: Vec<Edge>,
    edge_index: FxHashMap<EdgeId, usize>,
    out_edges: Vec<SmallVec<[usize; 4]>>,
    in_edges: Vec<SmallVec<[usize; 4]>>,
    anchor: Option<usize>,
    dangling: Vec<Dangling>,
    diagnostics: Vec<GraphError>,
}

impl Graph {
    pub fn nodes(&self) -> &[Node] { &self.nodes }
    pub fn edges(&self) -> &[Edge] { &self.edges }
    pub fn len(&self) -> usize { self.nodes.len() }
    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn index_of(&self, id: &NodeId) -> Option<usize> { self.index.get(id).copied() }
    pub fn node(&self, id: &NodeId) -> Option<&Node> { self.index_of(id).map(|i| &self.nodes[i]) }
    pub fn contains(&self, id: &NodeId) -> bool { self.index.contains_key(id) }
    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> { self.edge_index.get(id).map(|i| &self.edges[*i]) }

    /// Edge indices leaving node `i`.
    pub fn out_edges(&self, i: usize) -> &[usize] { &self.out_edges[i] }
    /// Edge indices entering node `i`.
    pub fn in_edges(&self, i: usize) -> &[usize] { &self.in_edges[i] }

    /// Direct successors of `id`, in edge discovery order.
    pub fn children<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        let outs: &[usize] = self.index_of(id).map(|i| self.out_edges(i)).unwrap_or(&[]);
        outs.iter().map(move |e| &self.edges[*e].target)
    }

    /// Direct predecessors of `id`.
    pub fn parents<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        let ins: &[usize] = self.index_of(id).map(|i| self.in_edges(i)).unwrap_or(&[]);
        ins.iter().map(move |e| &self.edges[*e].source)
    }

    /// True when `id` has outgoing edges, i.e. collapsing it would hide something.
    pub fn has_children(&self, id: &NodeId) -> bool {
        self.index_of(id).map(|i| !self.out_edges[i].is_empty()).unwrap_or(false)
    }

    /// The Root node, when the anchor hint matched.
    pub fn anchor(&self) -> Option<&Node> { self.anchor.map(|i| &self.nodes[i]) }

    /// Anchor, or the first depth-0 node as a fallback for layout purposes.
    pub fn layout_anchor(&self) -> Option<&Node> {
        self.anchor().or_else(|| self.nodes.iter().find(|n| n.depth == 0))
    }

    pub fn require_anchor(&self) -> Result<&Node, GraphError> {
        self.anchor().ok_or(GraphError::NoAnchorFound)
    }

    /// Nodes with depth 0: the anchor plus any additional roots.
    pub fn roots(&self) -> impl Iterator<Item = &Node> { self.nodes.iter().filter(|n| n.depth == 0) }

    pub fn dangling(&self) -> &[Dangling] { &self.dangling }
    pub fn diagnostics(&self) -> &[GraphError] { &self.diagnostics }
}

/// Build a graph from raw payloads. Objects that cannot be shaped are recorded as
/// diagnostics and skipped.
pub fn build_from_values(values: impl IntoIterator<Item = serde_json::Value>, hint: Option<&AnchorHint>) -> Graph {
    let mut malformed = Vec::new();
    let resources: Vec<Resource> = values
        .into_iter()
        .filter_map(|v| match Resource::from_value(v) {
            Ok(r) => Some(r),
            Err(e) => {
                debug!(error = %e, "graph: object skipped");
                malformed.push(e);
                None
            }
        })
        .collect();
    let mut g = build(resources, hint);
    malformed.extend(std::mem::take(&mut g.diagnostics));
    g.diagnostics = malformed;
    g
}

/// Like [`build`] but fails when no node matches the anchor hint.
pub fn try_build(resources: impl IntoIterator<Item = Resource>, hint: &AnchorHint) -> Result<Graph, GraphError> {
    let g = build(resources, Some(hint));
    if g.anchor.is_none() {
        return Err(GraphError::NoAnchorFound);
    }
    Ok(g)
}

pub fn build(resources: impl IntoIterator<Item = Resource>, hint: Option<&AnchorHint>) -> Graph {
    let t0 = Instant::now();
    let mut g = Graph::default();

    // Dedup by id; first occurrence wins.
    let mut items: Vec<Resource> = Vec::new();
    for r in resources {
        if g.index.contains_key(&r.id) {
            debug!(id = %r.id, "graph: duplicate object ignored");
            continue;
        }
        g.index.insert(r.id.clone(), items.len());
        items.push(r);
    }
    let n = items.len();

    // (kind lowercase, name) -> candidate indices, for reference resolution
    let mut by_name: FxHashMap<(String, String), SmallVec<[usize; 2]>> = FxHashMap::default();
    for (i, r) in items.iter().enumerate() {
        by_name.entry((r.kind.to_ascii_lowercase(), r.name.clone())).or_default().push(i);
    }
    let resolve = |r: &ObjectRef| -> Option<usize> {
        by_name
            .get(&(r.kind.to_ascii_lowercase(), r.name.clone()))
            .and_then(|c| c.iter().copied().find(|&i| items[i].matches_ref(r)))
    };
    let by_uid: FxHashMap<&str, usize> =
        items.iter().enumerate().filter_map(|(i, r)| r.uid.as_deref().map(|u| (u, i))).collect();

    // Raw links, deduplicated by (source, target). Ownership upgrades a reference.
    let mut pairs: FxHashMap<(usize, usize), usize> = FxHashMap::default();
    let mut links: Vec<(usize, usize, EdgeKind)> = Vec::new();
    let mut add_link = |links: &mut Vec<(usize, usize, EdgeKind)>, s: usize, t: usize, kind: EdgeKind| {
        match pairs.get(&(s, t)) {
            Some(&at) => {
                if kind == EdgeKind::Ownership {
                    links[at].2 = EdgeKind::Ownership;
                }
            }
            None => {
                pairs.insert((s, t), links.len());
                links.push((s, t, kind));
            }
        }
    };

    for (i, r) in items.iter().enumerate() {
        let rel = extract::extract(&r.raw);
        for reason in &rel.skipped {
            g.diagnostics.push(GraphError::ExtractionSkipped { id: r.id.clone(), reason: reason.clone() });
        }
        for o in &rel.owners {
            // owners live in the same namespace or are cluster-scoped
            let owner = o
                .uid
                .as_deref()
                .and_then(|u| by_uid.get(u).copied())
                .or_else(|| resolve(&o.owner.clone().in_namespace(r.namespace.as_deref())));
            match owner {
                Some(s) if s != i => add_link(&mut links, s, i, EdgeKind::Ownership),
                Some(_) => g.diagnostics.push(GraphError::CycleDetected { at: r.id.clone() }),
                None => g.diagnostics.push(GraphError::DanglingReference { from: r.id.clone(), target: o.owner.clone() }),
            }
        }
        for target in &rel.references {
            let target = target.clone().in_namespace(r.namespace.as_deref());
            match resolve(&target) {
                Some(t) if t != i => add_link(&mut links, i, t, EdgeKind::Reference),
                Some(_) => g.diagnostics.push(GraphError::CycleDetected { at: r.id.clone() }),
                None => {
                    g.diagnostics.push(GraphError::DanglingReference { from: r.id.clone(), target: target.clone() });
                    g.dangling.push(Dangling { from: r.id.clone(), target });
                }
            }
        }
    }

    g.out_edges = vec![SmallVec::new(); n];
    g.in_edges = vec![SmallVec::new(); n];
    for (ei, (s, t, kind)) in links.iter().copied().enumerate() {
        let e = Edge::new(items[s].id.clone(), items[t].id.clone(), kind);
        g.edge_index.insert(e.id.clone(), ei);
        g.edges.push(e);
        g.out_edges[s].push(ei);
        g.in_edges[t].push(ei);
    }

    g.anchor = hint.and_then(|h| items.iter().position(|r| h.matches(r)));

    let (depth, parent, cycles) = assign_depths(&g, n);
    for c in cycles {
        g.diagnostics.push(GraphError::CycleDetected { at: items[c].id.clone() });
    }

    for (i, r) in items.iter().enumerate() {
        let has_ref_edge = g.out_edges[i].iter().any(|&e| g.edges[e].kind == EdgeKind::Reference);
        let category = if Some(i) == g.anchor {
            Category::Root
        } else if has_ref_edge || extract::is_composite(&r.raw) {
            Category::Intermediate
        } else {
            Category::Leaf
        };
        g.nodes.push(Node {
            id: r.id.clone(),
            kind: r.kind.clone(),
            api_version: r.api_version.clone(),
            group: r.group().to_string(),
            name: r.name.clone(),
            namespace: r.namespace.clone(),
            created_at: r.created_at().map(|s| s.to_string()),
            creation_ts: r.creation_ts(),
            conditions: Conditions::from_object(&r.raw),
            category,
            flavor: extract::flavor(&r.raw),
            depth: depth[i],
            parent_id: parent[i].map(|p| items[p].id.clone()),
            raw: r.raw.clone(),
        });
    }

    let took = t0.elapsed().as_secs_f64() * 1000.0;
    histogram!("graph_build_ms", took);
    gauge!("graph_nodes", g.nodes.len() as f64);
    gauge!("graph_edges", g.edges.len() as f64);
    info!(
        nodes = g.nodes.len(),
        edges = g.edges.len(),
        dangling = g.dangling.len(),
        diagnostics = g.diagnostics.len(),
        anchor = ?g.anchor().map(|a| a.id.as_str()),
        took_ms = took as u64,
        "graph: built"
    );
    g
}

/// Breadth-first depth and discovery parent. The anchor seeds first, then every
/// still-unreached node with no incoming edge, then whatever is left (cycle members).
fn assign_depths(g: &Graph, n: usize) -> (Vec<u32>, Vec<Option<usize>>, Vec<usize>) {
    let mut depth: Vec<Option<u32>> = vec![None; n];
    let mut parent: Vec<Option<usize>> = vec![None; n];
    let mut cycles: Vec<usize> = Vec::new();

    let mut bfs = |seed: usize, depth: &mut Vec<Option<u32>>, parent: &mut Vec<Option<usize>>| {
        depth[seed] = Some(0);
        let mut queue = VecDeque::from([seed]);
        while let Some(cur) = queue.pop_front() {
            let d = depth[cur].unwrap_or(0);
            for &e in g.out_edges(cur) {
                let t = g.index[&g.edges[e].target];
                match depth[t] {
                    None => {
                        depth[t] = Some(d + 1);
                        parent[t] = Some(cur);
                        queue.push_back(t);
                    }
                    Some(_) => {
                        // back edge onto the discovery chain
                        let mut at = Some(cur);
                        let mut steps = 0usize;
                        while let Some(a) = at {
                            if a == t {
                                cycles.push(t);
                                break;
                            }
                            steps += 1;
                            if steps > n {
                                break;
                            }
                            at = parent[a];
                        }
                    }
                }
            }
        }
    };

    if let Some(a) = g.anchor {
        bfs(a, &mut depth, &mut parent);
    }
    for i in 0..n {
        if depth[i].is_none() && g.in_edges(i).is_empty() {
            bfs(i, &mut depth, &mut parent);
        }
    }
    for i in 0..n {
        if depth[i].is_none() {
            bfs(i, &mut depth, &mut parent);
        }
    }

    cycles.sort_unstable();
    cycles.dedup();
    (depth.into_iter().map(|d| d.unwrap_or(0)).collect(), parent, cycles)
}

//! Layered left-to-right layout.
//!
//! Rank is the node depth computed by the builder. Within a rank, nodes are
//! ordered with an iterative barycenter heuristic (alternating forward and
//! backward sweeps). This is an approximation: it reduces crossings between
//! adjacent ranks but does not guarantee the minimum.
//!
//! The result depends only on the graph, the config and the included subset,
//! so identical inputs give identical coordinates.

#![forbid(unsafe_code)]

use std::time::Instant;

use metrics::histogram;
use rustc_hash::FxHashMap;
use serde::Serialize;
use strata_core::{Node, NodeId};
use tracing::debug;

use crate::build::Graph;

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    pub node_width: f64,
    pub node_height: f64,
    /// Gap between ranks (horizontal).
    pub rank_sep: f64,
    /// Gap between nodes in one rank (vertical).
    pub node_sep: f64,
    pub margin: f64,
    pub passes: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self { node_width: 172.0, node_height: 80.0, rank_sep: 100.0, node_sep: 50.0, margin: 50.0, passes: 4 }
    }
}

impl LayoutConfig {
    /// Defaults overridden by `STRATA_NODE_WIDTH`, `STRATA_NODE_HEIGHT`, `STRATA_RANK_SEP`,
    /// `STRATA_NODE_SEP`, `STRATA_MARGIN` and `STRATA_LAYOUT_PASSES`.
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(key: &str) -> Option<T> {
            std::env::var(key).ok().and_then(|s| s.parse::<T>().ok())
        }
        let d = Self::default();
        Self {
            node_width: var("STRATA_NODE_WIDTH").unwrap_or(d.node_width),
            node_height: var("STRATA_NODE_HEIGHT").unwrap_or(d.node_height),
            rank_sep: var("STRATA_RANK_SEP").unwrap_or(d.rank_sep),
            node_sep: var("STRATA_NODE_SEP").unwrap_or(d.node_sep),
            margin: var("STRATA_MARGIN").unwrap_or(d.margin),
            passes: var("STRATA_LAYOUT_PASSES").unwrap_or(d.passes),
        }
    }
}

/// Top-left corner of a node box.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub rank: u32,
    pub order: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Layout {
    positions: Vec<(NodeId, Position)>,
    #[serde(skip)]
    index: FxHashMap<NodeId, usize>,
    pub width: f64,
    pub height: f64,
}

impl Layout {
    pub fn get(&self, id: &NodeId) -> Option<&Position> { self.index.get(id).map(|i| &self.positions[*i].1) }
    /// Positions in graph discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Position)> { self.positions.iter().map(|(id, p)| (id, p)) }
    pub fn len(&self) -> usize { self.positions.len() }
    pub fn is_empty(&self) -> bool { self.positions.is_empty() }
}

pub fn layout(graph: &Graph) -> Layout { layout_with(graph, &LayoutConfig::default(), |_| true) }

/// Lay out the nodes accepted by `include`. Edges touching excluded nodes are ignored.
pub fn layout_with(graph: &Graph, cfg: &LayoutConfig, include: impl Fn(&Node) -> bool) -> Layout {
    let t0 = Instant::now();
    let nodes = graph.nodes();
    let included: Vec<bool> = nodes.iter().map(&include).collect();
    if !included.iter().any(|b| *b) {
        return Layout::default();
    }

    let max_rank = nodes.iter().zip(&included).filter(|(_, inc)| **inc).map(|(n, _)| n.depth).max().unwrap_or(0) as usize;
    let mut layers: Vec<Vec<usize>> = vec![Vec::new(); max_rank + 1];
    for (i, n) in nodes.iter().enumerate() {
        if included[i] {
            layers[n.depth as usize].push(i);
        }
    }
    // position of each node within its layer
    let mut pos: Vec<usize> = vec![0; nodes.len()];
    for layer in &layers {
        for (o, &i) in layer.iter().enumerate() {
            pos[i] = o;
        }
    }

    // neighbours restricted to included nodes in the adjacent rank
    let neighbours = |i: usize, forward: bool| -> Vec<usize> {
        let rank = nodes[i].depth;
        let edges = if forward { graph.in_edges(i) } else { graph.out_edges(i) };
        edges
            .iter()
            .filter_map(|&e| {
                let edge = &graph.edges()[e];
                let other = if forward { &edge.source } else { &edge.target };
                graph.index_of(other)
            })
            .filter(|&j| included[j])
            .filter(|&j| if forward { nodes[j].depth + 1 == rank } else { nodes[j].depth == rank + 1 })
            .collect()
    };

    for pass in 0..cfg.passes {
        let forward = pass % 2 == 0;
        let ranks: Vec<usize> = if forward { (1..layers.len()).collect() } else { (0..layers.len().saturating_sub(1)).rev().collect() };
        for r in ranks {
            let mut keyed: Vec<(f64, usize)> = layers[r]
                .iter()
                .map(|&i| {
                    let nb = neighbours(i, forward);
                    let key = if nb.is_empty() {
                        pos[i] as f64
                    } else {
                        nb.iter().map(|&j| pos[j] as f64).sum::<f64>() / nb.len() as f64
                    };
                    (key, i)
                })
                .collect();
            // ties fall back to discovery order (graph index)
            keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            layers[r] = keyed.into_iter().map(|(_, i)| i).collect();
            for (o, &i) in layers[r].iter().enumerate() {
                pos[i] = o;
            }
        }
    }

    // Root goes first in its rank.
    if let Some(root) = graph.layout_anchor().and_then(|a| graph.index_of(&a.id)).filter(|&i| included[i]) {
        let layer = &mut layers[nodes[root].depth as usize];
        if let Some(at) = layer.iter().position(|&i| i == root) {
            let id = layer.remove(at);
            layer.insert(0, id);
        }
        for (o, &i) in layer.iter().enumerate() {
            pos[i] = o;
        }
    }

    let mut raw: Vec<(usize, f64, f64)> = Vec::new();
    for (i, n) in nodes.iter().enumerate() {
        if !included[i] {
            continue;
        }
        let x = n.depth as f64 * (cfg.node_width + cfg.rank_sep);
        let y = pos[i] as f64 * (cfg.node_height + cfg.node_sep);
        raw.push((i, x, y));
    }
    let min_x = raw.iter().map(|r| r.1).fold(f64::INFINITY, f64::min);
    let min_y = raw.iter().map(|r| r.2).fold(f64::INFINITY, f64::min);

    let mut out = Layout::default();
    for (i, x, y) in raw {
        let p = Position {
            x: x - min_x + cfg.margin,
            y: y - min_y + cfg.margin,
            rank: nodes[i].depth,
            order: pos[i],
        };
        out.width = out.width.max(p.x + cfg.node_width + cfg.margin);
        out.height = out.height.max(p.y + cfg.node_height + cfg.margin);
        out.index.insert(nodes[i].id.clone(), out.positions.len());
        out.positions.push((nodes[i].id.clone(), p));
    }

    let took = t0.elapsed().as_secs_f64() * 1000.0;
    histogram!("layout_ms", took);
    debug!(nodes = out.len(), ranks = layers.len(), took_ms = took as u64, "layout: done");
    out
}

/// Crossings between edges that join adjacent ranks, under `layout`.
pub fn count_crossings(graph: &Graph, layout: &Layout) -> usize {
    let mut spans: Vec<(u32, usize, usize)> = Vec::new();
    for e in graph.edges() {
        let (Some(s), Some(t)) = (layout.get(&e.source), layout.get(&e.target)) else { continue };
        if s.rank + 1 == t.rank {
            spans.push((s.rank, s.order, t.order));
        }
    }
    let mut crossings = 0;
    for (a, x) in spans.iter().enumerate() {
        for y in &spans[a + 1..] {
            if x.0 == y.0 && ((x.1 < y.1 && x.2 > y.2) || (x.1 > y.1 && x.2 < y.2)) {
                crossings += 1;
            }
        }
    }
    crossings
}

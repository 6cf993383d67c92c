//! Serializable views of a graph for `-o json|yaml` and their human rendering.

#![forbid(unsafe_code)]

use serde::Serialize;
use strata_core::{Category, NodeId};
use strata_graph::filter::{badge, relative_age, status_labels};
use strata_graph::{
    filter, layout_with, path_highlight, styled_edges, tree_rows, visible, CollapseSet, EdgeStyle, Emphasis, ExpandState,
    FilterState, Graph, LayoutConfig,
};

#[derive(Debug, Serialize)]
pub struct NodeView {
    pub id: NodeId,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub category: Category,
    pub badge: &'static str,
    pub depth: u32,
    pub has_children: bool,
    pub x: f64,
    pub y: f64,
    pub emphasis: Emphasis,
    pub synced: bool,
    pub ready: bool,
}

#[derive(Debug, Serialize)]
pub struct GraphView {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeStyle>,
    pub hidden: Vec<NodeId>,
    pub width: f64,
    pub height: f64,
    pub diagnostics: Vec<String>,
}

/// Nodes visible under both collapse and filter, laid out as a subset.
pub fn graph_view(
    graph: &Graph,
    collapsed: &CollapseSet,
    hover: Option<&NodeId>,
    filters: &FilterState,
    now_ts: i64,
) -> GraphView {
    let vis = visible(graph, collapsed);
    let outcome = filter(graph, filters, now_ts);
    let shown = |id: &NodeId| !vis.hidden.contains(id) && outcome.is_visible(id);
    let layout = layout_with(graph, &LayoutConfig::from_env(), |n| shown(&n.id));
    let highlight = path_highlight(graph, hover);

    let nodes = graph
        .nodes()
        .iter()
        .filter_map(|n| {
            let p = layout.get(&n.id)?;
            Some(NodeView {
                id: n.id.clone(),
                kind: n.kind.clone(),
                name: n.name.clone(),
                namespace: n.namespace.clone(),
                category: n.category,
                badge: badge(n.category),
                depth: n.depth,
                has_children: graph.has_children(&n.id),
                x: p.x,
                y: p.y,
                emphasis: highlight.node(&n.id),
                synced: n.synced(),
                ready: n.ready(),
            })
        })
        .collect();
    let edges = styled_edges(graph, &vis, &highlight)
        .into_iter()
        .filter(|e| shown(&e.edge.source) && shown(&e.edge.target))
        .collect();
    GraphView {
        nodes,
        edges,
        hidden: vis.hidden.into_iter().collect(),
        width: layout.width,
        height: layout.height,
        diagnostics: graph.diagnostics().iter().map(|d| d.to_string()).collect(),
    }
}

pub fn print_graph_human(v: &GraphView) {
    println!("{:<6} {:<24} {:<28} {:<12} {:>5} {:>7} {:>7}  {}", "TYPE", "KIND", "NAME", "NAMESPACE", "DEPTH", "X", "Y", "STATUS");
    for n in &v.nodes {
        let status = format!("{}/{}", if n.synced { "Synced" } else { "Not Synced" }, if n.ready { "Ready" } else { "Not Ready" });
        let mark = match n.emphasis {
            Emphasis::Emphasized => "*",
            Emphasis::Dimmed => ".",
            Emphasis::Normal => " ",
        };
        println!(
            "{:<6} {:<24} {:<28} {:<12} {:>5} {:>7.0} {:>7.0}  {}{}",
            n.badge,
            n.kind,
            n.name,
            n.namespace.as_deref().unwrap_or("-"),
            n.depth,
            n.x,
            n.y,
            status,
            mark
        );
    }
    println!();
    for e in &v.edges {
        println!(
            "{} -> {}  {:?}  {:?}{}",
            e.edge.source,
            e.edge.target,
            e.edge.kind,
            e.emphasis,
            if e.degraded { "  degraded" } else { "" }
        );
    }
    if !v.hidden.is_empty() {
        println!("hidden: {}", v.hidden.len());
    }
    for d in &v.diagnostics {
        eprintln!("diagnostic: {}", d);
    }
}

#[derive(Debug, Serialize)]
pub struct RowView {
    pub level: u32,
    pub is_last_child: bool,
    pub expanded: bool,
    pub badge: &'static str,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub group: String,
    pub status: [&'static str; 2],
    pub age: String,
}

pub fn tree_view(graph: &Graph, expand: &ExpandState, filters: &FilterState, now_ts: i64) -> Vec<RowView> {
    let outcome = filter(graph, filters, now_ts);
    tree_rows(graph, &outcome, &expand.merged(&outcome))
        .into_iter()
        .filter_map(|row| {
            let n = graph.node(&row.id)?;
            Some(RowView {
                level: row.level,
                is_last_child: row.is_last_child,
                expanded: row.expanded,
                badge: badge(n.category),
                kind: n.kind.clone(),
                name: n.name.clone(),
                namespace: n.namespace.clone(),
                group: strata_core::display_group(&n.api_version).to_string(),
                status: status_labels(n),
                age: relative_age(n.creation_ts, now_ts),
            })
        })
        .collect()
}

pub fn print_tree_human(rows: &[RowView]) {
    println!("{:<48} {:<6} {:<12} {:<26} {:<22} {}", "NAME", "TYPE", "NAMESPACE", "GROUP", "STATUS", "CREATED");
    for r in rows {
        let mut label = String::new();
        if r.level > 0 {
            label.push_str(&"  ".repeat(r.level as usize - 1));
            label.push_str(if r.is_last_child { "└─ " } else { "├─ " });
        }
        label.push_str(&format!("{}/{}", r.kind, r.name));
        println!(
            "{:<48} {:<6} {:<12} {:<26} {:<22} {}",
            label,
            r.badge,
            r.namespace.as_deref().unwrap_or("cluster"),
            r.group,
            r.status.join(", "),
            r.age
        );
    }
}

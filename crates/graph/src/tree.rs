//! Indented table rows: depth-first over the `parent_id` tree.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use strata_core::NodeId;

use crate::build::Graph;
use crate::filter::FilterOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeRow {
    pub id: NodeId,
    pub level: u32,
    pub is_last_child: bool,
    /// Has visible tree children, so the row gets an expand toggle.
    pub has_children: bool,
    pub expanded: bool,
}

/// Rows in display order. Only `filter.visible` nodes appear, and a row's children
/// only when the row is in `expanded`.
pub fn tree_rows(graph: &Graph, filter: &FilterOutcome, expanded: &BTreeSet<NodeId>) -> Vec<TreeRow> {
    let mut kids: FxHashMap<&NodeId, Vec<&NodeId>> = FxHashMap::default();
    let mut tops: Vec<&NodeId> = Vec::new();
    for n in graph.nodes().iter().filter(|n| filter.is_visible(&n.id)) {
        match n.parent_id.as_ref().filter(|p| filter.is_visible(p)) {
            Some(p) => kids.entry(p).or_default().push(&n.id),
            None => tops.push(&n.id),
        }
    }

    let mut rows = Vec::new();
    let mut seen: FxHashSet<&NodeId> = FxHashSet::default();
    // explicit stack: (id, level, is_last)
    let mut stack: Vec<(&NodeId, u32, bool)> = Vec::new();
    push_siblings(&mut stack, &tops, 0);
    while let Some((id, level, is_last)) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let children = kids.get(id).map(|v| v.as_slice()).unwrap_or(&[]);
        let open = expanded.contains(id);
        rows.push(TreeRow {
            id: id.clone(),
            level,
            is_last_child: is_last,
            has_children: !children.is_empty(),
            expanded: open,
        });
        if open {
            push_siblings(&mut stack, children, level + 1);
        }
    }
    rows
}

fn push_siblings<'a>(stack: &mut Vec<(&'a NodeId, u32, bool)>, siblings: &[&'a NodeId], level: u32) {
    let last = siblings.len().saturating_sub(1);
    for (i, id) in siblings.iter().enumerate().rev() {
        stack.push((*id, level, i == last));
    }
}

#![forbid(unsafe_code)]

use serde_json::json;
use strata_core::NodeId;
use strata_graph::{build_from_values, count_crossings, layout, layout_with, visible, AnchorHint, CollapseSet, LayoutConfig};

fn composite(kind: &str, name: &str, refs: &[&str]) -> serde_json::Value {
    let r: Vec<_> = refs.iter().map(|n| json!({ "apiVersion": "example.org/v1", "kind": "Part", "name": n })).collect();
    json!({
        "apiVersion": "example.org/v1",
        "kind": kind,
        "metadata": { "name": name },
        "spec": { "resourceRefs": r }
    })
}

fn part(name: &str) -> serde_json::Value {
    json!({ "apiVersion": "example.org/v1", "kind": "Part", "metadata": { "name": name } })
}

fn objects() -> Vec<serde_json::Value> {
    vec![
        // a stray object first so the root is not first in discovery order
        part("stray"),
        composite("Claim", "root", &["x", "y"]),
        composite("Part", "x", &["p2", "p1"]),
        composite("Part", "y", &["p1", "p3"]),
        part("p1"),
        part("p2"),
        part("p3"),
    ]
}

#[test]
fn same_input_same_positions() {
    let hint = AnchorHint::new("Claim", "root");
    let g1 = build_from_values(objects(), Some(&hint));
    let g2 = build_from_values(objects(), Some(&hint));
    let l1 = layout(&g1);
    let l2 = layout(&g2);
    assert_eq!(l1.len(), g1.len());
    let p1: Vec<_> = l1.iter().map(|(id, p)| (id.clone(), *p)).collect();
    let p2: Vec<_> = l2.iter().map(|(id, p)| (id.clone(), *p)).collect();
    assert_eq!(p1, p2);
    assert_eq!(l1.width, l2.width);
}

#[test]
fn root_sits_first_at_the_margin() {
    let g = build_from_values(objects(), Some(&AnchorHint::new("Claim", "root")));
    let l = layout(&g);
    let root = g.anchor().unwrap();
    let p = l.get(&root.id).unwrap();
    assert_eq!((p.x, p.y, p.order), (50.0, 50.0, 0));
    // stray shares rank 0 but goes below the root
    let stray = g.nodes().iter().find(|n| n.name == "stray").unwrap();
    assert_eq!(l.get(&stray.id).unwrap().y, 50.0 + 80.0 + 50.0);
    // second rank starts one box plus rank gap to the right
    let x = g.nodes().iter().find(|n| n.name == "x").unwrap();
    assert_eq!(l.get(&x.id).unwrap().x, 50.0 + 172.0 + 100.0);
}

#[test]
fn barycenter_removes_avoidable_crossings() {
    let g = build_from_values(objects(), Some(&AnchorHint::new("Claim", "root")));
    let l = layout(&g);
    // x -> {p1, p2}, y -> {p1, p3}: an order p2, p1, p3 has no crossings
    assert_eq!(count_crossings(&g, &l), 0);
}

#[test]
fn layout_of_visible_subset() {
    let g = build_from_values(objects(), Some(&AnchorHint::new("Claim", "root")));
    let x = g.nodes().iter().find(|n| n.name == "x").unwrap().id.clone();
    let y = g.nodes().iter().find(|n| n.name == "y").unwrap().id.clone();
    let collapsed: CollapseSet = [x, y].into_iter().collect();
    let vis = visible(&g, &collapsed);
    let l = layout_with(&g, &LayoutConfig::default(), |n| vis.nodes.contains(&n.id));
    assert_eq!(l.len(), 4);
    assert!(l.get(&NodeId::from("Part/example.org//p1")).is_none());
}

#[test]
fn empty_graph_lays_out_empty() {
    let g = build_from_values(Vec::new(), None);
    let l = layout(&g);
    assert!(l.is_empty());
    assert_eq!(l.width, 0.0);
}

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use strata_core::{GraphError, NodeId};
use strata_graph::AnchorHint;
use strata_store::{FetchCache, FetchError, MemoryAccessor, Session};

fn claim() -> serde_json::Value {
    json!({
        "apiVersion": "example.org/v1",
        "kind": "Network",
        "metadata": { "name": "net", "namespace": "team", "uid": "claim" },
        "spec": { "resourceRef": { "apiVersion": "example.org/v1", "kind": "XNetwork", "name": "net-x" } }
    })
}

fn composite() -> serde_json::Value {
    json!({
        "apiVersion": "example.org/v1",
        "kind": "XNetwork",
        "metadata": { "name": "net-x", "uid": "xr" },
        "spec": { "resourceRefs": [
            { "apiVersion": "ec2.aws.upbound.io/v1beta1", "kind": "VPC", "name": "vpc" },
            { "apiVersion": "ec2.aws.upbound.io/v1beta1", "kind": "Subnet", "name": "subnet" },
            { "apiVersion": "ec2.aws.upbound.io/v1beta1", "kind": "Subnet", "name": "broken" }
        ]}
    })
}

fn managed(kind: &str, name: &str) -> serde_json::Value {
    json!({
        "apiVersion": "ec2.aws.upbound.io/v1beta1",
        "kind": kind,
        "metadata": { "name": name, "uid": name, "managedFields": [{ "manager": "x" }] },
        "spec": { "forProvider": {} },
        "status": { "conditions": [{ "type": "Ready", "status": "True" }, { "type": "Synced", "status": "True" }] }
    })
}

fn accessor() -> MemoryAccessor {
    MemoryAccessor::new()
        .with_objects(vec![composite(), managed("VPC", "vpc"), managed("Subnet", "subnet"), managed("Subnet", "broken")])
        .failing("broken")
}

#[tokio::test]
async fn concurrent_expands_share_one_fetch() {
    let acc = Arc::new(accessor().with_delay(Duration::from_millis(50)));
    let cache = FetchCache::with_max_depth(acc.clone(), 8);
    cache.seed(vec![claim()]);
    let id = NodeId::from("claim");
    let (a, b) = tokio::join!(cache.expand(&id), cache.expand(&id));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(acc.calls(), 1);
    assert_eq!(a[0].name, "net-x");

    // cached from now on
    let again = cache.expand(&id).await.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(acc.calls(), 1);
}

#[tokio::test]
async fn failures_are_dropped_and_recorded() {
    let acc = Arc::new(accessor());
    let cache = FetchCache::with_max_depth(acc.clone(), 8);
    cache.seed(vec![claim()]);
    cache.expand(&NodeId::from("claim")).await.unwrap();
    let children = cache.expand(&NodeId::from("xr")).await.unwrap();
    let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["vpc", "subnet"]);
    // sibling fetches all ran
    assert_eq!(acc.calls_for("broken"), 1);
    let failures = cache.failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(&failures[0], GraphError::FetchFailure { target, .. } if target.name == "broken"));
    // stored children are sanitized
    assert!(children[0].raw["metadata"].get("managedFields").is_none());
}

#[tokio::test]
async fn unknown_node_is_an_error() {
    let cache = FetchCache::with_max_depth(Arc::new(MemoryAccessor::new()), 8);
    let err = cache.expand(&NodeId::from("nope")).await.unwrap_err();
    assert_eq!(err, FetchError::UnknownNode(NodeId::from("nope")));
}

#[tokio::test]
async fn expand_all_walks_level_by_level() {
    let cache = FetchCache::with_max_depth(Arc::new(accessor()), 8);
    let roots = cache.seed(vec![claim()]);
    let report = cache.expand_all(&roots).await.unwrap();
    assert_eq!(report.waves, 2);
    assert_eq!(report.expanded, vec![NodeId::from("claim"), NodeId::from("xr")]);
    assert!(!report.truncated);
    assert_eq!(cache.objects().len(), 4);
}

#[tokio::test]
async fn depth_guard_stops_the_sweep() {
    let cache = FetchCache::with_max_depth(Arc::new(accessor()), 1);
    let roots = cache.seed(vec![claim()]);
    let report = cache.expand_all(&roots).await.unwrap();
    assert_eq!(report.waves, 1);
    assert!(report.truncated);
    assert!(!cache.is_expanded(&NodeId::from("xr")));
}

#[tokio::test]
async fn reset_discards_in_flight_results() {
    let cache = FetchCache::with_max_depth(Arc::new(accessor().with_delay(Duration::from_millis(100))), 8);
    cache.seed(vec![claim()]);
    let bg = cache.clone();
    let task = tokio::spawn(async move { bg.expand(&NodeId::from("claim")).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    cache.reset();
    let res = task.await.unwrap();
    assert_eq!(res.unwrap_err(), FetchError::Abandoned(NodeId::from("claim")));
    assert_eq!(cache.objects().len(), 1);
    assert!(!cache.is_expanded(&NodeId::from("claim")));
}

#[tokio::test]
async fn references_inherit_the_parent_namespace() {
    let other = json!({ "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "cm", "namespace": "other", "uid": "cm-other" } });
    let mine = json!({ "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "cm", "namespace": "team", "uid": "cm-team" } });
    let parent = json!({
        "apiVersion": "example.org/v1",
        "kind": "App",
        "metadata": { "name": "app", "namespace": "team", "uid": "app" },
        "spec": { "resourceRefs": [{ "apiVersion": "v1", "kind": "ConfigMap", "name": "cm" }] }
    });
    let cache = FetchCache::with_max_depth(Arc::new(MemoryAccessor::new().with_objects(vec![other, mine])), 8);
    cache.seed(vec![parent]);
    let children = cache.expand(&NodeId::from("app")).await.unwrap();
    assert_eq!(children[0].id, NodeId::from("cm-team"));
}

#[tokio::test]
async fn session_publishes_per_wave() {
    let mut session = Session::with_cache(
        FetchCache::with_max_depth(Arc::new(accessor()), 8),
        Some(AnchorHint::new("Network", "net")),
    );
    let handle = session.handle();
    let first = session.seed(vec![claim()]);
    assert_eq!(first.epoch, 1);
    assert_eq!(first.graph.len(), 1);
    assert_eq!(first.graph.dangling().len(), 1);

    let mut epochs = handle.subscribe_epoch();
    let report = session.expand_all().await.unwrap();
    assert_eq!(report.waves, 2);
    assert!(epochs.has_changed().unwrap());
    let snap = handle.current();
    assert_eq!(snap.epoch, 3);
    assert_eq!(snap.graph.len(), 4);
    assert_eq!(snap.graph.edges().len(), 3);
    assert_eq!(snap.graph.anchor().map(|n| n.name.as_str()), Some("net"));
    // only the failed child is still unresolved
    assert_eq!(snap.graph.dangling().len(), 1);
    assert_eq!(snap.graph.dangling()[0].target.name, "broken");
    assert_eq!(snap.failures.len(), 1);
}

#[tokio::test]
async fn abandoned_session_publishes_nothing() {
    let mut session = Session::with_cache(
        FetchCache::with_max_depth(Arc::new(accessor().with_delay(Duration::from_millis(100))), 8),
        None,
    );
    session.seed(vec![claim()]);
    let session = Arc::new(session);
    let bg = Arc::clone(&session);
    let task = tokio::spawn(async move { bg.expand_all().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    session.abandon();
    assert!(task.await.unwrap().is_err());
    assert_eq!(session.current().epoch, 1);
    assert_eq!(session.current().graph.len(), 1);
}

#[tokio::test]
async fn cyclic_references_stop_without_the_depth_guard() {
    let xr = |name: &str, other: &str| {
        json!({
            "apiVersion": "example.org/v1",
            "kind": "XLoop",
            "metadata": { "name": name, "uid": name },
            "spec": { "resourceRefs": [{ "apiVersion": "example.org/v1", "kind": "XLoop", "name": other }] }
        })
    };
    let acc = Arc::new(MemoryAccessor::new().with_objects(vec![xr("a", "b"), xr("b", "a")]));
    let cache = FetchCache::with_max_depth(acc.clone(), 8);
    let roots = cache.seed(vec![xr("a", "b")]);
    let mut waves = Vec::new();
    let report = cache
        .expand_all_with(&roots, |frontier| {
            waves.push(frontier.to_vec());
            true
        })
        .await
        .unwrap();
    assert_eq!(report.waves, 2);
    assert!(!report.truncated);
    assert_eq!(report.expanded, vec![NodeId::from("a"), NodeId::from("b")]);
    assert_eq!(waves, vec![vec![NodeId::from("a")], vec![NodeId::from("b")]]);
    assert_eq!(acc.calls(), 2);
    assert_eq!(cache.objects().len(), 2);
}

#[tokio::test]
async fn rejecting_a_wave_stops_the_sweep() {
    let cache = FetchCache::with_max_depth(Arc::new(accessor()), 8);
    let roots = cache.seed(vec![claim()]);
    let err = cache.expand_all_with(&roots, |_| false).await.unwrap_err();
    assert_eq!(err, FetchError::Abandoned(NodeId::from("claim")));
    assert!(!cache.is_expanded(&NodeId::from("xr")));
}

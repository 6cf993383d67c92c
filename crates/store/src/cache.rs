//! Hierarchical fetch cache.
//!
//! `expand` resolves the references one node declares and remembers the result.
//! Concurrent calls for the same node share a single in-flight future. A
//! generation counter guards against late writes: `reset` bumps it, and a fetch
//! that completes under an older generation stores nothing.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use metrics::{counter, histogram};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use serde_json::Value;
use strata_core::{strip_noise, GraphError, NodeId, ObjectRef, Resource};
use strata_graph::extract;
use tracing::{debug, info, warn};

use crate::accessor::ChildAccessor;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
    /// The cache was reset while the fetch was running; its result was discarded.
    #[error("fetch abandoned for {0}")]
    Abandoned(NodeId),
}

pub type Children = Arc<Vec<Resource>>;
type InFlight = Shared<BoxFuture<'static, Result<Children, FetchError>>>;

/// Outcome of an expand-all sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpandAllReport {
    /// Nodes expanded, in sweep order. Also the table's default expand state.
    pub expanded: Vec<NodeId>,
    pub waves: u32,
    /// The depth guard stopped the sweep with work left.
    pub truncated: bool,
}

#[derive(Default)]
struct State {
    objects: Vec<Resource>,
    index: FxHashMap<NodeId, usize>,
    resolved: FxHashMap<NodeId, Children>,
    inflight: FxHashMap<NodeId, InFlight>,
    failures: Vec<GraphError>,
    generation: u64,
}

impl State {
    fn register(&mut self, r: Resource) -> bool {
        if self.index.contains_key(&r.id) {
            return false;
        }
        self.index.insert(r.id.clone(), self.objects.len());
        self.objects.push(r);
        true
    }
}

struct Inner {
    accessor: Arc<dyn ChildAccessor>,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> { self.state.lock().unwrap_or_else(|e| e.into_inner()) }
}

#[derive(Clone)]
pub struct FetchCache {
    inner: Arc<Inner>,
    max_depth: u32,
}

/// True when the object declares references, i.e. expanding it can fetch something.
pub fn expandable(r: &Resource) -> bool { !extract::extract(&r.raw).references.is_empty() }

impl FetchCache {
    /// Depth guard from `STRATA_MAX_DEPTH` (default 8).
    pub fn new(accessor: Arc<dyn ChildAccessor>) -> Self {
        let max_depth = std::env::var("STRATA_MAX_DEPTH").ok().and_then(|s| s.parse::<u32>().ok()).unwrap_or(8);
        Self::with_max_depth(accessor, max_depth)
    }

    pub fn with_max_depth(accessor: Arc<dyn ChildAccessor>, max_depth: u32) -> Self {
        Self { inner: Arc::new(Inner { accessor, state: Mutex::new(State::default()) }), max_depth }
    }

    pub fn max_depth(&self) -> u32 { self.max_depth }

    /// Register the initial flat collection. Returns the ids that were new.
    pub fn seed(&self, values: impl IntoIterator<Item = Value>) -> Vec<NodeId> {
        let mut st = self.inner.lock();
        let mut added = Vec::new();
        for mut v in values {
            strip_noise(&mut v);
            match Resource::from_value(v) {
                Ok(r) => {
                    let id = r.id.clone();
                    if st.register(r) {
                        added.push(id);
                    }
                }
                Err(e) => debug!(error = %e, "cache: seed object skipped"),
            }
        }
        added
    }

    /// Every known object, seeds first, then fetched children in arrival order.
    pub fn objects(&self) -> Vec<Resource> { self.inner.lock().objects.clone() }

    pub fn get(&self, id: &NodeId) -> Option<Resource> {
        let st = self.inner.lock();
        st.index.get(id).map(|i| st.objects[*i].clone())
    }

    pub fn cached(&self, id: &NodeId) -> Option<Children> { self.inner.lock().resolved.get(id).cloned() }

    pub fn is_expanded(&self, id: &NodeId) -> bool { self.inner.lock().resolved.contains_key(id) }

    /// Fetch failures recorded since the last reset.
    pub fn failures(&self) -> Vec<GraphError> { self.inner.lock().failures.clone() }

    pub fn generation(&self) -> u64 { self.inner.lock().generation }

    /// Abandon the current render: in-flight fetches finish but store nothing, and
    /// cached expansions are dropped. Known objects stay.
    pub fn reset(&self) {
        let mut st = self.inner.lock();
        st.generation += 1;
        st.resolved.clear();
        st.inflight.clear();
        st.failures.clear();
        debug!(generation = st.generation, "cache: reset");
    }

    /// Like [`reset`](Self::reset) and also forget every object.
    pub fn clear(&self) {
        self.reset();
        let mut st = self.inner.lock();
        st.objects.clear();
        st.index.clear();
    }

    /// Resolve the references declared by `id`. Cached results return immediately;
    /// a concurrent call for the same id awaits the running fetch.
    pub async fn expand(&self, id: &NodeId) -> Result<Children, FetchError> {
        let fut = {
            let mut st = self.inner.lock();
            if let Some(hit) = st.resolved.get(id) {
                return Ok(hit.clone());
            }
            if let Some(running) = st.inflight.get(id) {
                counter!("fetch_coalesced_total", 1u64);
                debug!(%id, "cache: joined in-flight expand");
                running.clone()
            } else {
                let parent = st.index.get(id).map(|i| st.objects[*i].clone()).ok_or_else(|| FetchError::UnknownNode(id.clone()))?;
                let fut = fetch_children(self.inner.clone(), parent, st.generation).boxed().shared();
                st.inflight.insert(id.clone(), fut.clone());
                fut
            }
        };
        fut.await
    }

    /// Expand every frontier node concurrently and return the expandable children
    /// not seen before.
    pub async fn expand_wave(&self, frontier: &[NodeId], seen: &mut FxHashSet<NodeId>) -> Result<Vec<NodeId>, FetchError> {
        let results = join_all(frontier.iter().map(|id| self.expand(id))).await;
        let mut next = Vec::new();
        for res in results {
            for child in res?.iter() {
                if expandable(child) && seen.insert(child.id.clone()) {
                    next.push(child.id.clone());
                }
            }
        }
        Ok(next)
    }

    /// Breadth-first sweep from `roots`, one level per wave, until no new
    /// expandable children appear or the depth guard is hit.
    pub async fn expand_all(&self, roots: &[NodeId]) -> Result<ExpandAllReport, FetchError> {
        self.expand_all_with(roots, |_| true).await
    }

    /// [`expand_all`](Self::expand_all) calling `on_wave` with each finished
    /// frontier. Returning `false` stops the sweep with [`FetchError::Abandoned`].
    pub async fn expand_all_with(
        &self,
        roots: &[NodeId],
        mut on_wave: impl FnMut(&[NodeId]) -> bool,
    ) -> Result<ExpandAllReport, FetchError> {
        let mut report = ExpandAllReport::default();
        let mut seen: FxHashSet<NodeId> = roots.iter().cloned().collect();
        let mut frontier: Vec<NodeId> =
            roots.iter().filter(|id| self.get(id).map(|r| expandable(&r)).unwrap_or(false)).cloned().collect();
        while let Some(head) = frontier.first().cloned() {
            if report.waves >= self.max_depth {
                warn!(max_depth = self.max_depth, pending = frontier.len(), "cache: depth guard hit");
                report.truncated = true;
                break;
            }
            let next = self.expand_wave(&frontier, &mut seen).await?;
            report.waves += 1;
            if !on_wave(&frontier) {
                return Err(FetchError::Abandoned(head));
            }
            report.expanded.extend(frontier);
            frontier = next;
        }
        info!(waves = report.waves, expanded = report.expanded.len(), truncated = report.truncated, "cache: expand-all done");
        Ok(report)
    }
}

async fn fetch_children(inner: Arc<Inner>, parent: Resource, generation: u64) -> Result<Children, FetchError> {
    let t0 = Instant::now();
    let rel = extract::extract(&parent.raw);
    let targets: Vec<ObjectRef> =
        rel.references.into_iter().map(|r| r.in_namespace(parent.namespace.as_deref())).collect();
    let accessor = inner.accessor.clone();
    let results = join_all(targets.iter().map(|t| accessor.resolve(t))).await;

    let mut children = Vec::new();
    let mut failures = Vec::new();
    for (target, res) in targets.iter().zip(results) {
        let message = match res {
            Ok(Some(mut v)) => {
                strip_noise(&mut v);
                match Resource::from_value(v) {
                    Ok(r) => {
                        children.push(r);
                        continue;
                    }
                    Err(e) => e.to_string(),
                }
            }
            Ok(None) => "not found".to_string(),
            Err(e) => e.to_string(),
        };
        warn!(parent = %parent.id, %target, error = %message, "cache: child fetch failed");
        counter!("fetch_failures_total", 1u64);
        failures.push(GraphError::FetchFailure { target: target.clone(), message });
    }

    let mut st = inner.lock();
    if st.generation != generation {
        debug!(parent = %parent.id, "cache: discarding result of abandoned fetch");
        return Err(FetchError::Abandoned(parent.id.clone()));
    }
    st.inflight.remove(&parent.id);
    for c in &children {
        st.register(c.clone());
    }
    st.failures.extend(failures);
    let children: Children = Arc::new(children);
    st.resolved.insert(parent.id.clone(), children.clone());
    drop(st);

    let took = t0.elapsed().as_secs_f64() * 1000.0;
    histogram!("fetch_expand_ms", took);
    info!(parent = %parent.id, targets = targets.len(), children = children.len(), took_ms = took as u64, "cache: expanded");
    Ok(children)
}

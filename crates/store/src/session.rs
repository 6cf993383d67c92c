//! Render session: one fetch cache plus the published graph snapshot.
//!
//! Each expansion wave rebuilds the graph from every known object and swaps it
//! in atomically; readers hold `Arc`s to whatever was current.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;
use strata_core::{GraphError, NodeId};
use strata_graph::{build, AnchorHint, Graph};
use tokio::sync::watch;
use tracing::debug;

use crate::accessor::ChildAccessor;
use crate::cache::{Children, ExpandAllReport, FetchCache, FetchError};

/// Immutable view handed to renderers.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub epoch: u64,
    pub graph: Graph,
    /// Fetch failures at publication time.
    pub failures: Vec<GraphError>,
}

/// Read side: current snapshot and epoch notifications.
#[derive(Clone)]
pub struct SessionHandle {
    snap: Arc<ArcSwap<Snapshot>>,
    epoch_rx: watch::Receiver<u64>,
}

impl SessionHandle {
    pub fn current(&self) -> Arc<Snapshot> { self.snap.load_full() }
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_rx.clone() }
}

pub struct Session {
    cache: FetchCache,
    hint: Option<AnchorHint>,
    seeds: Vec<NodeId>,
    snap: Arc<ArcSwap<Snapshot>>,
    epoch: AtomicU64,
    epoch_tx: watch::Sender<u64>,
    epoch_rx: watch::Receiver<u64>,
}

impl Session {
    pub fn new(accessor: Arc<dyn ChildAccessor>, hint: Option<AnchorHint>) -> Self {
        Self::with_cache(FetchCache::new(accessor), hint)
    }

    pub fn with_cache(cache: FetchCache, hint: Option<AnchorHint>) -> Self {
        let (epoch_tx, epoch_rx) = watch::channel(0u64);
        Self {
            cache,
            hint,
            seeds: Vec::new(),
            snap: Arc::new(ArcSwap::from_pointee(Snapshot::default())),
            epoch: AtomicU64::new(0),
            epoch_tx,
            epoch_rx,
        }
    }

    pub fn handle(&self) -> SessionHandle { SessionHandle { snap: Arc::clone(&self.snap), epoch_rx: self.epoch_rx.clone() } }

    pub fn cache(&self) -> &FetchCache { &self.cache }

    pub fn current(&self) -> Arc<Snapshot> { self.snap.load_full() }

    /// Add the initial objects and publish the first snapshot.
    pub fn seed(&mut self, values: impl IntoIterator<Item = Value>) -> Arc<Snapshot> {
        let added = self.cache.seed(values);
        self.seeds.extend(added);
        let generation = self.cache.generation();
        self.publish(generation).unwrap_or_else(|| self.current())
    }

    /// Expand one node and publish the grown graph.
    pub async fn expand(&self, id: &NodeId) -> Result<Children, FetchError> {
        let generation = self.cache.generation();
        let children = self.cache.expand(id).await?;
        self.publish(generation);
        Ok(children)
    }

    /// Expand everything reachable from the seeds, publishing once per wave.
    pub async fn expand_all(&self) -> Result<ExpandAllReport, FetchError> {
        let generation = self.cache.generation();
        self.cache.expand_all_with(&self.seeds, |_| self.publish(generation).is_some()).await
    }

    /// Drop this render's fetch results. In-flight work completes but nothing it
    /// produces is stored or published.
    pub fn abandon(&self) { self.cache.reset(); }

    /// Rebuild and swap in a snapshot unless the cache moved to another generation.
    fn publish(&self, generation: u64) -> Option<Arc<Snapshot>> {
        if self.cache.generation() != generation {
            debug!(generation, "session: stale generation, not publishing");
            return None;
        }
        let graph = build(self.cache.objects(), self.hint.as_ref());
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let next = Arc::new(Snapshot { epoch, graph, failures: self.cache.failures() });
        self.snap.store(Arc::clone(&next));
        let _ = self.epoch_tx.send(epoch);
        debug!(epoch, nodes = next.graph.len(), "session: published");
        Some(next)
    }
}

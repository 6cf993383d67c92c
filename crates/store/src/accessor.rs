//! Child accessor seam: how the cache reaches objects it does not hold yet.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_core::{ObjectRef, Resource};

/// Accessor errors. A missing object is not an error: `resolve` returns `Ok(None)`.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccessError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("internal: {0}")]
    Internal(String),
}

/// Resolves one reference to its object. Must be idempotent and safe to call
/// concurrently.
#[async_trait::async_trait]
pub trait ChildAccessor: Send + Sync {
    async fn resolve(&self, target: &ObjectRef) -> Result<Option<Value>, AccessError>;
}

/// In-memory accessor for tests and file-backed sessions.
#[derive(Default)]
pub struct MemoryAccessor {
    objects: Vec<Resource>,
    failing: FxHashSet<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    per_name: std::sync::Mutex<FxHashMap<String, usize>>,
}

impl MemoryAccessor {
    pub fn new() -> Self { Self::default() }

    /// Objects that `resolve` can return. Malformed values are ignored.
    pub fn with_objects(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.objects.extend(values.into_iter().filter_map(|v| Resource::from_value(v).ok()));
        self
    }

    /// Every reference with this name fails with [`AccessError::Internal`].
    pub fn failing(mut self, name: impl Into<String>) -> Self {
        self.failing.insert(name.into());
        self
    }

    /// Sleep before answering, so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Total `resolve` calls so far.
    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

    pub fn calls_for(&self, name: &str) -> usize {
        self.per_name.lock().map(|m| m.get(name).copied().unwrap_or(0)).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl ChildAccessor for MemoryAccessor {
    async fn resolve(&self, target: &ObjectRef) -> Result<Option<Value>, AccessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut m) = self.per_name.lock() {
            *m.entry(target.name.clone()).or_default() += 1;
        }
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.failing.contains(&target.name) {
            return Err(AccessError::Internal(format!("injected failure for {}", target.name)));
        }
        Ok(self.objects.iter().find(|r| r.matches_ref(target)).map(|r| (*r.raw).clone()))
    }
}

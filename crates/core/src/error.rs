//! Error taxonomy for graph construction.
//!
//! Everything except [`GraphError::NoAnchorFound`] is per-node or per-link and is
//! recorded as a diagnostic rather than returned.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::{NodeId, ObjectRef};

#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum GraphError {
    /// A relation field was present but unusable; treated as "no link".
    #[error("extraction skipped on {id}: {reason}")]
    ExtractionSkipped { id: NodeId, reason: String },
    /// A link names an object that is not part of the current collection.
    #[error("dangling reference from {from} to {target}")]
    DanglingReference { from: NodeId, target: ObjectRef },
    /// The child accessor failed for one target; siblings are unaffected.
    #[error("fetch failed for {target}: {message}")]
    FetchFailure { target: ObjectRef, message: String },
    #[error("no anchor found")]
    NoAnchorFound,
    /// A traversal reached a node it had already visited through a back edge.
    #[error("cycle detected at {at}")]
    CycleDetected { at: NodeId },
    /// The object lacks the fields needed to become a node.
    #[error("malformed object: {0}")]
    MalformedObject(String),
}

impl GraphError {
    /// Stable short label, used for metrics and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            GraphError::ExtractionSkipped { .. } => "extraction_skipped",
            GraphError::DanglingReference { .. } => "dangling_reference",
            GraphError::FetchFailure { .. } => "fetch_failure",
            GraphError::NoAnchorFound => "no_anchor_found",
            GraphError::CycleDetected { .. } => "cycle_detected",
            GraphError::MalformedObject(_) => "malformed_object",
        }
    }
}

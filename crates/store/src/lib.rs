//! Strata store: hierarchical fetch cache and the render session that publishes
//! graph snapshots as expansion proceeds.

#![forbid(unsafe_code)]

pub mod accessor;
pub mod cache;
pub mod session;

pub use accessor::{AccessError, ChildAccessor, MemoryAccessor};
pub use cache::{expandable, Children, ExpandAllReport, FetchCache, FetchError};
pub use session::{Session, SessionHandle, Snapshot};

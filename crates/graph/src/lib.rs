//! Strata graph engine: extract relations from raw objects, build a classified
//! graph, lay it out, and derive what is visible under collapse, hover and filter.
//!
//! Everything here is synchronous and pure over an immutable [`Graph`].

#![forbid(unsafe_code)]

pub mod build;
pub mod extract;
pub mod filter;
pub mod layout;
pub mod tree;
pub mod visibility;

pub use build::{build, build_from_values, try_build, AnchorHint, Dangling, Graph};
pub use extract::{extract, OwnerLink, Relations};
pub use filter::{filter, filter_by, options, relative_age, Attribute, ExpandState, FilterOutcome, FilterParseError, FilterState};
pub use layout::{count_crossings, layout, layout_with, Layout, LayoutConfig, Position};
pub use tree::{tree_rows, TreeRow};
pub use visibility::{
    ancestors, descendants, hidden_by_collapse, path_highlight, styled_edges, visible, CollapseSet, EdgeStyle, Emphasis,
    Highlight, Visibility,
};

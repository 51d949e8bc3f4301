//! Interference-graph coloring variant
//!
//! Ranges outside a vertex cover form an independent set: no two of them
//! interfere, so each can be colored on its own with a plain freedom check.
//! A few rounds of that run before whatever is left goes to a residual
//! allocator through the regular driver.

mod cover;
mod graph;
mod mis;

pub use cover::{parse_cover, FileCover, FixedCover, GreedyCover, VertexCoverSource};
pub use graph::{InterferenceGraph, NodeId};
pub use mis::MisColoring;

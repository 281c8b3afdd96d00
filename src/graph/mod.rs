//! Local knowledge graph: adjacency store, node variants and the id registry.
//!
//! Nothing here talks to the network; the analyzer fills these structures
//! from query results and reads them back to assemble paths.

mod directed;
mod node;
mod registry;

pub use directed::DirectedGraph;
pub use node::{KgNode, NodeKind, NodeRef};
pub use registry::NodeRegistry;

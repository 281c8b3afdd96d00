//! Fetch deduplication: one remote round-trip per (node, domain).

mod status;

pub use status::{FetchDomain, FetchState, NodeStatus};

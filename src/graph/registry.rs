//! Id-keyed registries of known nodes and their fetch status.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::fetch::NodeStatus;
use crate::graph::{KgNode, NodeKind};

/// Every node an Analyzer has discovered, plus lazily created fetch metadata.
///
/// Cross-references are by id only; callers get clones, never interior pointers.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<HashMap<i64, KgNode>>,
    statuses: Mutex<HashMap<i64, Arc<NodeStatus>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Returns true if the id was new.
    ///
    /// The first registration of an id wins. Re-registering under a different
    /// variant is logged and otherwise ignored; a later registration that
    /// carries a name fills in a missing one.
    pub fn register(&self, node: KgNode) -> bool {
        let mut nodes = self.nodes.write().unwrap();
        match nodes.get(&node.id()) {
            None => {
                nodes.insert(node.id(), node);
                true
            }
            Some(existing) if existing.kind() != node.kind() => {
                log::warn!(
                    "Node {} already registered as {}, ignoring re-registration as {}",
                    node.id(),
                    existing.kind(),
                    node.kind()
                );
                false
            }
            Some(existing) => {
                if existing.name().is_none() && node.name().is_some() {
                    nodes.insert(node.id(), node);
                }
                false
            }
        }
    }

    pub fn get(&self, id: i64) -> Option<KgNode> {
        self.nodes.read().unwrap().get(&id).cloned()
    }

    pub fn kind_of(&self, id: i64) -> Option<NodeKind> {
        self.nodes.read().unwrap().get(&id).map(|n| n.kind())
    }

    /// Fetch status for `id`, created on first access.
    pub fn status(&self, id: i64) -> Arc<NodeStatus> {
        let mut statuses = self.statuses.lock().unwrap();
        Arc::clone(
            statuses
                .entry(id)
                .or_insert_with(|| Arc::new(NodeStatus::new(id))),
        )
    }

    pub fn len(&self) -> usize {
        self.nodes.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchDomain;

    #[test]
    fn test_register_and_get() {
        let registry = NodeRegistry::new();
        assert!(registry.register(KgNode::new(NodeKind::Paper, 1, Some("a paper".into()))));
        assert!(!registry.register(KgNode::new(NodeKind::Paper, 1, None)));

        let node = registry.get(1).unwrap();
        assert_eq!(node.kind(), NodeKind::Paper);
        assert_eq!(node.name(), Some("a paper"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_conflicting_variant_keeps_first() {
        let registry = NodeRegistry::new();
        registry.register(KgNode::new(NodeKind::Author, 2, None));
        assert!(!registry.register(KgNode::new(NodeKind::Paper, 2, None)));
        assert_eq!(registry.kind_of(2), Some(NodeKind::Author));
    }

    #[test]
    fn test_name_filled_in_later() {
        let registry = NodeRegistry::new();
        registry.register(KgNode::new(NodeKind::Affiliation, 3, None));
        registry.register(KgNode::new(NodeKind::Affiliation, 3, Some("mit".into())));
        assert_eq!(registry.get(3).unwrap().name(), Some("mit"));
    }

    #[test]
    fn test_status_is_shared_per_id() {
        let registry = NodeRegistry::new();
        let a = registry.status(10);
        let b = registry.status(10);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.try_mark_fetching(FetchDomain::LocalNeighborhood));
        assert!(!b.try_mark_fetching(FetchDomain::LocalNeighborhood));
        assert!(!Arc::ptr_eq(&a, &registry.status(11)));
    }
}

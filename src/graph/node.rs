//! Knowledge-graph node variants.

use serde::Serialize;
use std::fmt;

/// Discriminant of a [`KgNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeKind {
    Paper,
    Author,
    Affiliation,
    Conference,
    Journal,
    FieldOfStudy,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Paper => "paper",
            NodeKind::Author => "author",
            NodeKind::Affiliation => "affiliation",
            NodeKind::Conference => "conference",
            NodeKind::Journal => "journal",
            NodeKind::FieldOfStudy => "field-of-study",
        };
        f.write_str(name)
    }
}

/// Identity shared by every node variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NodeRef {
    pub id: i64,
    pub name: Option<String>,
}

/// An entity of the academic graph. Immutable once registered.
#[derive(Debug, Clone, Serialize)]
pub enum KgNode {
    Paper(NodeRef),
    Author(NodeRef),
    Affiliation(NodeRef),
    Conference(NodeRef),
    Journal(NodeRef),
    FieldOfStudy(NodeRef),
}

impl KgNode {
    pub fn new(kind: NodeKind, id: i64, name: Option<String>) -> Self {
        let r = NodeRef { id, name };
        match kind {
            NodeKind::Paper => KgNode::Paper(r),
            NodeKind::Author => KgNode::Author(r),
            NodeKind::Affiliation => KgNode::Affiliation(r),
            NodeKind::Conference => KgNode::Conference(r),
            NodeKind::Journal => KgNode::Journal(r),
            NodeKind::FieldOfStudy => KgNode::FieldOfStudy(r),
        }
    }

    fn node_ref(&self) -> &NodeRef {
        match self {
            KgNode::Paper(r)
            | KgNode::Author(r)
            | KgNode::Affiliation(r)
            | KgNode::Conference(r)
            | KgNode::Journal(r)
            | KgNode::FieldOfStudy(r) => r,
        }
    }

    pub fn id(&self) -> i64 {
        self.node_ref().id
    }

    pub fn name(&self) -> Option<&str> {
        self.node_ref().name.as_deref()
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            KgNode::Paper(_) => NodeKind::Paper,
            KgNode::Author(_) => NodeKind::Author,
            KgNode::Affiliation(_) => NodeKind::Affiliation,
            KgNode::Conference(_) => NodeKind::Conference,
            KgNode::Journal(_) => NodeKind::Journal,
            KgNode::FieldOfStudy(_) => NodeKind::FieldOfStudy,
        }
    }
}

// Identity is the id within a variant; display names are not compared.
impl PartialEq for KgNode {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.id() == other.id()
    }
}

impl Eq for KgNode {}

impl fmt::Display for KgNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}:{} ({})", self.kind(), self.id(), name),
            None => write!(f, "{}:{}", self.kind(), self.id()),
        }
    }
}

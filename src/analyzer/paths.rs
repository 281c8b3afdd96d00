use serde::Serialize;

use super::Analyzer;
use crate::error::Result;

/// Node ids from the first seed to the second, both inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Path(Vec<i64>);

impl Path {
    pub fn new(ids: Vec<i64>) -> Self {
        Self(ids)
    }

    pub fn ids(&self) -> &[i64] {
        &self.0
    }

    /// Number of edges.
    pub fn hops(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    pub fn into_ids(self) -> Vec<i64> {
        self.0
    }
}

impl Analyzer {
    /// Read 1- and 2-hop paths out of the local graph.
    pub(crate) fn assemble(&self, id1: i64, id2: i64) -> Result<Vec<Path>> {
        let mut paths = Vec::new();
        if self.graph.contains_edge(id1, id2) {
            paths.push(Path::new(vec![id1, id2]));
        }

        let outgoing = self.graph.out_neighbors(id1)?;
        let incoming = self.graph.in_neighbors(id2)?;
        paths.extend(
            outgoing
                .intersection(&incoming)
                .filter(|x| **x != id1 && **x != id2)
                .map(|x| Path::new(vec![id1, *x, id2])),
        );
        Ok(paths)
    }
}

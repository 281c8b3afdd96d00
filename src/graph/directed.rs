//! Thread-safe adjacency-list store of discovered vertices and edges.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::RwLock;

use crate::error::{PathfinderError, Result};

#[derive(Debug)]
struct Adjacency<V> {
    outgoing: HashSet<V>,
    incoming: HashSet<V>,
}

impl<V> Default for Adjacency<V> {
    fn default() -> Self {
        Self {
            outgoing: HashSet::new(),
            incoming: HashSet::new(),
        }
    }
}

#[derive(Debug)]
struct Inner<V> {
    vertices: HashMap<V, Adjacency<V>>,
    edge_count: usize,
}

/// Directed graph keyed by vertex id.
///
/// Both adjacency sides of an edge are written under one lock, so a reader of
/// either side never sees a half-inserted edge.
#[derive(Debug)]
pub struct DirectedGraph<V> {
    inner: RwLock<Inner<V>>,
}

impl<V> Default for DirectedGraph<V>
where
    V: Copy + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> DirectedGraph<V>
where
    V: Copy + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                vertices: HashMap::new(),
                edge_count: 0,
            }),
        }
    }

    /// Add a vertex. Returns false if it was already present.
    pub fn add_vertex(&self, v: V) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.vertices.contains_key(&v) {
            return false;
        }
        inner.vertices.insert(v, Adjacency::default());
        true
    }

    /// Add the edge `from -> to`, registering missing endpoints.
    ///
    /// Returns false if the edge already existed. Self-loops are rejected.
    pub fn add_edge(&self, from: V, to: V) -> Result<bool> {
        if from == to {
            return Err(PathfinderError::GraphIntegrity(format!(
                "self-loop on vertex {:?}",
                from
            )));
        }

        let mut inner = self.inner.write().unwrap();
        let inserted = inner
            .vertices
            .entry(from)
            .or_default()
            .outgoing
            .insert(to);
        if !inserted {
            return Ok(false);
        }
        inner.vertices.entry(to).or_default().incoming.insert(from);
        inner.edge_count += 1;
        Ok(true)
    }

    pub fn contains_edge(&self, from: V, to: V) -> bool {
        self.inner
            .read()
            .unwrap()
            .vertices
            .get(&from)
            .map(|adj| adj.outgoing.contains(&to))
            .unwrap_or(false)
    }

    /// Snapshot of the vertices `v` points to.
    pub fn out_neighbors(&self, v: V) -> Result<HashSet<V>> {
        let inner = self.inner.read().unwrap();
        inner
            .vertices
            .get(&v)
            .map(|adj| adj.outgoing.clone())
            .ok_or_else(|| vertex_not_found(v))
    }

    /// Snapshot of the vertices pointing to `v`.
    pub fn in_neighbors(&self, v: V) -> Result<HashSet<V>> {
        let inner = self.inner.read().unwrap();
        inner
            .vertices
            .get(&v)
            .map(|adj| adj.incoming.clone())
            .ok_or_else(|| vertex_not_found(v))
    }

    pub fn vertex_count(&self) -> usize {
        self.inner.read().unwrap().vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.read().unwrap().edge_count
    }
}

fn vertex_not_found<V: Debug>(v: V) -> PathfinderError {
    PathfinderError::GraphIntegrity(format!("vertex not found: {:?}", v))
}

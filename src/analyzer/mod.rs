//! Path-finding orchestrator.
//!
//! An [`Analyzer`] owns one lazily discovered slice of the academic graph.
//! `find_paths` resolves both seeds, explores their neighbourhoods, runs the
//! interception strategy for the seeds' type pair, and reads 1- and 2-hop
//! paths back out of the local graph. Every remote fetch goes through the
//! per-node fetch tracker, so concurrent queries on one analyzer share work
//! instead of repeating it.

mod explore;
mod intercept;
mod paths;

pub use paths::Path;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::try_join;
use serde::Serialize;

use crate::cache::CitationCountCache;
use crate::config::{Config, ExplorationConfig};
use crate::error::{PathfinderError, Result};
use crate::fetch::{FetchDomain, NodeStatus};
use crate::graph::{DirectedGraph, KgNode, NodeKind, NodeRegistry};
use crate::query::expression::{author_is, id_eq, or};
use crate::query::types::PAPER_ATTRIBUTES;
use crate::query::{ChainLimits, QueryClient, QueryStats};

/// Records requested when resolving a seed. A paper id matches its own
/// record; an author id matches an id-only stub plus the author's papers.
const RESOLVE_WINDOW: usize = 2;

/// Snapshot of an analyzer's graph and its client's counters.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerStats {
    pub vertex_count: usize,
    pub edge_count: usize,
    pub node_count: usize,
    pub query: QueryStats,
}

pub struct Analyzer {
    client: Arc<QueryClient>,
    graph: DirectedGraph<i64>,
    registry: NodeRegistry,
    citation_counts: Arc<CitationCountCache>,
    limits: ChainLimits,
    exploration: ExplorationConfig,
}

impl Analyzer {
    pub fn new(
        client: Arc<QueryClient>,
        citation_counts: Arc<CitationCountCache>,
        limits: ChainLimits,
        exploration: ExplorationConfig,
    ) -> Self {
        Self {
            client,
            graph: DirectedGraph::new(),
            registry: NodeRegistry::new(),
            citation_counts,
            limits,
            exploration,
        }
    }

    /// Fresh analyzer over a shared client and citation cache.
    pub fn from_config(
        client: Arc<QueryClient>,
        citation_counts: Arc<CitationCountCache>,
        config: &Config,
    ) -> Self {
        Self::new(
            client,
            citation_counts,
            ChainLimits::from(&config.limits),
            config.exploration.clone(),
        )
    }

    /// All distinct 1- and 2-hop paths from `id1` to `id2`.
    ///
    /// Fails with [`PathfinderError::UnknownEntity`] if either id is neither a
    /// paper nor an author. Any remote failure fails the whole call; the
    /// analyzer should be discarded afterwards.
    pub async fn find_paths(&self, id1: i64, id2: i64) -> Result<Vec<Path>> {
        let start = Instant::now();
        let (kind1, kind2) = try_join(self.resolve(id1), self.resolve(id2)).await?;
        if id1 == id2 {
            return Ok(Vec::new());
        }
        self.graph.add_vertex(id1);
        self.graph.add_vertex(id2);

        try_join(self.explore_local(id1, kind1), self.explore_local(id2, kind2)).await?;
        self.intercept(id1, kind1, id2, kind2).await?;

        let mut paths = self.assemble(id1, id2)?;
        // Three-hop paths are not searched.
        paths.sort();
        paths.dedup();

        log::info!(
            "{} {} -> {} {}: {} paths ({} direct) in {:?} ({} vertices, {} edges)",
            kind1,
            id1,
            kind2,
            id2,
            paths.len(),
            paths.iter().filter(|p| p.hops() == 1).count(),
            start.elapsed(),
            self.graph.vertex_count(),
            self.graph.edge_count()
        );
        Ok(paths)
    }

    /// [`find_paths`](Self::find_paths) as bare id sequences.
    pub async fn find_path_ids(&self, id1: i64, id2: i64) -> Result<Vec<Vec<i64>>> {
        let paths = self.find_paths(id1, id2).await?;
        Ok(paths.into_iter().map(Path::into_ids).collect())
    }

    /// Decide whether `id` is a paper or an author.
    ///
    /// Known ids are answered from the registry. Otherwise one remote lookup
    /// per id is shared by all concurrent callers; a paper found this way is
    /// ingested with its whole local neighbourhood.
    pub async fn resolve(&self, id: i64) -> Result<NodeKind> {
        if self.registry.kind_of(id).is_none() {
            self.fetch_once(id, FetchDomain::Resolution, || async {
                let expr = or(&id_eq(id), &author_is(id));
                let result = self
                    .client
                    .evaluate(&expr, RESOLVE_WINDOW, 0, None, PAPER_ATTRIBUTES)
                    .await?;

                // The seed's own record is the paper itself when it carries
                // authors; otherwise it is the service's id-only author stub.
                let own = result.entities.iter().find(|e| e.id == id);
                if let Some(paper) = own.filter(|e| !e.authors.is_empty()) {
                    return self.ingest_resolved_paper(paper);
                }

                let entry = result.entities.iter().find_map(|e| e.author_entry(id));
                if own.is_some() || entry.is_some() {
                    self.registry.register(KgNode::new(
                        NodeKind::Author,
                        id,
                        entry.and_then(|a| a.author_name.clone()),
                    ));
                } else {
                    log::debug!("Id {} matched neither a paper nor an author", id);
                }
                Ok(())
            })
            .await?;
        }

        match self.registry.kind_of(id) {
            Some(kind @ (NodeKind::Paper | NodeKind::Author)) => Ok(kind),
            _ => Err(PathfinderError::UnknownEntity(id)),
        }
    }

    /// What the analyzer has learned about `id` so far.
    pub fn node(&self, id: i64) -> Option<KgNode> {
        self.registry.get(id)
    }

    pub fn stats(&self) -> AnalyzerStats {
        AnalyzerStats {
            vertex_count: self.graph.vertex_count(),
            edge_count: self.graph.edge_count(),
            node_count: self.registry.len(),
            query: self.client.stats(),
        }
    }

    /// Run `work` once per (`id`, `domain`) across all concurrent callers.
    async fn fetch_once<F, Fut>(&self, id: i64, domain: FetchDomain, work: F) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let status: Arc<NodeStatus> = self.registry.status(id);
        status.fetch_once(domain, work).await
    }
}

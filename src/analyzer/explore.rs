//! Neighbourhood exploration and ingestion of paper records into the graph.

use super::Analyzer;
use crate::error::Result;
use crate::fetch::FetchDomain;
use crate::graph::{KgNode, NodeKind};
use crate::query::expression::{author_is, id_eq, references};
use crate::query::types::{Entity, PAPER_ATTRIBUTES};
use crate::query::PaginationMode;

impl Analyzer {
    /// Fetch the immediate neighbourhood of a resolved seed once.
    pub(crate) async fn explore_local(&self, id: i64, kind: NodeKind) -> Result<()> {
        match kind {
            NodeKind::Author => self.explore_author_papers(id).await,
            _ => {
                self.fetch_once(id, FetchDomain::LocalNeighborhood, || async {
                    let result = self
                        .client
                        .evaluate(&id_eq(id), 1, 0, None, PAPER_ATTRIBUTES)
                        .await?;
                    match result.entities.iter().find(|e| e.id == id) {
                        Some(paper) => self.ingest_paper(paper),
                        None => {
                            log::debug!("No record for paper {}", id);
                            Ok(())
                        }
                    }
                })
                .await?;
                Ok(())
            }
        }
    }

    /// List every paper written by `author`, up to the configured bound.
    pub(crate) async fn explore_author_papers(&self, author: i64) -> Result<()> {
        self.fetch_once(author, FetchDomain::AuthorPapers, || async {
            let count = self
                .ingest_all(
                    &author_is(author),
                    self.exploration.author_paper_bound,
                    PaginationMode::Optimistic,
                )
                .await?;
            log::debug!("Author {}: {} papers", author, count);
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// List every paper citing `paper`.
    ///
    /// A cached citation count sizes the pagination exactly; without one the
    /// paginator ramps up from a single page under `citation_bound`.
    pub(crate) async fn explore_citations(&self, paper: i64) -> Result<()> {
        self.fetch_once(paper, FetchDomain::Citations, || async {
            let (bound, mode) = match self.citation_counts.get(paper) {
                Some(count) => (
                    (count as usize).min(self.exploration.citation_bound),
                    PaginationMode::Pessimistic,
                ),
                None => (self.exploration.citation_bound, PaginationMode::Optimistic),
            };
            let count = self.ingest_all(&references(paper), bound, mode).await?;
            log::debug!("Paper {}: {} citing papers", paper, count);
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Page through `expr` and ingest every returned paper.
    pub(crate) async fn ingest_all(&self, expr: &str, bound: usize, mode: PaginationMode) -> Result<usize> {
        self.client
            .evaluate_all(expr, bound, mode, PAPER_ATTRIBUTES, |page| {
                page.entities.iter().try_for_each(|e| self.ingest_paper(e))
            })
            .await
    }

    /// Ingest the record a seed resolved to and mark its neighbourhood fetched.
    ///
    /// The domain is claimed before anything is registered, so a concurrent
    /// caller that sees the new registry entry waits instead of refetching.
    pub(crate) fn ingest_resolved_paper(&self, paper: &Entity) -> Result<()> {
        let status = self.registry.status(paper.id);
        let claimed = status.try_mark_fetching(FetchDomain::LocalNeighborhood);
        let ingested = self.ingest_paper(paper);
        if claimed {
            match &ingested {
                Ok(()) => status.mark_fetched(FetchDomain::LocalNeighborhood)?,
                Err(e) => status.mark_failed(FetchDomain::LocalNeighborhood, e.to_string())?,
            }
        }
        ingested
    }

    /// Add a paper record and everything it mentions to the graph.
    ///
    /// References become one-way edges; authorship, affiliation, field and
    /// venue links are stored in both directions.
    pub(crate) fn ingest_paper(&self, paper: &Entity) -> Result<()> {
        let id = paper.id;
        self.registry
            .register(KgNode::new(NodeKind::Paper, id, paper.title.clone()));
        self.graph.add_vertex(id);
        if let Some(count) = paper.citation_count {
            self.citation_counts.put(id, count);
        }

        for &reference in &paper.references {
            self.registry
                .register(KgNode::new(NodeKind::Paper, reference, None));
            self.connect(id, reference, false)?;
        }

        for entry in &paper.authors {
            self.registry.register(KgNode::new(
                NodeKind::Author,
                entry.author_id,
                entry.author_name.clone(),
            ));
            self.connect(id, entry.author_id, true)?;
            if let Some(affiliation) = entry.affiliation_id {
                self.registry.register(KgNode::new(
                    NodeKind::Affiliation,
                    affiliation,
                    entry.affiliation_name.clone(),
                ));
                self.connect(entry.author_id, affiliation, true)?;
            }
        }

        for field in &paper.fields {
            self.registry
                .register(KgNode::new(NodeKind::FieldOfStudy, field.id, field.name.clone()));
            self.connect(id, field.id, true)?;
        }
        if let Some(conference) = &paper.conference {
            self.registry
                .register(KgNode::new(NodeKind::Conference, conference.id, conference.name.clone()));
            self.connect(id, conference.id, true)?;
        }
        if let Some(journal) = &paper.journal {
            self.registry
                .register(KgNode::new(NodeKind::Journal, journal.id, journal.name.clone()));
            self.connect(id, journal.id, true)?;
        }
        Ok(())
    }

    /// Add `from -> to`, and `to -> from` when `both`. Self-references in
    /// service data are dropped.
    pub(crate) fn connect(&self, from: i64, to: i64, both: bool) -> Result<()> {
        if from == to {
            log::debug!("Dropping self-reference on {}", from);
            return Ok(());
        }
        self.graph.add_edge(from, to)?;
        if both {
            self.graph.add_edge(to, from)?;
        }
        Ok(())
    }

    /// Known out-neighbours of `id` of the given kind, in ascending order.
    pub(crate) fn neighbors_of_kind(&self, id: i64, kind: NodeKind) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = self
            .graph
            .out_neighbors(id)?
            .into_iter()
            .filter(|n| self.registry.kind_of(*n) == Some(kind))
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

//! Targeted searches for nodes that bridge two seeds, one strategy per type pair.

use futures_util::future::{try_join, try_join_all};

use super::Analyzer;
use crate::error::{PathfinderError, Result};
use crate::fetch::FetchDomain;
use crate::graph::NodeKind;
use crate::query::expression::{and, author_is, author_with_affiliation, references};
use crate::query::{BatchKind, PaginationMode};

impl Analyzer {
    /// Run the interception strategy for `(kind1, kind2)` once per seed pair.
    pub(crate) async fn intercept(
        &self,
        id1: i64,
        kind1: NodeKind,
        id2: i64,
        kind2: NodeKind,
    ) -> Result<()> {
        self.fetch_once(id1, FetchDomain::Interception(id2), || async {
            match (kind1, kind2) {
                (NodeKind::Paper, NodeKind::Paper) => self.intercept_paper_paper(id1, id2).await,
                (NodeKind::Paper, NodeKind::Author) => self.intercept_paper_author(id1, id2).await,
                (NodeKind::Author, NodeKind::Paper) => self.intercept_author_paper(id1, id2).await,
                (NodeKind::Author, NodeKind::Author) => self.intercept_author_author(id1, id2).await,
                (a, b) => Err(PathfinderError::Internal(format!(
                    "no interception strategy for {} -> {}",
                    a, b
                ))),
            }
        })
        .await?;
        Ok(())
    }

    /// Papers citing both seeds, and references of `source` that cite `target`.
    async fn intercept_paper_paper(&self, source: i64, target: i64) -> Result<()> {
        let co_citing = and(&references(source), &references(target));
        let bridges = async {
            let cited = self.neighbors_of_kind(source, NodeKind::Paper)?;
            match self.citation_counts.get(target) {
                // Listing the target's citations is cheaper than checking
                // every reference.
                Some(count) if count as usize <= cited.len() => self.explore_citations(target).await,
                _ => {
                    self.ingest_batched(BatchKind::CitingPapers, target, &cited)
                        .await
                }
            }
        };

        try_join(
            self.ingest_all(&co_citing, self.exploration.citation_bound, PaginationMode::Optimistic),
            bridges,
        )
        .await?;
        Ok(())
    }

    /// References of `paper` written by `author`.
    async fn intercept_paper_author(&self, paper: i64, author: i64) -> Result<()> {
        let cited = self.neighbors_of_kind(paper, NodeKind::Paper)?;
        self.ingest_batched(BatchKind::AuthoredPapers, author, &cited)
            .await
    }

    /// Papers by `author` that cite `paper`.
    async fn intercept_author_paper(&self, author: i64, paper: i64) -> Result<()> {
        let expr = and(&author_is(author), &references(paper));
        self.ingest_all(&expr, self.exploration.author_paper_bound, PaginationMode::Optimistic)
            .await?;
        Ok(())
    }

    /// Shared affiliations of two authors.
    ///
    /// Affiliations of `source` that `target` is not yet linked to are
    /// checked in batches; a batch with any hit falls back to one existence
    /// check per affiliation.
    async fn intercept_author_author(&self, source: i64, target: i64) -> Result<()> {
        try_join(
            self.explore_author_papers(source),
            self.explore_author_papers(target),
        )
        .await?;

        let candidates: Vec<i64> = self
            .neighbors_of_kind(source, NodeKind::Affiliation)?
            .into_iter()
            .filter(|af| !self.graph.contains_edge(*af, target))
            .collect();

        let batches = self
            .limits
            .partition(BatchKind::Affiliations, &candidates)
            .map(|batch| async move {
                if !self
                    .client
                    .exists(&BatchKind::Affiliations.build(target, batch))
                    .await?
                {
                    return Ok(());
                }
                if let [affiliation] = batch {
                    return self.link_affiliation(target, *affiliation);
                }
                let checks = batch.iter().map(|&affiliation| async move {
                    if self
                        .client
                        .exists(&author_with_affiliation(target, affiliation))
                        .await?
                    {
                        self.link_affiliation(target, affiliation)?;
                    }
                    Ok::<_, PathfinderError>(())
                });
                try_join_all(checks).await?;
                Ok::<_, PathfinderError>(())
            });
        try_join_all(batches).await?;
        Ok(())
    }

    fn link_affiliation(&self, author: i64, affiliation: i64) -> Result<()> {
        log::debug!("Author {} linked to affiliation {} by existence check", author, affiliation);
        self.connect(author, affiliation, true)
    }

    /// Split `ids` by the cap for `kind` and ingest the results of one query
    /// per batch, all batches concurrently.
    async fn ingest_batched(&self, kind: BatchKind, anchor: i64, ids: &[i64]) -> Result<()> {
        let queries = self.limits.partition(kind, ids).map(|batch| {
            let expr = kind.build(anchor, batch);
            async move {
                self.ingest_all(&expr, batch.len(), PaginationMode::Pessimistic)
                    .await
            }
        });
        try_join_all(queries).await?;
        Ok(())
    }
}

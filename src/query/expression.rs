//! Builders for the search service's expression grammar.
//!
//! The grammar (`Id=`, `RId=`, `Composite(...)`, `And(...)`, `Or(...)`) is a
//! fixed external contract. Everything here is pure string building.

use crate::config::LimitsConfig;
use crate::error::{PathfinderError, Result};

/// `Id=<id>`
pub fn id_eq(id: i64) -> String {
    attr_eq("Id", id)
}

/// `<attr>=<id>`
pub fn attr_eq(attr: &str, id: i64) -> String {
    format!("{}={}", attr, id)
}

/// Papers whose reference list contains `id`.
pub fn references(id: i64) -> String {
    attr_eq("RId", id)
}

pub fn and(a: &str, b: &str) -> String {
    format!("And({},{})", a, b)
}

pub fn or(a: &str, b: &str) -> String {
    format!("Or({},{})", a, b)
}

/// Scope a condition to one element of a nested attribute (`AA`, `F`, ...).
pub fn composite(inner: &str) -> String {
    format!("Composite({})", inner)
}

/// Right-nested OR of `terms`: `Or(e1,Or(e2,Or(e3,e4)))`.
///
/// No terms give an empty string; a single term is returned unwrapped.
pub fn chain_or<S: AsRef<str>>(terms: &[S]) -> String {
    let mut rev = terms.iter().rev();
    let Some(last) = rev.next() else {
        return String::new();
    };
    rev.fold(last.as_ref().to_string(), |acc, term| or(term.as_ref(), &acc))
}

/// OR-chain of `<attr>=<id>` terms.
pub fn chain_attr(attr: &str, ids: &[i64]) -> String {
    let terms: Vec<String> = ids.iter().map(|id| attr_eq(attr, *id)).collect();
    chain_or(&terms)
}

/// OR-chain of `Id=<id>` terms.
pub fn chain_ids(ids: &[i64]) -> String {
    chain_attr("Id", ids)
}

/// Papers with `author_id` among their authors.
pub fn author_is(author_id: i64) -> String {
    composite(&attr_eq(AUTHOR_ID, author_id))
}

/// Papers on which `author_id` wrote while at `affiliation_id`.
pub fn author_with_affiliation(author_id: i64, affiliation_id: i64) -> String {
    BatchKind::Affiliations.build(author_id, &[affiliation_id])
}

/// Fail fast if `expr` would be rejected by the service for its length.
pub fn check_length(expr: &str, max: usize) -> Result<()> {
    if expr.len() > max {
        return Err(PathfinderError::InvalidExpression {
            length: expr.len(),
            max,
        });
    }
    Ok(())
}

const AUTHOR_ID: &str = "AA.AuId";
const AFFILIATION_ID: &str = "AA.AfId";

/// OR-chained batch queries, each anchored on one id and capped separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKind {
    /// Papers among `ids` citing the anchor: `And(RId=a,Or(Id=..))`.
    CitingPapers,
    /// Papers among `ids` written by the anchor author:
    /// `And(Composite(AA.AuId=a),Or(Id=..))`.
    AuthoredPapers,
    /// The anchor author at any of the affiliations `ids`:
    /// `Composite(And(AA.AuId=a,Or(AA.AfId=..)))`.
    Affiliations,
}

impl BatchKind {
    pub const ALL: [BatchKind; 3] = [
        BatchKind::CitingPapers,
        BatchKind::AuthoredPapers,
        BatchKind::Affiliations,
    ];

    pub fn build(self, anchor: i64, ids: &[i64]) -> String {
        match self {
            BatchKind::CitingPapers => and(&references(anchor), &chain_ids(ids)),
            BatchKind::AuthoredPapers => and(&author_is(anchor), &chain_ids(ids)),
            BatchKind::Affiliations => composite(&and(
                &attr_eq(AUTHOR_ID, anchor),
                &chain_attr(AFFILIATION_ID, ids),
            )),
        }
    }
}

/// Per-kind caps on the number of chained ids in one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainLimits {
    pub paper: usize,
    pub author: usize,
    pub affiliation: usize,
}

impl ChainLimits {
    pub fn cap(&self, kind: BatchKind) -> usize {
        match kind {
            BatchKind::CitingPapers => self.paper,
            BatchKind::AuthoredPapers => self.author,
            BatchKind::Affiliations => self.affiliation,
        }
    }

    /// Split `ids` into batches no longer than the cap for `kind`.
    pub fn partition<'a>(&self, kind: BatchKind, ids: &'a [i64]) -> std::slice::Chunks<'a, i64> {
        ids.chunks(self.cap(kind).max(1))
    }

    /// Length of the longest `kind` batch over `n` ids.
    pub fn worst_case_length(kind: BatchKind, n: usize) -> usize {
        kind.build(i64::MIN, &vec![i64::MIN; n]).len()
    }
}

impl From<&LimitsConfig> for ChainLimits {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            paper: limits.paper_chain,
            author: limits.author_chain,
            affiliation: limits.affiliation_chain,
        }
    }
}

impl Default for ChainLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

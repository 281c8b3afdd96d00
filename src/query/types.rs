//! Wire types of the academic search service.

use serde::{Deserialize, Serialize};

/// Attributes requested whenever a paper's full neighbourhood is wanted.
pub const PAPER_ATTRIBUTES: &str =
    "Id,Ti,CC,RId,AA.AuId,AA.AuN,AA.AfId,AA.AfN,F.FId,F.FN,C.CId,C.CN,J.JId,J.JN";

/// Attributes for existence checks and counting.
pub const ID_ATTRIBUTES: &str = "Id";

/// One paper record (or, for `Id=` lookups of non-papers, an id-only stub).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(rename = "Ti", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "CC", default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u64>,
    #[serde(rename = "RId", default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<i64>,
    #[serde(rename = "AA", default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<AuthorAffiliation>,
    #[serde(rename = "F", default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldOfStudyRef>,
    #[serde(rename = "C", default, skip_serializing_if = "Option::is_none")]
    pub conference: Option<ConferenceRef>,
    #[serde(rename = "J", default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<JournalRef>,
}

impl Entity {
    /// The `AA` entry for `author_id`, if they are among the authors.
    pub fn author_entry(&self, author_id: i64) -> Option<&AuthorAffiliation> {
        self.authors.iter().find(|a| a.author_id == author_id)
    }
}

/// Entry of the `AA` array: an author and their affiliation on this paper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorAffiliation {
    #[serde(rename = "AuId")]
    pub author_id: i64,
    #[serde(rename = "AuN", default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(rename = "AfId", default, skip_serializing_if = "Option::is_none")]
    pub affiliation_id: Option<i64>,
    #[serde(rename = "AfN", default, skip_serializing_if = "Option::is_none")]
    pub affiliation_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldOfStudyRef {
    #[serde(rename = "FId")]
    pub id: i64,
    #[serde(rename = "FN", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConferenceRef {
    #[serde(rename = "CId")]
    pub id: i64,
    #[serde(rename = "CN", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JournalRef {
    #[serde(rename = "JId")]
    pub id: i64,
    #[serde(rename = "JN", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One page of `evaluate` results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvaluationResult {
    #[serde(default)]
    pub expr: String,
    #[serde(default)]
    pub entities: Vec<Entity>,
    /// Set when the service suppressed an error and returned partial results.
    #[serde(default)]
    pub aborted: bool,
}

/// `calchistogram` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistogramResult {
    #[serde(default)]
    pub expr: String,
    #[serde(default)]
    pub num_entities: u64,
    #[serde(default)]
    pub histograms: Vec<Histogram>,
    #[serde(default)]
    pub aborted: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Histogram {
    pub attribute: String,
    #[serde(default)]
    pub distinct_values: u64,
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub histogram: Vec<HistogramBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// Attribute value; numeric for ids, string for names.
    pub value: serde_json::Value,
    #[serde(default)]
    pub count: u64,
}

/// Parameters of one `evaluate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluateRequest {
    pub expr: String,
    pub count: usize,
    pub offset: usize,
    pub order_by: Option<String>,
    pub attributes: String,
}

/// Parameters of one `calchistogram` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramRequest {
    pub expr: String,
    pub attributes: String,
    pub count: usize,
    pub offset: usize,
}

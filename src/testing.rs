//! In-memory stand-in for the academic search service.
//!
//! Evaluates the expression grammar against a fixed set of paper records,
//! records every request, and can inject latency and failures.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{PathfinderError, Result};
use crate::query::types::{
    AuthorAffiliation, Entity, EvaluateRequest, EvaluationResult, FieldOfStudyRef, Histogram,
    HistogramBucket, HistogramRequest, HistogramResult,
};
use crate::query::SearchTransport;

/// Paper fixture with references and `(author, affiliation)` pairs.
pub fn paper(id: i64, references: &[i64], authors: &[(i64, Option<i64>)]) -> Entity {
    Entity {
        id,
        title: Some(format!("paper {}", id)),
        citation_count: None,
        references: references.to_vec(),
        authors: authors
            .iter()
            .map(|(author_id, affiliation_id)| AuthorAffiliation {
                author_id: *author_id,
                author_name: Some(format!("author {}", author_id)),
                affiliation_id: *affiliation_id,
                affiliation_name: affiliation_id.map(|af| format!("affiliation {}", af)),
            })
            .collect(),
        ..Entity::default()
    }
}

/// Tag a fixture with fields of study.
pub fn with_fields(mut entity: Entity, fields: &[i64]) -> Entity {
    entity.fields = fields
        .iter()
        .map(|id| FieldOfStudyRef { id: *id, name: None })
        .collect();
    entity
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Composite(Box<Expr>),
    Eq(String, i64),
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse(input: &'a str) -> Result<Expr> {
        let mut parser = Parser { input, pos: 0 };
        let expr = parser.expr()?;
        if parser.pos != input.len() {
            return Err(parser.error("trailing input"));
        }
        Ok(expr)
    }

    fn expr(&mut self) -> Result<Expr> {
        for (keyword, arity) in [("And(", 2), ("Or(", 2), ("Composite(", 1)] {
            if self.rest().starts_with(keyword) {
                self.pos += keyword.len();
                let first = self.expr()?;
                let expr = if arity == 2 {
                    self.expect(',')?;
                    let second = self.expr()?;
                    match keyword {
                        "And(" => Expr::And(Box::new(first), Box::new(second)),
                        _ => Expr::Or(Box::new(first), Box::new(second)),
                    }
                } else {
                    Expr::Composite(Box::new(first))
                };
                self.expect(')')?;
                return Ok(expr);
            }
        }

        let attr_len = self
            .rest()
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '.'))
            .unwrap_or(self.rest().len());
        if attr_len == 0 {
            return Err(self.error("expected attribute"));
        }
        let attr = self.rest()[..attr_len].to_string();
        self.pos += attr_len;
        self.expect('=')?;
        let value_len = self
            .rest()
            .find(|c: char| !(c.is_ascii_digit() || c == '-'))
            .unwrap_or(self.rest().len());
        let value = self.rest()[..value_len]
            .parse::<i64>()
            .map_err(|_| self.error("expected integer value"))?;
        self.pos += value_len;
        Ok(Expr::Eq(attr, value))
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.rest().starts_with(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    fn error(&self, what: &str) -> PathfinderError {
        PathfinderError::RemoteService {
            code: "BadArgument".to_string(),
            message: format!("{} at {} in {}", what, self.pos, self.input),
        }
    }
}

/// One element of a nested attribute, bound while evaluating `Composite`.
#[derive(Clone, Copy)]
enum Scope<'a> {
    Author(&'a AuthorAffiliation),
    Field(&'a FieldOfStudyRef),
}

fn first_attribute(expr: &Expr) -> &str {
    match expr {
        Expr::And(a, _) | Expr::Or(a, _) => first_attribute(a),
        Expr::Composite(inner) => first_attribute(inner),
        Expr::Eq(attr, _) => attr,
    }
}

fn matches(expr: &Expr, entity: &Entity, scope: Option<Scope<'_>>) -> bool {
    match expr {
        Expr::And(a, b) => matches(a, entity, scope) && matches(b, entity, scope),
        Expr::Or(a, b) => matches(a, entity, scope) || matches(b, entity, scope),
        Expr::Composite(inner) => {
            if first_attribute(inner).starts_with("F.") {
                entity
                    .fields
                    .iter()
                    .any(|f| matches(inner, entity, Some(Scope::Field(f))))
            } else if first_attribute(inner).starts_with("AA.") {
                entity
                    .authors
                    .iter()
                    .any(|a| matches(inner, entity, Some(Scope::Author(a))))
            } else {
                matches(inner, entity, scope)
            }
        }
        Expr::Eq(attr, value) => leaf(attr, *value, entity, scope),
    }
}

fn leaf(attr: &str, value: i64, entity: &Entity, scope: Option<Scope<'_>>) -> bool {
    match (attr, scope) {
        ("Id", _) => entity.id == value,
        ("RId", _) => entity.references.contains(&value),
        ("AA.AuId", Some(Scope::Author(a))) => a.author_id == value,
        ("AA.AfId", Some(Scope::Author(a))) => a.affiliation_id == Some(value),
        ("AA.AuId", None) => entity.authors.iter().any(|a| a.author_id == value),
        ("AA.AfId", None) => entity
            .authors
            .iter()
            .any(|a| a.affiliation_id == Some(value)),
        ("F.FId", Some(Scope::Field(f))) => f.id == value,
        ("F.FId", None) => entity.fields.iter().any(|f| f.id == value),
        ("C.CId", _) => entity.conference.as_ref().map(|c| c.id) == Some(value),
        ("J.JId", _) => entity.journal.as_ref().map(|j| j.id) == Some(value),
        _ => false,
    }
}

fn attribute_values(entity: &Entity, attribute: &str) -> Vec<i64> {
    let mut values: Vec<i64> = match attribute {
        "Id" => vec![entity.id],
        "RId" => entity.references.clone(),
        "AA.AuId" => entity.authors.iter().map(|a| a.author_id).collect(),
        "AA.AfId" => entity
            .authors
            .iter()
            .filter_map(|a| a.affiliation_id)
            .collect(),
        "F.FId" => entity.fields.iter().map(|f| f.id).collect(),
        _ => Vec::new(),
    };
    values.sort_unstable();
    values.dedup();
    values
}

/// Fake search service over fixture papers
///
/// Every author and affiliation id mentioned by a fixture is also known as a
/// bare id-only record, the way the real service answers `Id=` lookups for
/// entities that are not papers.
pub struct FakeAcademicService {
    papers: Vec<Entity>,
    stubs: Vec<Entity>,
    synthetic: HashMap<String, usize>,
    latency: Option<Duration>,
    fail_next: AtomicUsize,
    service_error: Option<(String, String)>,
    failing_fragment: Option<String>,
    aborted: AtomicBool,
    requests: Mutex<Vec<EvaluateRequest>>,
    histogram_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeAcademicService {
    pub fn new(papers: Vec<Entity>) -> Self {
        let paper_ids: HashSet<i64> = papers.iter().map(|p| p.id).collect();
        let mut stub_ids: Vec<i64> = papers
            .iter()
            .flat_map(|p| {
                p.authors
                    .iter()
                    .flat_map(|a| std::iter::once(a.author_id).chain(a.affiliation_id))
            })
            .filter(|id| !paper_ids.contains(id))
            .collect();
        stub_ids.sort_unstable();
        stub_ids.dedup();

        Self {
            papers,
            stubs: stub_ids
                .into_iter()
                .map(|id| Entity {
                    id,
                    ..Entity::default()
                })
                .collect(),
            synthetic: HashMap::new(),
            latency: None,
            fail_next: AtomicUsize::new(0),
            service_error: None,
            failing_fragment: None,
            aborted: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
            histogram_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Answer `expr` (exactly) with `count` synthetic records `1..=count`.
    pub fn with_synthetic_count(mut self, expr: &str, count: usize) -> Self {
        self.synthetic.insert(expr.to_string(), count);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `n` evaluate calls with a transient error.
    pub fn fail_next(self, n: usize) -> Self {
        self.fail_next.store(n, Ordering::SeqCst);
        self
    }

    /// Answer every evaluate call with a structured service error.
    pub fn fail_with_service_error(mut self, code: &str, message: &str) -> Self {
        self.service_error = Some((code.to_string(), message.to_string()));
        self
    }

    /// Transiently fail every expression containing `fragment`.
    pub fn fail_expressions_containing(mut self, fragment: &str) -> Self {
        self.failing_fragment = Some(fragment.to_string());
        self
    }

    /// Mark every result page as aborted.
    pub fn abort_results(self) -> Self {
        self.aborted.store(true, Ordering::SeqCst);
        self
    }

    /// Fixture record for `id`, as the service would return it.
    pub fn paper(&self, id: i64) -> Option<Entity> {
        self.papers.iter().find(|p| p.id == id).cloned()
    }

    pub fn requests(&self) -> Vec<EvaluateRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn evaluate_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of evaluate calls whose expression is exactly `expr`.
    pub fn calls_for(&self, expr: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.expr == expr)
            .count()
    }

    pub fn histogram_calls(&self) -> usize {
        self.histogram_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn matching<'a>(&'a self, expr: &'a Expr) -> impl Iterator<Item = &'a Entity> + 'a {
        self.papers
            .iter()
            .chain(self.stubs.iter())
            .filter(move |e| matches(expr, e, None))
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn respond(&self, request: &EvaluateRequest) -> Result<EvaluationResult> {
        let take_failure = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if take_failure {
            return Err(PathfinderError::RemoteQuery("connection reset".to_string()));
        }
        if let Some((code, message)) = &self.service_error {
            return Err(PathfinderError::RemoteService {
                code: code.clone(),
                message: message.clone(),
            });
        }
        if let Some(fragment) = &self.failing_fragment {
            if request.expr.contains(fragment.as_str()) {
                return Err(PathfinderError::RemoteQuery("gateway timeout".to_string()));
            }
        }

        let entities = if let Some(total) = self.synthetic.get(&request.expr) {
            let end = (request.offset + request.count).min(*total);
            (request.offset..end)
                .map(|i| Entity {
                    id: i as i64 + 1,
                    ..Entity::default()
                })
                .collect()
        } else {
            let expr = Parser::parse(&request.expr)?;
            self.matching(&expr)
                .skip(request.offset)
                .take(request.count)
                .cloned()
                .collect()
        };

        Ok(EvaluationResult {
            expr: request.expr.clone(),
            entities,
            aborted: self.aborted.load(Ordering::SeqCst),
        })
    }
}

#[async_trait]
impl SearchTransport for FakeAcademicService {
    async fn evaluate(&self, request: &EvaluateRequest) -> Result<EvaluationResult> {
        self.requests.lock().unwrap().push(request.clone());
        self.enter().await;
        let result = self.respond(request);
        self.leave();
        result
    }

    async fn calc_histogram(&self, request: &HistogramRequest) -> Result<HistogramResult> {
        self.histogram_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        let expr = Parser::parse(&request.expr);
        self.leave();
        let expr = expr?;

        let matched: Vec<&Entity> = self.matching(&expr).collect();
        let histograms = request
            .attributes
            .split(',')
            .map(|attribute| {
                let mut counts: BTreeMap<i64, u64> = BTreeMap::new();
                for entity in &matched {
                    for value in attribute_values(entity, attribute) {
                        *counts.entry(value).or_default() += 1;
                    }
                }
                let mut buckets: Vec<(i64, u64)> = counts.into_iter().collect();
                buckets.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
                Histogram {
                    attribute: attribute.to_string(),
                    distinct_values: buckets.len() as u64,
                    total_count: buckets.iter().map(|(_, c)| c).sum(),
                    histogram: buckets
                        .into_iter()
                        .skip(request.offset)
                        .take(request.count)
                        .map(|(value, count)| HistogramBucket {
                            value: serde_json::json!(value),
                            count,
                        })
                        .collect(),
                }
            })
            .collect();

        Ok(HistogramResult {
            expr: request.expr.clone(),
            num_entities: matched.len() as u64,
            histograms,
            aborted: self.aborted.load(Ordering::SeqCst),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expression::{and, author_is, author_with_affiliation, chain_ids, references};

    #[test]
    fn test_parser_accepts_builder_output() {
        let expr = and(&author_is(7), &chain_ids(&[1, 2, 3]));
        let parsed = Parser::parse(&expr).unwrap();
        assert!(matches!(parsed, Expr::And(_, _)));
        assert!(Parser::parse("Or(Id=1,").is_err());
        assert!(Parser::parse("Id=1)").is_err());
    }

    #[test]
    fn test_composite_binds_one_author_entry() {
        let entity = paper(1, &[], &[(10, Some(100)), (11, Some(101))]);
        let same_entry = Parser::parse(&author_with_affiliation(10, 100)).unwrap();
        let crossed = Parser::parse(&author_with_affiliation(10, 101)).unwrap();
        assert!(matches(&same_entry, &entity, None));
        assert!(!matches(&crossed, &entity, None));
    }

    #[test]
    fn test_stubs_only_answer_id_lookups() {
        let fake = FakeAcademicService::new(vec![paper(1, &[2], &[(10, Some(100))])]);
        let by_id = Parser::parse("Id=10").unwrap();
        assert_eq!(fake.matching(&by_id).count(), 1);
        let citing = Parser::parse(&references(2)).unwrap();
        let ids: Vec<i64> = fake.matching(&citing).map(|e| e.id).collect();
        assert_eq!(ids, vec![1]);
    }
}

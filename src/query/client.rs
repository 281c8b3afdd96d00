use crate::config::ServiceConfig;
use crate::error::{PathfinderError, Result};
use crate::query::expression::check_length;
use crate::query::transport::{HttpTransport, SearchTransport};
use crate::query::types::{
    EvaluateRequest, EvaluationResult, HistogramRequest, HistogramResult, ID_ATTRIBUTES,
};
use futures_util::future::try_join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Where the adaptive paginator starts its concurrency ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationMode {
    /// One page in flight; the caller's total is a generous upper bound.
    Optimistic,
    /// `max_concurrency` pages in flight; the caller's total is accurate.
    Pessimistic,
}

/// Counters over every request issued through one client.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryStats {
    pub query_count: u64,
    pub failed_count: u64,
    pub retry_count: u64,
    pub average_latency_ms: f64,
}

/// Paginated, retrying client for the academic search service
///
/// One client is shared by every analyzer in the process. All requests go
/// through a single semaphore, so `max_concurrency` bounds the in-flight
/// requests across all callers combined.
pub struct QueryClient {
    transport: Arc<dyn SearchTransport>,
    page_size: usize,
    max_concurrency: usize,
    max_retries: usize,
    max_expression_length: usize,
    permits: Semaphore,
    query_count: AtomicU64,
    failed_count: AtomicU64,
    retry_count: AtomicU64,
    total_latency_us: AtomicU64,
}

impl QueryClient {
    pub fn new(transport: Arc<dyn SearchTransport>, config: &ServiceConfig) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        Self {
            transport,
            page_size: config.page_size.max(1),
            max_concurrency,
            max_retries: config.max_retries,
            max_expression_length: config.max_expression_length,
            permits: Semaphore::new(max_concurrency),
            query_count: AtomicU64::new(0),
            failed_count: AtomicU64::new(0),
            retry_count: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
        }
    }

    /// HTTP-backed client; reads the subscription key from `config.api_key_env`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            PathfinderError::Config(format!(
                "Environment variable {} not set",
                config.api_key_env
            ))
        })?;
        let transport = HttpTransport::new(config, &api_key)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Evaluate one window of `expr`.
    pub async fn evaluate(
        &self,
        expr: &str,
        count: usize,
        offset: usize,
        order_by: Option<&str>,
        attributes: &str,
    ) -> Result<EvaluationResult> {
        check_length(expr, self.max_expression_length)?;
        let request = EvaluateRequest {
            expr: expr.to_string(),
            count,
            offset,
            order_by: order_by.map(str::to_string),
            attributes: attributes.to_string(),
        };
        let request = &request;
        let result = self
            .with_retry(move || self.transport.evaluate(request))
            .await?;
        if result.aborted {
            self.failed_count.fetch_add(1, Ordering::Relaxed);
            return Err(PathfinderError::QueryAborted(format!(
                "{} (offset {})",
                expr, offset
            )));
        }
        Ok(result)
    }

    /// Page through `[0, total_count)` of `expr` with an adaptive concurrency ramp.
    ///
    /// Each session issues its pages concurrently and waits for all of them.
    /// A session in which any page comes back short is the last one;
    /// otherwise the next session runs twice as many pages, up to
    /// `max_concurrency`. Pages reach `on_page` in offset order. Returns the
    /// number of entities delivered.
    pub async fn evaluate_all<F>(
        &self,
        expr: &str,
        total_count: usize,
        mode: PaginationMode,
        attributes: &str,
        mut on_page: F,
    ) -> Result<usize>
    where
        F: FnMut(EvaluationResult) -> Result<()>,
    {
        let page_count = total_count.div_ceil(self.page_size);
        let mut concurrency = match mode {
            PaginationMode::Optimistic => 1,
            PaginationMode::Pessimistic => self.max_concurrency,
        };
        let mut next_page = 0;
        let mut delivered = 0;

        while next_page < page_count {
            let session_end = (next_page + concurrency).min(page_count);
            let requests = (next_page..session_end).map(|page| {
                let offset = page * self.page_size;
                let count = self.page_size.min(total_count - offset);
                async move {
                    let result = self.evaluate(expr, count, offset, None, attributes).await?;
                    Ok::<_, PathfinderError>((count, result))
                }
            });
            let pages = try_join_all(requests).await?;

            let mut exhausted = false;
            for (requested, page) in pages {
                if page.entities.len() < requested {
                    exhausted = true;
                }
                delivered += page.entities.len();
                on_page(page)?;
            }
            if exhausted {
                break;
            }

            next_page = session_end;
            concurrency = (concurrency * 2).min(self.max_concurrency);
        }

        log::debug!(
            "Paged {} entities of {} (bound {})",
            delivered,
            expr,
            total_count
        );
        Ok(delivered)
    }

    /// Whether `expr` matches at least one entity.
    pub async fn exists(&self, expr: &str) -> Result<bool> {
        self.has_record_at(expr, 0).await
    }

    /// Estimate how many entities match `expr` by binary search over offsets.
    ///
    /// A single-record lookup at offset `m` that comes back nonempty means the
    /// count exceeds `m`. Stops once the remaining window is within
    /// `precision` of the lookup offset. Never returns more than `upper_bound`.
    pub async fn estimate_count(&self, expr: &str, upper_bound: u64, precision: f64) -> Result<u64> {
        let mut min = 0u64;
        let mut max = upper_bound;
        while min < max {
            let mid = min + (max - min) / 2;
            if self.has_record_at(expr, mid as usize).await? {
                min = mid + 1;
            } else {
                max = mid;
            }
            if mid > 0 && (max - min) as f64 / mid as f64 <= precision {
                break;
            }
        }
        Ok(min + (max - min) / 2)
    }

    async fn has_record_at(&self, expr: &str, offset: usize) -> Result<bool> {
        let result = self.evaluate(expr, 1, offset, None, ID_ATTRIBUTES).await?;
        Ok(!result.entities.is_empty())
    }

    pub async fn calc_histogram(
        &self,
        expr: &str,
        attributes: &str,
        count: usize,
        offset: usize,
    ) -> Result<HistogramResult> {
        check_length(expr, self.max_expression_length)?;
        let request = HistogramRequest {
            expr: expr.to_string(),
            attributes: attributes.to_string(),
            count,
            offset,
        };
        let request = &request;
        let result = self
            .with_retry(move || self.transport.calc_histogram(request))
            .await?;
        if result.aborted {
            self.failed_count.fetch_add(1, Ordering::Relaxed);
            return Err(PathfinderError::QueryAborted(format!(
                "histogram of {} over {}",
                attributes, expr
            )));
        }
        Ok(result)
    }

    pub fn stats(&self) -> QueryStats {
        let query_count = self.query_count.load(Ordering::Relaxed);
        let total_us = self.total_latency_us.load(Ordering::Relaxed);
        QueryStats {
            query_count,
            failed_count: self.failed_count.load(Ordering::Relaxed),
            retry_count: self.retry_count.load(Ordering::Relaxed),
            average_latency_ms: if query_count == 0 {
                0.0
            } else {
                total_us as f64 / query_count as f64 / 1000.0
            },
        }
    }

    /// Run `op` under a concurrency permit, re-issuing it immediately on
    /// transient failures up to `max_retries` times.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let result = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|e| PathfinderError::Internal(format!("Query semaphore closed: {}", e)))?;
                let start = Instant::now();
                let result = op().await;
                self.query_count.fetch_add(1, Ordering::Relaxed);
                self.total_latency_us
                    .fetch_add(start.elapsed().as_micros() as u64, Ordering::Relaxed);
                result
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    self.retry_count.fetch_add(1, Ordering::Relaxed);
                    log::warn!("Retry {}/{} after error: {}", attempt, self.max_retries, e);
                }
                Err(e) => {
                    self.failed_count.fetch_add(1, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }
    }
}

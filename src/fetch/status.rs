//! Per-node fetch state machine with shared waiters.
//!
//! Each (node, domain) pair moves Unfetched -> Fetching -> Fetched (or Failed)
//! and never back. The caller that wins the Unfetched -> Fetching transition
//! owns the remote round-trip; everyone else parks on a `watch` channel until
//! the owner publishes the outcome.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Mutex;

use tokio::sync::watch;

use crate::error::{PathfinderError, Result};

/// Which part of a node's neighbourhood a fetch covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchDomain {
    /// Deciding whether a seed id names a paper or an author.
    Resolution,
    /// Immediate neighbours: authors, venue, fields and references of a
    /// paper; authored papers of an author.
    LocalNeighborhood,
    /// Every paper citing this paper.
    Citations,
    /// Every paper written by this author.
    AuthorPapers,
    /// Nodes that could bridge this node and the given other node.
    Interception(i64),
}

impl fmt::Display for FetchDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchDomain::Resolution => f.write_str("resolution"),
            FetchDomain::LocalNeighborhood => f.write_str("local-neighborhood"),
            FetchDomain::Citations => f.write_str("citations"),
            FetchDomain::AuthorPapers => f.write_str("author-papers"),
            FetchDomain::Interception(other) => write!(f, "interception({})", other),
        }
    }
}

/// Snapshot of one domain's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    Unfetched,
    Fetching,
    Fetched,
    Failed(String),
}

#[derive(Debug, Clone)]
enum Outcome {
    Pending,
    Done,
    Failed(String),
}

enum Slot {
    Fetching(watch::Sender<Outcome>),
    Fetched,
    Failed(String),
}

/// Mutable fetch metadata for one vertex.
pub struct NodeStatus {
    id: i64,
    slots: Mutex<HashMap<FetchDomain, Slot>>,
}

impl NodeStatus {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// Claim `domain` if nobody has. Only the single winner gets `true`.
    pub fn try_mark_fetching(&self, domain: FetchDomain) -> bool {
        let mut slots = self.slots.lock().unwrap();
        if slots.contains_key(&domain) {
            return false;
        }
        let (tx, _) = watch::channel(Outcome::Pending);
        slots.insert(domain, Slot::Fetching(tx));
        true
    }

    /// Claim `domain`, or wait for whoever holds it.
    ///
    /// Returns `true` when this call won and must perform the fetch (and later
    /// call [`mark_fetched`](Self::mark_fetched) or
    /// [`mark_failed`](Self::mark_failed)). Returns `false` once the fetch is
    /// complete and its results are in the graph. A failed owner surfaces as
    /// [`PathfinderError::FetchFailed`] to every waiter.
    pub async fn mark_fetching_or_until_fetched(&self, domain: FetchDomain) -> Result<bool> {
        let mut rx = {
            let mut slots = self.slots.lock().unwrap();
            match slots.get(&domain) {
                None => {
                    let (tx, _) = watch::channel(Outcome::Pending);
                    slots.insert(domain, Slot::Fetching(tx));
                    return Ok(true);
                }
                Some(Slot::Fetched) => return Ok(false),
                Some(Slot::Failed(reason)) => return Err(self.failure(domain, reason.clone())),
                Some(Slot::Fetching(tx)) => tx.subscribe(),
            }
        };

        let outcome = rx
            .wait_for(|o| !matches!(o, Outcome::Pending))
            .await
            .map(|o| (*o).clone());
        match outcome {
            Ok(Outcome::Done) => Ok(false),
            Ok(Outcome::Failed(reason)) => Err(self.failure(domain, reason)),
            Ok(Outcome::Pending) => Err(PathfinderError::Internal(format!(
                "woke on pending outcome for node {} {}",
                self.id, domain
            ))),
            // Sender gone without a published outcome; the slot has the final word.
            Err(_) => match self.status(domain) {
                FetchState::Fetched => Ok(false),
                FetchState::Failed(reason) => Err(self.failure(domain, reason)),
                state => Err(PathfinderError::Internal(format!(
                    "fetch signal for node {} {} dropped in state {:?}",
                    self.id, domain, state
                ))),
            },
        }
    }

    /// Publish a successful fetch and release all waiters.
    pub fn mark_fetched(&self, domain: FetchDomain) -> Result<()> {
        self.finish(domain, Slot::Fetched, Outcome::Done)
    }

    /// Publish a failed fetch; waiters receive the failure instead of hanging.
    pub fn mark_failed(&self, domain: FetchDomain, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.finish(domain, Slot::Failed(reason.clone()), Outcome::Failed(reason))
    }

    fn finish(&self, domain: FetchDomain, next: Slot, outcome: Outcome) -> Result<()> {
        let mut slots = self.slots.lock().unwrap();
        if !matches!(slots.get(&domain), Some(Slot::Fetching(_))) {
            return Err(PathfinderError::Internal(format!(
                "node {} {} finished without being claimed",
                self.id, domain
            )));
        }
        if let Some(Slot::Fetching(tx)) = slots.insert(domain, next) {
            tx.send_replace(outcome);
        }
        Ok(())
    }

    /// Non-blocking snapshot of `domain`.
    pub fn status(&self, domain: FetchDomain) -> FetchState {
        match self.slots.lock().unwrap().get(&domain) {
            None => FetchState::Unfetched,
            Some(Slot::Fetching(_)) => FetchState::Fetching,
            Some(Slot::Fetched) => FetchState::Fetched,
            Some(Slot::Failed(reason)) => FetchState::Failed(reason.clone()),
        }
    }

    /// Run `work` at most once for `domain` across all concurrent callers.
    ///
    /// Returns `Ok(true)` for the caller that ran it, `Ok(false)` for callers
    /// that waited on someone else's successful run. If the owner's future is
    /// dropped mid-flight the domain is marked failed so waiters wake up.
    pub async fn fetch_once<F, Fut>(&self, domain: FetchDomain, work: F) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if !self.mark_fetching_or_until_fetched(domain).await? {
            return Ok(false);
        }

        let mut guard = OwnerGuard {
            status: self,
            domain,
            armed: true,
        };
        let result = work().await;
        guard.armed = false;

        match result {
            Ok(()) => {
                self.mark_fetched(domain)?;
                Ok(true)
            }
            Err(e) => {
                self.mark_failed(domain, e.to_string())?;
                Err(e)
            }
        }
    }

    fn failure(&self, domain: FetchDomain, reason: String) -> PathfinderError {
        PathfinderError::FetchFailed {
            id: self.id,
            domain: domain.to_string(),
            reason,
        }
    }
}

impl fmt::Debug for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeStatus").field("id", &self.id).finish()
    }
}

struct OwnerGuard<'a> {
    status: &'a NodeStatus,
    domain: FetchDomain,
    armed: bool,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            log::warn!(
                "Fetch of {} for node {} abandoned by its owner",
                self.domain,
                self.status.id
            );
            let _ = self
                .status
                .mark_failed(self.domain, "fetch abandoned by its owner");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_try_mark_fetching_single_winner() {
        let status = NodeStatus::new(1);
        assert!(status.try_mark_fetching(FetchDomain::LocalNeighborhood));
        assert!(!status.try_mark_fetching(FetchDomain::LocalNeighborhood));
        assert_eq!(status.status(FetchDomain::LocalNeighborhood), FetchState::Fetching);
        assert_eq!(status.status(FetchDomain::Citations), FetchState::Unfetched);
    }

    #[test]
    fn test_domains_compare_structurally() {
        let status = NodeStatus::new(1);
        assert!(status.try_mark_fetching(FetchDomain::Interception(10)));
        assert!(status.try_mark_fetching(FetchDomain::Interception(11)));
        assert!(!status.try_mark_fetching(FetchDomain::Interception(10)));
    }

    #[test]
    fn test_mark_fetched_requires_claim() {
        let status = NodeStatus::new(1);
        let err = status.mark_fetched(FetchDomain::AuthorPapers).unwrap_err();
        assert!(matches!(err, PathfinderError::Internal(_)));

        assert!(status.try_mark_fetching(FetchDomain::AuthorPapers));
        status.mark_fetched(FetchDomain::AuthorPapers).unwrap();
        assert_eq!(status.status(FetchDomain::AuthorPapers), FetchState::Fetched);
        // No transition back out of Fetched.
        assert!(status.mark_fetched(FetchDomain::AuthorPapers).is_err());
        assert!(!status.try_mark_fetching(FetchDomain::AuthorPapers));
    }

    #[tokio::test]
    async fn test_fetched_domain_returns_false_immediately() {
        let status = NodeStatus::new(1);
        assert!(status.try_mark_fetching(FetchDomain::Citations));
        status.mark_fetched(FetchDomain::Citations).unwrap();
        assert!(!status
            .mark_fetching_or_until_fetched(FetchDomain::Citations)
            .await
            .unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exactly_one_of_many_callers_wins() {
        let status = Arc::new(NodeStatus::new(7));
        let published = Arc::new(AtomicBool::new(false));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let status = Arc::clone(&status);
                let published = Arc::clone(&published);
                tokio::spawn(async move {
                    let domain = FetchDomain::LocalNeighborhood;
                    let won = status.mark_fetching_or_until_fetched(domain).await.unwrap();
                    if won {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        published.store(true, Ordering::SeqCst);
                        status.mark_fetched(domain).unwrap();
                    } else {
                        assert!(published.load(Ordering::SeqCst), "waiter released before owner finished");
                    }
                    won
                })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(status.status(FetchDomain::LocalNeighborhood), FetchState::Fetched);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_owner_failure_reaches_every_waiter() {
        let status = Arc::new(NodeStatus::new(3));
        let domain = FetchDomain::Interception(4);
        assert!(status.try_mark_fetching(domain));

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let status = Arc::clone(&status);
                tokio::spawn(async move { status.mark_fetching_or_until_fetched(domain).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        status.mark_failed(domain, "service unavailable").unwrap();

        for waiter in waiters {
            match waiter.await.unwrap() {
                Err(PathfinderError::FetchFailed { id, reason, .. }) => {
                    assert_eq!(id, 3);
                    assert!(reason.contains("service unavailable"));
                }
                other => panic!("expected FetchFailed, got {:?}", other),
            }
        }

        // Late callers see the recorded failure too.
        assert!(status.mark_fetching_or_until_fetched(domain).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_once_runs_work_once() {
        let status = Arc::new(NodeStatus::new(9));
        let runs = Arc::new(AtomicUsize::new(0));

        let calls = (0..8).map(|_| {
            let status = Arc::clone(&status);
            let runs = Arc::clone(&runs);
            async move {
                status
                    .fetch_once(FetchDomain::AuthorPapers, || async {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }
        });
        let results = futures_util::future::join_all(calls).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(results.iter().filter(|r| matches!(r, Ok(true))).count(), 1);
        assert_eq!(results.iter().filter(|r| matches!(r, Ok(false))).count(), 7);
    }

    #[tokio::test]
    async fn test_fetch_once_failure_marks_domain_failed() {
        let status = NodeStatus::new(2);
        let result = status
            .fetch_once(FetchDomain::Citations, || async {
                Err(PathfinderError::RemoteQuery("connection reset".into()))
            })
            .await;
        assert!(matches!(result, Err(PathfinderError::RemoteQuery(_))));
        assert!(matches!(
            status.status(FetchDomain::Citations),
            FetchState::Failed(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_owner_releases_waiters() {
        let status = Arc::new(NodeStatus::new(5));
        let domain = FetchDomain::LocalNeighborhood;

        let owner = {
            let status = Arc::clone(&status);
            tokio::spawn(async move {
                status
                    .fetch_once(domain, || std::future::pending::<Result<()>>())
                    .await
            })
        };
        while status.status(domain) != FetchState::Fetching {
            tokio::task::yield_now().await;
        }

        let waiter = {
            let status = Arc::clone(&status);
            tokio::spawn(async move { status.mark_fetching_or_until_fetched(domain).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        owner.abort();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter hung after owner was cancelled")
            .unwrap();
        assert!(matches!(result, Err(PathfinderError::FetchFailed { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_waiter_does_not_cancel_fetch() {
        let status = Arc::new(NodeStatus::new(6));
        let domain = FetchDomain::AuthorPapers;
        assert!(status.try_mark_fetching(domain));

        let waiter = {
            let status = Arc::clone(&status);
            tokio::spawn(async move { status.mark_fetching_or_until_fetched(domain).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiter.abort();

        assert_eq!(status.status(domain), FetchState::Fetching);
        status.mark_fetched(domain).unwrap();
        assert_eq!(status.status(domain), FetchState::Fetched);
    }
}

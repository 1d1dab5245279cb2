//! Base orchestrator pool
//!
//! Holds a URL list shuffled once at construction plus an acceptance
//! predicate, and answers "first N that pass" queries via the selection
//! engine. The richer pools (DB cache, webhook) wrap one of these.

use crate::probe::ProbeFn;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::error;
use url::Url;
use vgrid_common::net::OrchestratorInfo;
use vgrid_common::Result;

use super::engine::select_orchestrators;

/// Acceptance predicate applied to every probe response.
pub type Predicate = Arc<dyn Fn(&OrchestratorInfo) -> bool + Send + Sync>;

/// Permutation seam: maps a length to an index ordering. Injectable so
/// tests can pin the shuffle.
pub type PermFn = Arc<dyn Fn(usize) -> Vec<usize> + Send + Sync>;

/// Predicate accepting every response.
pub fn accept_all() -> Predicate {
    Arc::new(|_| true)
}

/// Uniform random permutation, the production shuffle.
pub fn random_perm() -> PermFn {
    Arc::new(|len| {
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(&mut rand::thread_rng());
        order
    })
}

/// Anything serving size / URL-list / first-N-orchestrator queries.
#[async_trait]
pub trait OrchestratorPool: Send + Sync {
    /// Candidate count. For the DB cache this exceeds [`Self::get_urls`]
    /// when rows carry unparseable service URIs.
    fn size(&self) -> usize;

    /// The stored, already-shuffled URL list.
    fn get_urls(&self) -> Vec<Url>;

    /// Up to `n` probe responses passing the predicate, in completion
    /// order. Individual probe failures are discarded, never surfaced.
    async fn get_orchestrators(&self, n: usize) -> Result<Vec<OrchestratorInfo>>;
}

/// Static URL list + predicate.
#[derive(Clone)]
pub struct BasePool {
    uris: Vec<Url>,
    pred: Predicate,
    probe: ProbeFn,
}

impl BasePool {
    pub fn new(probe: ProbeFn, uris: Vec<Url>) -> Self {
        Self::with_parts(probe, uris, accept_all(), random_perm())
    }

    pub fn with_pred(probe: ProbeFn, uris: Vec<Url>, pred: Predicate) -> Self {
        Self::with_parts(probe, uris, pred, random_perm())
    }

    /// Fully-injected constructor; the seam the other constructors and the
    /// tests share.
    pub fn with_parts(probe: ProbeFn, uris: Vec<Url>, pred: Predicate, perm: PermFn) -> Self {
        if uris.is_empty() {
            error!("orchestrator pool constructed without any URIs");
        }
        let order = perm(uris.len());
        let uris = order.into_iter().map(|i| uris[i].clone()).collect();
        Self { uris, pred, probe }
    }
}

#[async_trait]
impl OrchestratorPool for BasePool {
    fn size(&self) -> usize {
        self.uris.len()
    }

    fn get_urls(&self) -> Vec<Url> {
        self.uris.clone()
    }

    async fn get_orchestrators(&self, n: usize) -> Result<Vec<OrchestratorInfo>> {
        Ok(select_orchestrators(&self.probe, &self.uris, &self.pred, n).await)
    }
}

//! Registry-backed orchestrator pool cache
//!
//! Reconciles a registry snapshot into the store at startup, probes every
//! known service URI for current prices, and keeps doing so on a fixed
//! interval in the background. Selection queries run against a Base Pool
//! rebuilt after each pass from the rows that are active at the current
//! round and under the configured price ceiling.
//!
//! Two sizes exist by design: [`DbPoolCache::size`] counts every row the
//! working-set filter matched, while [`DbPoolCache::get_urls`] drops rows
//! whose stored service URI does not parse. An unparseable row stays in
//! the store (the registry is authoritative) but is never probed.

use crate::node::BroadcasterNode;
use crate::probe::{ProbeFn, PROBE_TIMEOUT};
use crate::registry::{registry_orch_to_record, RoundsManager, TicketParamsValidator};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use vgrid_common::db::{OrchFilter, OrchestratorStore};
use vgrid_common::net::{OrchAddress, OrchestratorInfo};
use vgrid_common::params::BROADCAST_CFG;
use vgrid_common::price::{info_price, price_to_fixed};
use vgrid_common::{Error, Result};

use super::pool::{BasePool, OrchestratorPool, Predicate};

/// How often the background pass re-probes every known orchestrator.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(600);

/// Periodically refreshed, store-backed orchestrator pool.
pub struct DbPoolCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    store: OrchestratorStore,
    rounds: Arc<dyn RoundsManager>,
    probe: ProbeFn,
    pred: Predicate,
    working: RwLock<WorkingSet>,
}

#[derive(Default)]
struct WorkingSet {
    pool: Option<BasePool>,
    row_count: usize,
}

impl DbPoolCache {
    /// Import the registry snapshot, run the first probe pass, and start
    /// the background refresh loop. The loop stops when `cancel` fires.
    pub async fn new(
        cancel: CancellationToken,
        node: &BroadcasterNode,
        rounds: Arc<dyn RoundsManager>,
        refresh_interval: Duration,
    ) -> Result<Self> {
        let registry = node
            .registry
            .clone()
            .ok_or_else(|| Error::Config("registry client is nil".to_string()))?;

        let now = Utc::now();
        let orchs = registry.registered_orchestrators().await?;
        for orch in &orchs {
            node.store.upsert(&registry_orch_to_record(orch, now)).await?;
        }
        info!(count = orchs.len(), "imported registry orchestrator snapshot");

        let inner = Arc::new(CacheInner {
            store: node.store.clone(),
            rounds,
            probe: node.probe.clone(),
            pred: working_set_predicate(node.ticket_validator.clone()),
            working: RwLock::new(WorkingSet::default()),
        });

        inner.refresh_pass().await?;

        let bg = inner.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + refresh_interval, refresh_interval);
            // A tick landing while a pass is still running is dropped, so
            // the pass is never re-entered.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            res = bg.refresh_pass() => {
                                if let Err(e) = res {
                                    warn!(error = %e, "orchestrator cache refresh failed");
                                }
                            }
                        }
                    }
                }
            }
            debug!("orchestrator cache refresh loop stopped");
        });

        Ok(Self { inner })
    }

    /// Store handle, mainly for inspection in tests and operator tooling.
    pub fn store(&self) -> &OrchestratorStore {
        &self.inner.store
    }
}

#[async_trait]
impl OrchestratorPool for DbPoolCache {
    fn size(&self) -> usize {
        self.inner.working.read().unwrap().row_count
    }

    fn get_urls(&self) -> Vec<Url> {
        let ws = self.inner.working.read().unwrap();
        ws.pool.as_ref().map(|p| p.get_urls()).unwrap_or_default()
    }

    async fn get_orchestrators(&self, n: usize) -> Result<Vec<OrchestratorInfo>> {
        // Clone the pool out so no lock is held across the selection.
        let pool = self.inner.working.read().unwrap().pool.clone();
        match pool {
            Some(pool) => pool.get_orchestrators(n).await,
            None => Ok(Vec::new()),
        }
    }
}

impl CacheInner {
    /// One full pass: re-probe every parseable URI, write back observed
    /// prices, then atomically swap in the rebuilt working set.
    async fn refresh_pass(&self) -> Result<()> {
        let round = self.rounds.current_round().await?;

        let rows = self.store.select(None).await?;
        let mut probes = Vec::new();
        for rec in &rows {
            let url = match Url::parse(&rec.service_uri) {
                Ok(url) => url,
                Err(e) => {
                    debug!(uri = %rec.service_uri, error = %e, "skipping unparseable service URI");
                    continue;
                }
            };
            probes.push(probe_one(self.probe.clone(), rec.address, url));
        }
        let responses = join_all(probes).await;

        let now = Utc::now();
        for (address, info) in responses.into_iter().flatten() {
            let Some(price_info) = info.price_info else {
                debug!(%address, "probe response carried no price info");
                continue;
            };
            match info_price(&price_info).and_then(price_to_fixed) {
                Ok(fixed) => self.store.update_price(&address, fixed, now).await?,
                Err(e) => debug!(%address, error = %e, "discarding unusable price quote"),
            }
        }

        self.rebuild(round).await
    }

    /// Re-query the working set and swap it in.
    async fn rebuild(&self, round: i64) -> Result<()> {
        let max_price = match BROADCAST_CFG.max_price() {
            Some(price) => Some(price_to_fixed(price)?),
            None => None,
        };
        let filter = OrchFilter {
            current_round: Some(round),
            max_price,
            updated_since: None,
        };
        let rows = self.store.select(Some(&filter)).await?;
        let row_count = rows.len();
        let urls: Vec<Url> = rows
            .iter()
            .filter_map(|rec| Url::parse(&rec.service_uri).ok())
            .collect();

        let pool = BasePool::with_pred(self.probe.clone(), urls, self.pred.clone());
        let url_count = pool.size();
        {
            let mut ws = self.working.write().unwrap();
            *ws = WorkingSet {
                pool: Some(pool),
                row_count,
            };
        }
        debug!(round, rows = row_count, urls = url_count, "orchestrator working set rebuilt");
        Ok(())
    }
}

async fn probe_one(
    probe: ProbeFn,
    address: OrchAddress,
    url: Url,
) -> Option<(OrchAddress, OrchestratorInfo)> {
    match tokio::time::timeout(PROBE_TIMEOUT, (probe)(url.clone())).await {
        Ok(Ok(info)) => Some((address, info)),
        Ok(Err(e)) => {
            // Last known price stays in place.
            debug!(%url, error = %e, "orchestrator probe failed during refresh");
            None
        }
        Err(_) => {
            debug!(%url, "orchestrator probe timed out during refresh");
            None
        }
    }
}

/// Selection-time predicate: the price ceiling is re-read from the
/// broadcast configuration on every call so a concurrent change takes
/// effect immediately, and ticket params go through the validator.
fn working_set_predicate(validator: Arc<dyn TicketParamsValidator>) -> Predicate {
    Arc::new(move |info: &OrchestratorInfo| {
        if let Some(max_price) = BROADCAST_CFG.max_price() {
            let acceptable = info
                .price_info
                .as_ref()
                .and_then(|pi| info_price(pi).ok())
                .map(|price| price <= max_price)
                .unwrap_or(false);
            if !acceptable {
                debug!(transcoder = %info.transcoder, "orchestrator over price ceiling");
                return false;
            }
        }
        if let Some(params) = &info.ticket_params {
            if let Err(e) = validator.validate(params) {
                debug!(transcoder = %info.transcoder, error = %e, "ticket params rejected");
                return false;
            }
        }
        true
    })
}

//! Webhook-refreshed orchestrator pool
//!
//! The candidate list comes from an operator-run HTTP callback returning a
//! JSON array of `{"address": "<url>"}` objects. Refreshes are debounced:
//! a fetch happens at most once per [`WEBHOOK_REFRESH_INTERVAL`], and the
//! inner pool is only rebuilt when the fetched URL set actually changed
//! (detected by content hash). `last_request` advances on every fetch
//! performed, whether or not the hash changed, so the debounce window
//! measures time since the last fetch rather than the last change.

use crate::probe::ProbeFn;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use vgrid_common::net::OrchestratorInfo;
use vgrid_common::{Error, Result};

use super::pool::{BasePool, OrchestratorPool};

/// Minimum spacing between webhook fetches.
pub const WEBHOOK_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Injectable webhook fetch seam.
pub type FetchFn = Arc<dyn Fn(Url) -> BoxFuture<'static, Result<Vec<u8>>> + Send + Sync>;

/// Production fetch: plain GET returning the response body.
pub fn http_fetcher() -> FetchFn {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("Failed to create HTTP client");

    Arc::new(move |url: Url| {
        let client = client.clone();
        async move {
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|e| Error::Http(e.to_string()))?
                .error_for_status()
                .map_err(|e| Error::Http(e.to_string()))?;
            let body = response
                .bytes()
                .await
                .map_err(|e| Error::Http(e.to_string()))?;
            Ok(body.to_vec())
        }
        .boxed()
    })
}

#[derive(serde::Deserialize)]
struct WebhookEntry {
    #[serde(default)]
    address: Option<String>,
}

/// Decode the webhook payload into candidate URLs.
///
/// Entries without an `address` are skipped silently; entries whose
/// address does not parse are skipped with a warning. Anything that is
/// not a JSON array of objects is an error.
pub fn deserialize_webhook_urls(body: &[u8]) -> Result<Vec<Url>> {
    let entries: Vec<WebhookEntry> = serde_json::from_slice(body)?;
    let mut urls = Vec::new();
    for entry in entries {
        let Some(address) = entry.address else {
            continue;
        };
        if address.is_empty() {
            continue;
        }
        match Url::parse(&address) {
            Ok(url) => urls.push(url),
            Err(e) => warn!(address = %address, error = %e, "skipping unparseable webhook address"),
        }
    }
    Ok(urls)
}

/// Pool whose URL list tracks an HTTP callback.
pub struct WebhookPool {
    callback: Url,
    probe: ProbeFn,
    fetch: FetchFn,
    pool: RwLock<Option<BasePool>>,
    response_hash: Mutex<Option<[u8; 32]>>,
    last_request: Mutex<DateTime<Utc>>,
}

impl WebhookPool {
    /// Build the pool and perform the initial fetch. A failing fetch logs
    /// and leaves an empty pool; the next selection past the debounce
    /// window retries.
    pub async fn new(probe: ProbeFn, fetch: FetchFn, callback: Url) -> Self {
        let pool = Self {
            callback,
            probe,
            fetch,
            pool: RwLock::new(None),
            response_hash: Mutex::new(None),
            // Distant past, so the constructor's refresh always fetches.
            last_request: Mutex::new(DateTime::<Utc>::MIN_UTC),
        };
        if let Err(e) = pool.refresh().await {
            warn!(callback = %pool.callback, error = %e, "initial webhook refresh failed");
        }
        pool
    }

    async fn refresh_if_stale(&self) -> Result<()> {
        let stale = {
            let last = self.last_request.lock().unwrap();
            Utc::now().signed_duration_since(*last)
                >= chrono::Duration::seconds(WEBHOOK_REFRESH_INTERVAL.as_secs() as i64)
        };
        if stale {
            self.refresh().await?;
        }
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        let fetched = (self.fetch)(self.callback.clone()).await;
        // The fetch happened; debounce from here even if the payload
        // turns out to be unusable.
        *self.last_request.lock().unwrap() = Utc::now();

        let urls = deserialize_webhook_urls(&fetched?)?;
        let hash = hash_url_set(&urls);

        let changed = {
            let mut stored = self.response_hash.lock().unwrap();
            if stored.as_ref() == Some(&hash) {
                false
            } else {
                *stored = Some(hash);
                true
            }
        };
        if changed {
            debug!(callback = %self.callback, count = urls.len(), "webhook URL set changed");
            let rebuilt = BasePool::new(self.probe.clone(), urls);
            *self.pool.write().unwrap() = Some(rebuilt);
        }
        Ok(())
    }
}

#[async_trait]
impl OrchestratorPool for WebhookPool {
    fn size(&self) -> usize {
        self.pool
            .read()
            .unwrap()
            .as_ref()
            .map(|p| p.size())
            .unwrap_or(0)
    }

    fn get_urls(&self) -> Vec<Url> {
        self.pool
            .read()
            .unwrap()
            .as_ref()
            .map(|p| p.get_urls())
            .unwrap_or_default()
    }

    async fn get_orchestrators(&self, n: usize) -> Result<Vec<OrchestratorInfo>> {
        self.refresh_if_stale().await?;
        let pool = self.pool.read().unwrap().clone();
        match pool {
            Some(pool) => pool.get_orchestrators(n).await,
            None => Ok(Vec::new()),
        }
    }
}

fn hash_url_set(urls: &[Url]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for url in urls {
        hasher.update(url.as_str().as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::const_probe;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn webhook_body(addresses: &[&str]) -> Vec<u8> {
        let entries: Vec<serde_json::Value> = addresses
            .iter()
            .map(|a| serde_json::json!({ "address": a }))
            .collect();
        serde_json::to_vec(&entries).unwrap()
    }

    fn counting_fetch(
        addresses: Arc<Mutex<Vec<String>>>,
        fetches: Arc<AtomicUsize>,
    ) -> FetchFn {
        Arc::new(move |_url: Url| {
            let addresses = addresses.clone();
            let fetches = fetches.clone();
            async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                let current = addresses.lock().unwrap().clone();
                let refs: Vec<&str> = current.iter().map(String::as_str).collect();
                Ok(webhook_body(&refs))
            }
            .boxed()
        })
    }

    fn url_set(urls: &[Url]) -> Vec<String> {
        let mut set: Vec<String> = urls.iter().map(|u| u.to_string()).collect();
        set.sort();
        set
    }

    fn normalized(addresses: &[String]) -> Vec<String> {
        let mut set: Vec<String> = addresses
            .iter()
            .map(|a| Url::parse(a).unwrap().to_string())
            .collect();
        set.sort();
        set
    }

    #[tokio::test]
    async fn test_webhook_pool_refresh_debounce() {
        let initial = vec![
            "https://127.0.0.1:8936".to_string(),
            "https://127.0.0.1:8937".to_string(),
            "https://127.0.0.1:8938".to_string(),
        ];
        let addresses = Arc::new(Mutex::new(initial.clone()));
        let fetches = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(addresses.clone(), fetches.clone());
        let probe = const_probe(OrchestratorInfo {
            transcoder: "T".to_string(),
            ..Default::default()
        });

        let callback = Url::parse("https://vgrid.live/api/orchestrator").unwrap();
        let pool = WebhookPool::new(probe, fetch, callback).await;
        assert_eq!(pool.size(), 3);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        // Within the window: served from the cached list, no fetch.
        let infos = pool.get_orchestrators(2).await.unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        let expected = normalized(&initial);
        assert_eq!(url_set(&pool.get_urls()), expected);

        // Content changes but the window has not elapsed: still no fetch,
        // list unchanged.
        let replacement = vec![
            "https://127.0.0.1:8932".to_string(),
            "https://127.0.0.1:8933".to_string(),
            "https://127.0.0.1:8934".to_string(),
        ];
        *addresses.lock().unwrap() = replacement.clone();
        let infos = pool.get_orchestrators(2).await.unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(url_set(&pool.get_urls()), expected);

        // Age the last request past the window: fetch runs and the new
        // set is swapped in.
        *pool.last_request.lock().unwrap() = Utc::now() - chrono::Duration::minutes(2);
        let infos = pool.get_orchestrators(2).await.unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        let expected_new = normalized(&replacement);
        assert_eq!(url_set(&pool.get_urls()), expected_new);
        assert_eq!(pool.size(), 3);

        // Unchanged content past the window: the fetch still happens and
        // advances last_request, but the pool is not rebuilt.
        *pool.last_request.lock().unwrap() = Utc::now() - chrono::Duration::minutes(2);
        let stamp_before = *pool.last_request.lock().unwrap();
        let infos = pool.get_orchestrators(2).await.unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
        assert!(*pool.last_request.lock().unwrap() > stamp_before);
        assert_eq!(url_set(&pool.get_urls()), expected_new);
    }

    #[test]
    fn test_deserialize_webhook_urls() {
        // Well-formed entry.
        let urls = deserialize_webhook_urls(&webhook_body(&["https://127.0.0.1:8936"])).unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].as_str(), "https://127.0.0.1:8936/");

        // Empty payload is a JSON error.
        let err = deserialize_webhook_urls(&[]).unwrap_err();
        assert!(err.to_string().contains("EOF"), "got: {err}");

        // Entry without an address is skipped, not an error.
        let urls = deserialize_webhook_urls(br#"[{}]"#).unwrap();
        assert!(urls.is_empty());

        // Garbage bytes.
        let err = deserialize_webhook_urls(&[0u8; 64]).unwrap_err();
        assert!(err.to_string().contains("expected value"), "got: {err}");

        // A JSON object is not an array of entries.
        let err = deserialize_webhook_urls(br#"{"name":false}"#).unwrap_err();
        assert!(err.to_string().contains("invalid type: map"), "got: {err}");

        // Neither is a bare number.
        let err = deserialize_webhook_urls(br#"1112"#).unwrap_err();
        assert!(err.to_string().contains("invalid type: integer"), "got: {err}");

        // An unparseable address is skipped with a warning.
        let urls = deserialize_webhook_urls(
            br#"[{"address":"not a url"},{"address":"https://127.0.0.1:8936"}]"#,
        )
        .unwrap();
        assert_eq!(urls.len(), 1);

        // Empty array is fine.
        let urls = deserialize_webhook_urls(br#"[]"#).unwrap();
        assert!(urls.is_empty());
    }
}

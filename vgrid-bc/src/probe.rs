//! Orchestrator probe client
//!
//! Single-shot fetch of [`OrchestratorInfo`] from a service URI. Pure: no
//! caching, no retries; transport errors surface verbatim and the caller
//! decides what to discard. Pools hold the probe as an injectable function
//! so tests can stub responses per orchestrator.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use vgrid_common::net::OrchestratorInfo;
use vgrid_common::{Error, Result};

/// Deadline applied to every probe, at the HTTP layer and again by the
/// selection engine around stubbed probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Path under the service URI answering orchestrator-info requests.
const ORCH_INFO_PATH: &str = "orchestrator-info";

/// Injectable probe seam shared by every pool.
pub type ProbeFn =
    Arc<dyn Fn(Url) -> BoxFuture<'static, Result<OrchestratorInfo>> + Send + Sync>;

/// Production probe: `GET <service_uri>/orchestrator-info`, JSON decode.
pub fn http_probe() -> ProbeFn {
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .expect("Failed to create HTTP client");

    Arc::new(move |url: Url| {
        let client = client.clone();
        async move {
            let endpoint = url
                .join(ORCH_INFO_PATH)
                .map_err(|e| Error::InvalidInput(format!("bad service URI {url}: {e}")))?;
            let response = client
                .get(endpoint)
                .send()
                .await
                .map_err(|e| Error::Http(e.to_string()))?
                .error_for_status()
                .map_err(|e| Error::Http(e.to_string()))?;
            let info = response
                .json::<OrchestratorInfo>()
                .await
                .map_err(|e| Error::Http(e.to_string()))?;
            Ok(info)
        }
        .boxed()
    })
}

/// Probe returning a fixed response; the stub seam for tests.
pub fn const_probe(info: OrchestratorInfo) -> ProbeFn {
    Arc::new(move |_url: Url| {
        let info = info.clone();
        async move { Ok(info) }.boxed()
    })
}

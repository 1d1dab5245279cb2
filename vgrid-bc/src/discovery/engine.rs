//! First-N-passing selection
//!
//! Fans out one probe task per candidate URL and collects the first `n`
//! responses the predicate accepts, in completion order. Every task sends
//! exactly one message on a channel sized to the candidate count, so no
//! sender can ever block on a slow collector; once `n` acceptances arrive
//! the shared token cancels everything still in flight.

use crate::probe::{ProbeFn, PROBE_TIMEOUT};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;
use vgrid_common::net::OrchestratorInfo;

use super::pool::Predicate;

pub(crate) async fn select_orchestrators(
    probe: &ProbeFn,
    urls: &[Url],
    pred: &Predicate,
    n: usize,
) -> Vec<OrchestratorInfo> {
    if urls.is_empty() || n == 0 {
        return Vec::new();
    }

    let cancel = CancellationToken::new();
    let (reply_tx, mut reply_rx) = mpsc::channel::<Option<OrchestratorInfo>>(urls.len());

    for url in urls.iter().cloned() {
        let probe_fut = (probe)(url.clone());
        let pred = pred.clone();
        let cancel = cancel.clone();
        let reply_tx = reply_tx.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                probed = tokio::time::timeout(PROBE_TIMEOUT, probe_fut) => match probed {
                    Ok(Ok(info)) => {
                        if pred(&info) {
                            Some(info)
                        } else {
                            debug!(%url, "orchestrator rejected by predicate");
                            None
                        }
                    }
                    Ok(Err(e)) => {
                        debug!(%url, error = %e, "orchestrator probe failed");
                        None
                    }
                    Err(_) => {
                        debug!(%url, "orchestrator probe timed out");
                        None
                    }
                },
            };
            // Capacity equals the task count, so this never blocks; a
            // closed channel just means the collector already returned.
            let _ = reply_tx.send(outcome).await;
        });
    }
    drop(reply_tx);

    let mut accepted = Vec::with_capacity(n.min(urls.len()));
    // recv() yields None once every task has replied and hung up.
    while let Some(outcome) = reply_rx.recv().await {
        if let Some(info) = outcome {
            accepted.push(info);
            if accepted.len() >= n {
                break;
            }
        }
    }
    cancel.cancel();

    accepted
}

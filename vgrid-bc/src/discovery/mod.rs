//! Orchestrator discovery
//!
//! Pool abstractions over candidate orchestrator URL lists:
//! - [`BasePool`]: static shuffled list + acceptance predicate
//! - [`DbPoolCache`]: registry-backed, periodically re-probed cache
//! - [`WebhookPool`]: list refreshed from an HTTP callback, debounced
//!
//! All three serve "first N that pass" queries through the shared
//! selection engine.

mod db_pool;
mod engine;
mod pool;
mod webhook;

pub use db_pool::{DbPoolCache, DEFAULT_REFRESH_INTERVAL};
pub use pool::{accept_all, random_perm, BasePool, OrchestratorPool, PermFn, Predicate};
pub use webhook::{
    deserialize_webhook_urls, http_fetcher, FetchFn, WebhookPool, WEBHOOK_REFRESH_INTERVAL,
};

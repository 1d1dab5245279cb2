//! External collaborator traits and registry ingest
//!
//! The registry client, rounds manager, and ticket validator live outside
//! this crate (on-chain plumbing, payment plane). Discovery consumes them
//! through these traits; tests substitute stubs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vgrid_common::db::OrchRecord;
use vgrid_common::net::{OrchAddress, TicketParams};
use vgrid_common::Result;

/// One registry entry. Rounds arrive as the registry's unbounded integers.
#[derive(Debug, Clone)]
pub struct RegistryOrch {
    pub address: OrchAddress,
    pub service_uri: String,
    pub activation_round: u128,
    pub deactivation_round: u128,
    pub stake: i64,
}

/// Read access to the orchestrator registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn registered_orchestrators(&self) -> Result<Vec<RegistryOrch>>;
}

/// Observer of the registry's monotonically increasing round counter.
#[async_trait]
pub trait RoundsManager: Send + Sync {
    async fn current_round(&self) -> Result<i64>;
}

/// Accepts or rejects the payment-ticket parameters an orchestrator offers.
pub trait TicketParamsValidator: Send + Sync {
    fn validate(&self, params: &TicketParams) -> Result<()>;
}

/// Flatten a registry entry into a store record.
///
/// Rounds are clamped to `i64::MAX`; the store never holds an unbounded
/// integer. The price is left at 0 so an existing probe-derived price
/// survives the upsert.
pub fn registry_orch_to_record(orch: &RegistryOrch, now: DateTime<Utc>) -> OrchRecord {
    OrchRecord {
        address: orch.address,
        service_uri: orch.service_uri.clone(),
        price_per_pixel: 0,
        activation_round: clamp_round(orch.activation_round),
        deactivation_round: clamp_round(orch.deactivation_round),
        stake: orch.stake,
        updated_at: now,
    }
}

fn clamp_round(round: u128) -> i64 {
    if round > i64::MAX as u128 {
        i64::MAX
    } else {
        round as i64
    }
}

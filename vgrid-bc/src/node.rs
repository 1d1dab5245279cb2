//! Broadcaster node state
//!
//! Bundle of the external handles discovery needs, assembled once at
//! startup and shared by every pool.

use crate::probe::ProbeFn;
use crate::registry::{RegistryClient, TicketParamsValidator};
use std::sync::Arc;
use vgrid_common::db::OrchestratorStore;

/// Shared broadcaster state handed to pool constructors.
#[derive(Clone)]
pub struct BroadcasterNode {
    pub store: OrchestratorStore,
    /// Registry access; `None` for off-chain deployments, which cannot use
    /// the DB pool cache.
    pub registry: Option<Arc<dyn RegistryClient>>,
    pub ticket_validator: Arc<dyn TicketParamsValidator>,
    pub probe: ProbeFn,
}

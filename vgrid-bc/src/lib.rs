//! # VGRID Broadcaster Library
//!
//! Broadcaster-side orchestrator discovery and selection:
//! - Probe client fetching `OrchestratorInfo` from service URIs
//! - Pool abstractions (static, predicate-filtered, DB-cached, webhook)
//! - Concurrent first-N-passing selection
//! - Segment verification with bounded retries
//!
//! The registry, rounds manager, and ticket validator are external
//! collaborators reached through the traits in [`registry`].

pub mod discovery;
pub mod node;
pub mod probe;
pub mod registry;
pub mod verification;

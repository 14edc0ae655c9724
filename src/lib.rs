//! Axiom Ledger
//!
//! File-backed compliance trackers behind one HTTP service:
//! - Sacrifice, contradiction, identity and friction logs
//! - Threshold evaluation with pass-rate auto-tuning
//! - Candidate onboarding state machine
//! - Swarm coherence snapshots and friction mining
//! - Axiom validation and keyword coherence scoring
//! - Webhook registry with MIGP delivery

pub mod config;
pub mod error;
pub mod ledger;
pub mod scoring;
pub mod server;
pub mod store;
pub mod telemetry;

pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use server::{router, run_server, AppState};

/// First eight hex digits of a fresh v4 UUID.
pub(crate) fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

pub(crate) fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

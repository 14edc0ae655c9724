//! Record stores
//!
//! Each store owns its backing file, loads it once on `open` and writes
//! through on every mutation. Stores are plain structs; the server wraps
//! each in its own mutex.

pub mod candidates;
pub mod contradiction;
pub mod friction;
pub mod identity;
pub mod sacrifice;
pub mod swarm;
pub mod thresholds;
pub mod webhooks;

pub use candidates::{Candidate, CandidateRegistry, CandidateStatus, OnboardingStep};
pub use contradiction::{Contradiction, ContradictionMap, ContradictionState, ContradictionType};
pub use friction::{FrictionCandidate, FrictionEvent, FrictionLog, FrictionMiner};
pub use identity::{IdentityEvent, IdentityTracker};
pub use sacrifice::{SacrificeEvent, SacrificeLog};
pub use swarm::{SwarmAnalyzer, SwarmNode, SwarmSnapshot};
pub use thresholds::{ThresholdEngine, ThresholdTable};
pub use webhooks::{MigpDispatcher, Webhook, WebhookRegistry};

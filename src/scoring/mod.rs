//! Stateless scoring over small records and free text.

pub mod axioms;
pub mod gnosis;
pub mod swarm;

pub use axioms::{AxiomGuard, ValidationRecord};
pub use gnosis::{GnosisScanner, ScanResult};
pub use swarm::{SwarmValidation, SwarmValidator};

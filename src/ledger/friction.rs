//! Friction: low-coherence mining and the typed friction event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::swarm::SwarmNode;
use crate::store::{Journal, JsonDocument};

/// Nodes strictly below this coherence become friction candidates.
pub const FRICTION_COHERENCE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MiningStatus {
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrictionCandidate {
    pub node_id: Value,
    pub coherence: f64,
    pub friction_score: f64,
    pub timestamp: DateTime<Utc>,
    pub status: MiningStatus,
}

/// Writes each non-empty batch of mined candidates to its own file.
pub struct FrictionMiner {
    dir: PathBuf,
}

impl FrictionMiner {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Nodes with a recorded coherence below the threshold. A node without a
    /// coherence value is not treated as friction.
    pub fn find_candidates(nodes: &[SwarmNode]) -> Vec<FrictionCandidate> {
        let now = Utc::now();
        nodes
            .iter()
            .filter_map(|node| {
                let coherence = node.coherence?;
                (coherence < FRICTION_COHERENCE_THRESHOLD).then(|| FrictionCandidate {
                    node_id: node.id.clone(),
                    coherence,
                    friction_score: crate::round4(1.0 - coherence),
                    timestamp: now,
                    status: MiningStatus::Pending,
                })
            })
            .collect()
    }

    pub async fn mine(&self, nodes: &[SwarmNode]) -> LedgerResult<Vec<FrictionCandidate>> {
        let candidates = Self::find_candidates(nodes);
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let file = format!(
            "friction_{}_{}.json",
            Utc::now().format("%Y%m%d_%H%M%S"),
            crate::short_id()
        );
        JsonDocument::<Vec<FrictionCandidate>>::new(self.dir.join(&file))
            .save(&candidates)
            .await?;
        info!("Friction mining: {} candidates written to {}", candidates.len(), file);
        Ok(candidates)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrictionType {
    Divergence,
    CoherenceDrop,
    Contradiction,
    ThresholdBreach,
    CandidateRejection,
    GovernanceConflict,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn coherence_impact(&self) -> f64 {
        match self {
            Self::Low => 0.1,
            _ => 0.3,
        }
    }

    /// HIGH and CRITICAL friction gets a resolver candidate.
    pub fn needs_resolver(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFrictionEvent {
    pub friction_type: FrictionType,
    pub severity: Severity,
    #[serde(default)]
    pub source: String,
    pub description: String,
    #[serde(default)]
    pub axiom_impact: Vec<String>,
}

impl NewFrictionEvent {
    pub fn validate(&self) -> LedgerResult<()> {
        if self.description.trim().is_empty() {
            return Err(LedgerError::validation("description is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrictionEvent {
    pub event_id: String,
    pub friction_type: FrictionType,
    pub severity: Severity,
    pub source: String,
    pub description: String,
    pub axiom_impact: Vec<String>,
    pub coherence_impact: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver_candidate: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrictionSummary {
    pub total_events: usize,
    pub by_type: BTreeMap<FrictionType, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub total_coherence_impact: f64,
}

pub struct FrictionLog {
    journal: Journal<FrictionEvent>,
    events: Vec<FrictionEvent>,
}

impl FrictionLog {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let journal = Journal::new(path);
        let events = journal.load_or_empty().await;
        Self { journal, events }
    }

    /// Allocate the id an event will carry, so a resolver candidate can be
    /// named after it before the event is written.
    pub fn next_event_id() -> String {
        format!("FRC_{}", crate::short_id())
    }

    pub async fn record(
        &mut self,
        event_id: String,
        input: NewFrictionEvent,
        resolver_candidate: Option<String>,
    ) -> LedgerResult<FrictionEvent> {
        input.validate()?;
        let event = FrictionEvent {
            event_id,
            friction_type: input.friction_type,
            severity: input.severity,
            source: if input.source.trim().is_empty() {
                "api".to_string()
            } else {
                input.source
            },
            description: input.description,
            axiom_impact: input.axiom_impact,
            coherence_impact: input.severity.coherence_impact(),
            resolver_candidate,
            timestamp: Utc::now(),
        };
        self.journal.append(&event).await?;
        info!(
            "Friction {:?}/{:?} recorded from {}",
            event.friction_type, event.severity, event.source
        );
        self.events.push(event.clone());
        Ok(event)
    }

    pub fn events(&self) -> &[FrictionEvent] {
        &self.events
    }

    pub fn summary(&self) -> FrictionSummary {
        let mut by_type = BTreeMap::new();
        let mut by_severity = BTreeMap::new();
        let mut total_coherence_impact = 0.0;
        for event in &self.events {
            *by_type.entry(event.friction_type).or_insert(0) += 1;
            *by_severity.entry(event.severity).or_insert(0) += 1;
            total_coherence_impact += event.coherence_impact;
        }
        FrictionSummary {
            total_events: self.events.len(),
            by_type,
            by_severity,
            total_coherence_impact: crate::round4(total_coherence_impact),
        }
    }
}

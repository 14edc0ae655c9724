//! Swarm coherence snapshots
//!
//! `analyze` averages node coherence, mines low-coherence nodes for friction
//! and keeps the result as the "last analysis" document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::info;

use crate::error::LedgerResult;
use crate::ledger::friction::{FrictionCandidate, FrictionMiner};
use crate::store::JsonDocument;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwarmNode {
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coherence: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrictionMiningOutcome {
    pub triggered: bool,
    pub candidates_count: usize,
    #[serde(default)]
    pub candidates: Vec<FrictionCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwarmSnapshot {
    pub timestamp: DateTime<Utc>,
    pub node_count: usize,
    pub average_coherence: f64,
    pub nodes: Vec<SwarmNode>,
    pub friction_mining: FrictionMiningOutcome,
}

/// Mean coherence, rounded to four places. Nodes without a value count as 0.
pub fn average_coherence(nodes: &[SwarmNode]) -> f64 {
    if nodes.is_empty() {
        return 0.0;
    }
    let sum: f64 = nodes.iter().map(|n| n.coherence.unwrap_or(0.0)).sum();
    crate::round4(sum / nodes.len() as f64)
}

pub struct SwarmAnalyzer {
    store: JsonDocument<Option<SwarmSnapshot>>,
    miner: FrictionMiner,
    last: Option<SwarmSnapshot>,
}

impl SwarmAnalyzer {
    pub async fn open(snapshot_path: impl Into<PathBuf>, miner: FrictionMiner) -> Self {
        let store = JsonDocument::new(snapshot_path);
        let last = store.load_or_default().await;
        Self { store, miner, last }
    }

    pub fn last(&self) -> Option<&SwarmSnapshot> {
        self.last.as_ref()
    }

    pub fn miner(&self) -> &FrictionMiner {
        &self.miner
    }

    pub async fn analyze(&mut self, nodes: Vec<SwarmNode>) -> LedgerResult<SwarmSnapshot> {
        let candidates = self.miner.mine(&nodes).await?;
        let snapshot = SwarmSnapshot {
            timestamp: Utc::now(),
            node_count: nodes.len(),
            average_coherence: average_coherence(&nodes),
            nodes,
            friction_mining: FrictionMiningOutcome {
                triggered: !candidates.is_empty(),
                candidates_count: candidates.len(),
                candidates,
            },
        };

        self.store.save(&Some(snapshot.clone())).await?;
        self.last = Some(snapshot.clone());

        info!(
            "Swarm analysis: {} nodes, average coherence {}, {} friction candidates",
            snapshot.node_count, snapshot.average_coherence, snapshot.friction_mining.candidates_count
        );
        Ok(snapshot)
    }
}

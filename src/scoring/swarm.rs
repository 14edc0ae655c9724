//! Swarm validation: run every node's task through the axiom guard and
//! report where nodes disagree.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::axioms::{coherence_score, AxiomGuard, ValidationRecord, AXIOMS};

#[derive(Debug, Clone, Deserialize)]
pub struct NodeTask {
    pub node_id: String,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub task_data: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeValidation {
    pub node_id: String,
    pub node_type: String,
    pub coherence_score: f64,
    pub is_coherent: bool,
    pub validation: ValidationRecord,
}

/// An axiom that some nodes pass and others fail.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Divergence {
    pub axiom_id: &'static str,
    pub axiom_name: &'static str,
    pub passing_nodes: Vec<String>,
    pub failing_nodes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwarmHealth {
    Healthy,
    Divergent,
    NoValidations,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwarmValidation {
    pub total_nodes: usize,
    pub coherent_nodes: usize,
    pub average_coherence: f64,
    pub swarm_coherent: bool,
    pub health: SwarmHealth,
    pub divergences: Vec<Divergence>,
    pub nodes: Vec<NodeValidation>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SwarmValidator {
    guard: AxiomGuard,
}

impl SwarmValidator {
    pub fn new(guard: AxiomGuard) -> Self {
        Self { guard }
    }

    pub fn validate_node(&self, node: &NodeTask) -> NodeValidation {
        let validation = self.guard.validate(&node.task_data);
        NodeValidation {
            node_id: node.node_id.clone(),
            node_type: node.node_type.clone(),
            coherence_score: coherence_score(validation.passed_count, validation.total),
            is_coherent: validation.passed_all,
            validation,
        }
    }

    pub fn validate_swarm(&self, nodes: &[NodeTask]) -> SwarmValidation {
        let validated: Vec<NodeValidation> = nodes.iter().map(|n| self.validate_node(n)).collect();
        let total_nodes = validated.len();
        let coherent_nodes = validated.iter().filter(|n| n.is_coherent).count();
        let average_coherence = if total_nodes == 0 {
            0.0
        } else {
            let sum: f64 = validated.iter().map(|n| n.coherence_score).sum();
            (sum / total_nodes as f64 * 100.0).round() / 100.0
        };
        let swarm_coherent = total_nodes > 0 && coherent_nodes == total_nodes;
        let health = match (total_nodes, swarm_coherent) {
            (0, _) => SwarmHealth::NoValidations,
            (_, true) => SwarmHealth::Healthy,
            (_, false) => SwarmHealth::Divergent,
        };

        SwarmValidation {
            total_nodes,
            coherent_nodes,
            average_coherence,
            swarm_coherent,
            health,
            divergences: detect_divergence(&validated),
            nodes: validated,
        }
    }
}

pub fn detect_divergence(nodes: &[NodeValidation]) -> Vec<Divergence> {
    AXIOMS
        .iter()
        .filter_map(|axiom| {
            let (passing, failing): (Vec<&NodeValidation>, Vec<&NodeValidation>) = nodes
                .iter()
                .filter(|n| n.validation.results.contains_key(axiom.id))
                .partition(|n| n.validation.results[axiom.id].passed);
            if passing.is_empty() || failing.is_empty() {
                return None;
            }
            Some(Divergence {
                axiom_id: axiom.id,
                axiom_name: axiom.name,
                passing_nodes: passing.iter().map(|n| n.node_id.clone()).collect(),
                failing_nodes: failing.iter().map(|n| n.node_id.clone()).collect(),
            })
        })
        .collect()
}

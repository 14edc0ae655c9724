//! Axiom guard
//!
//! Five axioms, each a small rule over a loosely typed task record. The
//! coherence score is the share of passing axioms scaled to 0–5.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const MAX_COHERENCE: f64 = 5.0;
const MIN_REASON_CHARS: usize = 10;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AxiomResult {
    pub axiom_id: &'static str,
    pub axiom_name: &'static str,
    pub passed: bool,
    pub evidence: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidationRecord {
    pub task_id: Option<String>,
    pub results: BTreeMap<&'static str, AxiomResult>,
    pub passed_count: usize,
    pub total: usize,
    pub coherence_score: f64,
    pub passed_all: bool,
    pub validated_at: DateTime<Utc>,
}

impl ValidationRecord {
    pub fn violations(&self) -> Vec<&AxiomResult> {
        self.results.values().filter(|r| !r.passed).collect()
    }
}

type Rule = fn(&Map<String, Value>) -> (bool, String);

pub struct Axiom {
    pub id: &'static str,
    pub name: &'static str,
    pub recommendation: &'static str,
    rule: Rule,
}

pub const AXIOMS: [Axiom; 5] = [
    Axiom {
        id: "A1",
        name: "RELATIONAL",
        recommendation: "State who this change serves in `serves`",
        rule: relational,
    },
    Axiom {
        id: "A2",
        name: "MEMORY",
        recommendation: "Record `task_id` and `timestamp_utc` so the change can be traced",
        rule: memory,
    },
    Axiom {
        id: "A4",
        name: "PROCESS",
        recommendation: "Explain the reasoning in more than ten characters",
        rule: process,
    },
    Axiom {
        id: "A7",
        name: "SACRIFICE",
        recommendation: "List trade-offs under `sacrifices`",
        rule: sacrifice,
    },
    Axiom {
        id: "A9",
        name: "CONTRADICTION",
        recommendation: "List held tensions under `contradictions`",
        rule: contradiction,
    },
];

fn relational(task: &Map<String, Value>) -> (bool, String) {
    match task.get("serves") {
        Some(Value::Array(items)) if !items.is_empty() => {
            (true, format!("Serves {} relation(s)", items.len()))
        }
        Some(Value::String(s)) if !s.trim().is_empty() => (true, format!("Serves {s}")),
        _ => (false, "No `serves` declared".to_string()),
    }
}

fn memory(task: &Map<String, Value>) -> (bool, String) {
    let has = |key: &str| task.get(key).is_some_and(|v| !v.is_null());
    match (has("task_id"), has("timestamp_utc")) {
        (true, true) => (true, "task_id and timestamp_utc present".to_string()),
        (false, true) => (false, "Missing task_id".to_string()),
        (true, false) => (false, "Missing timestamp_utc".to_string()),
        (false, false) => (false, "Missing task_id and timestamp_utc".to_string()),
    }
}

fn process(task: &Map<String, Value>) -> (bool, String) {
    // `reason` wins when present, even if short; `description` is the fallback.
    let text = task
        .get("reason")
        .or_else(|| task.get("description"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let chars = text.chars().count();
    (
        chars > MIN_REASON_CHARS,
        format!("Reasoning is {chars} characters"),
    )
}

fn sacrifice(task: &Map<String, Value>) -> (bool, String) {
    let evidence = match task.get("sacrifices").and_then(Value::as_array) {
        Some(items) if !items.is_empty() => format!("{} sacrifice(s) documented", items.len()),
        _ => "No sacrifices declared".to_string(),
    };
    (true, evidence)
}

fn contradiction(task: &Map<String, Value>) -> (bool, String) {
    let evidence = match task.get("contradictions").and_then(Value::as_array) {
        Some(items) if !items.is_empty() => format!("{} contradiction(s) held", items.len()),
        _ => "No contradictions declared".to_string(),
    };
    (true, evidence)
}

/// Stateless validator over [`AXIOMS`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AxiomGuard;

impl AxiomGuard {
    pub fn validate(&self, task: &Map<String, Value>) -> ValidationRecord {
        let results: BTreeMap<&'static str, AxiomResult> = AXIOMS
            .iter()
            .map(|axiom| {
                let (passed, evidence) = (axiom.rule)(task);
                let result = AxiomResult {
                    axiom_id: axiom.id,
                    axiom_name: axiom.name,
                    passed,
                    evidence,
                    recommendation: (!passed).then_some(axiom.recommendation),
                };
                (axiom.id, result)
            })
            .collect();

        let total = results.len();
        let passed_count = results.values().filter(|r| r.passed).count();

        ValidationRecord {
            task_id: task.get("task_id").map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            coherence_score: coherence_score(passed_count, total),
            passed_all: passed_count == total,
            passed_count,
            total,
            results,
            validated_at: Utc::now(),
        }
    }
}

/// `passed / total` scaled to 0–5, rounded to two places.
pub fn coherence_score(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = passed as f64 / total as f64 * MAX_COHERENCE;
    (raw * 100.0).round() / 100.0
}

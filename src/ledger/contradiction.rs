//! Contradiction map
//!
//! Contradictions are logged, never resolved. A record can be witnessed by
//! other nodes or explicitly held open; its resolution stays
//! `LOGGED_NOT_RESOLVED` for its whole life.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use crate::error::{LedgerError, LedgerResult};
use crate::store::JsonDocument;

pub const RESOLUTION: &str = "LOGGED_NOT_RESOLVED";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContradictionType {
    #[default]
    RequirementConflict,
    AxiomTension,
    NodeDivergence,
    TemporalParadox,
    ValueConflict,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContradictionState {
    Active,
    Held,
    Witnessed,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contradiction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ContradictionType,
    pub pole_a: String,
    pub pole_b: String,
    pub context: String,
    pub source_nodes: Vec<String>,
    pub witnesses: Vec<String>,
    pub state: ContradictionState,
    pub resolution: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewContradiction {
    #[serde(rename = "type", default)]
    pub kind: ContradictionType,
    #[serde(default)]
    pub pole_a: String,
    #[serde(default)]
    pub pole_b: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub source_nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContradictionMapView<'a> {
    pub total_contradictions: usize,
    pub active: usize,
    pub witnessed: usize,
    pub held: usize,
    pub by_type: BTreeMap<ContradictionType, usize>,
    pub contradictions: &'a [Contradiction],
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ContradictionDoc {
    contradictions: Vec<Contradiction>,
}

pub struct ContradictionMap {
    store: JsonDocument<ContradictionDoc>,
    doc: ContradictionDoc,
}

impl ContradictionMap {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let store = JsonDocument::new(path);
        let doc = store.load_or_default().await;
        Self { store, doc }
    }

    pub async fn record(&mut self, input: NewContradiction) -> LedgerResult<Contradiction> {
        if input.pole_a.trim().is_empty() || input.pole_b.trim().is_empty() {
            return Err(LedgerError::validation("pole_a and pole_b are required"));
        }

        let contradiction = Contradiction {
            id: format!("CTD_{}", crate::short_id()),
            kind: input.kind,
            pole_a: input.pole_a,
            pole_b: input.pole_b,
            context: input
                .context
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| "API submission".to_string()),
            source_nodes: input.source_nodes,
            witnesses: Vec::new(),
            state: ContradictionState::Active,
            resolution: RESOLUTION.to_string(),
            timestamp: Utc::now(),
        };

        self.doc.contradictions.push(contradiction.clone());
        self.store.save(&self.doc).await?;
        info!("Contradiction {} logged ({:?})", contradiction.id, contradiction.kind);
        Ok(contradiction)
    }

    /// Add a witness. An ACTIVE contradiction becomes WITNESSED; HELD stays HELD.
    pub async fn witness(&mut self, id: &str, witness: &str) -> LedgerResult<Contradiction> {
        if witness.trim().is_empty() {
            return Err(LedgerError::validation("witness is required"));
        }
        let entry = self.find_mut(id)?;
        if entry.state == ContradictionState::Archived {
            return Err(LedgerError::InvalidTransition(format!(
                "contradiction {id} is archived"
            )));
        }
        if !entry.witnesses.iter().any(|w| w == witness) {
            entry.witnesses.push(witness.to_string());
        }
        if entry.state == ContradictionState::Active {
            entry.state = ContradictionState::Witnessed;
        }
        let updated = entry.clone();
        self.store.save(&self.doc).await?;
        Ok(updated)
    }

    pub async fn hold(&mut self, id: &str) -> LedgerResult<Contradiction> {
        let entry = self.find_mut(id)?;
        if entry.state == ContradictionState::Archived {
            return Err(LedgerError::InvalidTransition(format!(
                "contradiction {id} is archived"
            )));
        }
        entry.state = ContradictionState::Held;
        let updated = entry.clone();
        self.store.save(&self.doc).await?;
        Ok(updated)
    }

    pub async fn archive(&mut self, id: &str) -> LedgerResult<Contradiction> {
        let entry = self.find_mut(id)?;
        entry.state = ContradictionState::Archived;
        let updated = entry.clone();
        self.store.save(&self.doc).await?;
        Ok(updated)
    }

    pub fn get(&self, id: &str) -> Option<&Contradiction> {
        self.doc.contradictions.iter().find(|c| c.id == id)
    }

    /// Contradictions still open: ACTIVE or WITNESSED.
    pub fn active(&self) -> Vec<&Contradiction> {
        self.doc
            .contradictions
            .iter()
            .filter(|c| {
                matches!(
                    c.state,
                    ContradictionState::Active | ContradictionState::Witnessed
                )
            })
            .collect()
    }

    pub fn held(&self) -> Vec<&Contradiction> {
        self.in_state(ContradictionState::Held).collect()
    }

    pub fn map(&self) -> ContradictionMapView<'_> {
        let mut by_type = BTreeMap::new();
        for c in &self.doc.contradictions {
            *by_type.entry(c.kind).or_insert(0) += 1;
        }
        ContradictionMapView {
            total_contradictions: self.doc.contradictions.len(),
            active: self.in_state(ContradictionState::Active).count(),
            witnessed: self.in_state(ContradictionState::Witnessed).count(),
            held: self.in_state(ContradictionState::Held).count(),
            by_type,
            contradictions: &self.doc.contradictions,
        }
    }

    fn in_state(&self, state: ContradictionState) -> impl Iterator<Item = &Contradiction> {
        self.doc.contradictions.iter().filter(move |c| c.state == state)
    }

    fn find_mut(&mut self, id: &str) -> LedgerResult<&mut Contradiction> {
        self.doc
            .contradictions
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| LedgerError::not_found("contradiction", id))
    }
}

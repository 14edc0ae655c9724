//! Identity event tracking
//!
//! Events are journaled; the identity registry is derived state, rebuilt by
//! replaying the journal whenever the tracker is opened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::store::Journal;

const RECENT_EVENTS: usize = 10;
pub const DEFAULT_EVENT_TYPE: &str = "UPDATE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityEvent {
    pub id: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub details: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl IdentityEvent {
    /// Identity ids referenced by this event, in order of first mention.
    pub fn identity_refs(&self) -> Vec<String> {
        let mut refs: Vec<String> = Vec::new();
        let mut push = |id: &str| {
            if !id.is_empty() && !refs.iter().any(|r| r == id) {
                refs.push(id.to_string());
            }
        };

        for key in ["identity", "identity_a", "identity_b"] {
            if let Some(Value::String(id)) = self.details.get(key) {
                push(id);
            }
        }
        match self.details.get("identities") {
            Some(Value::Array(items)) => {
                for item in items {
                    if let Value::String(id) = item {
                        push(id);
                    }
                }
            }
            Some(Value::String(id)) => push(id),
            _ => {}
        }
        refs
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IdentityRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub event_count: u64,
    pub last_event: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackOutcome {
    pub event: IdentityEvent,
    pub identities_updated: Vec<String>,
    pub total_events: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentityStatus {
    pub identity_count: usize,
    pub event_count: usize,
    pub identities: Vec<String>,
    pub recent_events: Vec<IdentityEvent>,
    pub last_updated: Option<DateTime<Utc>>,
}

pub struct IdentityTracker {
    journal: Journal<IdentityEvent>,
    events: Vec<IdentityEvent>,
    identities: BTreeMap<String, IdentityRecord>,
}

impl IdentityTracker {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let journal = Journal::new(path);
        let replay = journal.load_or_empty().await;
        let mut tracker = Self {
            journal,
            events: Vec::with_capacity(replay.len()),
            identities: BTreeMap::new(),
        };
        for event in replay {
            tracker.apply(event);
        }
        debug!(
            "Identity tracker replayed {} events, {} identities",
            tracker.events.len(),
            tracker.identities.len()
        );
        tracker
    }

    pub async fn track_event(
        &mut self,
        event_type: &str,
        details: Map<String, Value>,
    ) -> LedgerResult<TrackOutcome> {
        let event_type = match event_type.trim() {
            "" => DEFAULT_EVENT_TYPE.to_string(),
            t => t.to_string(),
        };
        let event = IdentityEvent {
            id: self.next_id(),
            event_type,
            details,
            timestamp: Utc::now(),
        };

        self.journal.append(&event).await?;
        let identities_updated = self.apply(event.clone());
        Ok(TrackOutcome {
            event,
            identities_updated,
            total_events: self.events.len(),
        })
    }

    pub fn status(&self) -> IdentityStatus {
        let skip = self.events.len().saturating_sub(RECENT_EVENTS);
        IdentityStatus {
            identity_count: self.identities.len(),
            event_count: self.events.len(),
            identities: self.identities.keys().cloned().collect(),
            recent_events: self.events[skip..].to_vec(),
            last_updated: self.events.last().map(|e| e.timestamp),
        }
    }

    pub fn identity(&self, id: &str) -> LedgerResult<&IdentityRecord> {
        self.identities
            .get(id)
            .ok_or_else(|| LedgerError::not_found("identity", id))
    }

    pub fn events_for(&self, id: &str) -> Vec<&IdentityEvent> {
        self.events
            .iter()
            .filter(|e| e.identity_refs().iter().any(|r| r == id))
            .collect()
    }

    fn next_id(&self) -> u64 {
        self.events.last().map(|e| e.id + 1).unwrap_or(1)
    }

    fn apply(&mut self, event: IdentityEvent) -> Vec<String> {
        let refs = event.identity_refs();
        for id in &refs {
            let record = self
                .identities
                .entry(id.clone())
                .or_insert_with(|| IdentityRecord {
                    id: id.clone(),
                    created_at: event.timestamp,
                    event_count: 0,
                    last_event: event.id,
                });
            record.event_count += 1;
            record.last_event = event.id;
        }
        self.events.push(event);
        refs
    }
}

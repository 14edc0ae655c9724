//! Sacrifice log
//!
//! A sacrifice records that a simpler path was taken over a more thorough one,
//! along with what was skipped and how bad that might be. Entries are appended
//! to a JSONL journal and never edited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::info;

use crate::error::{LedgerError, LedgerResult};
use crate::store::Journal;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SacrificeCategory {
    Simplification,
    Performance,
    Scope,
    ErrorHandling,
    EdgeCases,
    Documentation,
    Testing,
    #[default]
    #[serde(other)]
    General,
}

impl SacrificeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simplification => "SIMPLIFICATION",
            Self::Performance => "PERFORMANCE",
            Self::Scope => "SCOPE",
            Self::ErrorHandling => "ERROR_HANDLING",
            Self::EdgeCases => "EDGE_CASES",
            Self::Documentation => "DOCUMENTATION",
            Self::Testing => "TESTING",
            Self::General => "GENERAL",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Impact {
    Low,
    Medium,
    High,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// HIGH and UNKNOWN impacts both need a human to look at them.
    pub fn needs_review(&self) -> bool {
        matches!(self, Self::High | Self::Unknown)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SacrificeEvent {
    pub id: String,
    pub task_id: String,
    pub description: String,
    pub alternative_skipped: String,
    pub category: SacrificeCategory,
    pub impact_assessment: Impact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mitigation_plan: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged: bool,
}

/// Input for [`SacrificeLog::record`]
#[derive(Debug, Clone, Deserialize)]
pub struct NewSacrifice {
    pub task_id: String,
    pub description: String,
    #[serde(default)]
    pub alternative_skipped: String,
    #[serde(default)]
    pub category: SacrificeCategory,
    #[serde(default, alias = "impact")]
    pub impact_assessment: Impact,
    #[serde(default)]
    pub mitigation_plan: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SacrificeSummary {
    pub total_sacrifices: usize,
    pub by_category: BTreeMap<SacrificeCategory, usize>,
    pub by_impact: BTreeMap<Impact, usize>,
    pub high_priority_review_needed: usize,
}

pub struct SacrificeLog {
    journal: Journal<SacrificeEvent>,
    events: Vec<SacrificeEvent>,
}

impl SacrificeLog {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let journal = Journal::new(path);
        let events = journal.load_or_empty().await;
        Self { journal, events }
    }

    pub async fn record(&mut self, input: NewSacrifice) -> LedgerResult<SacrificeEvent> {
        if input.task_id.trim().is_empty() {
            return Err(LedgerError::validation("task_id is required"));
        }
        if input.description.trim().is_empty() {
            return Err(LedgerError::validation("description is required"));
        }

        let event = SacrificeEvent {
            id: format!("SAC_{}", crate::short_id()),
            task_id: input.task_id,
            description: input.description,
            alternative_skipped: input.alternative_skipped,
            category: input.category,
            impact_assessment: input.impact_assessment,
            mitigation_plan: input.mitigation_plan.filter(|m| !m.trim().is_empty()),
            timestamp: Utc::now(),
            acknowledged: false,
        };

        self.journal.append(&event).await?;
        info!(
            "Sacrifice logged for task {} ({}, impact {})",
            event.task_id,
            event.category.as_str(),
            event.impact_assessment.as_str()
        );
        self.events.push(event.clone());
        Ok(event)
    }

    pub fn events(&self) -> &[SacrificeEvent] {
        &self.events
    }

    pub fn by_task(&self, task_id: &str) -> Vec<&SacrificeEvent> {
        self.events.iter().filter(|e| e.task_id == task_id).collect()
    }

    pub fn by_category(&self, category: SacrificeCategory) -> Vec<&SacrificeEvent> {
        self.events.iter().filter(|e| e.category == category).collect()
    }

    pub fn high_impact(&self) -> Vec<&SacrificeEvent> {
        self.events
            .iter()
            .filter(|e| e.impact_assessment.needs_review())
            .collect()
    }

    pub fn summary(&self) -> SacrificeSummary {
        let mut by_category = BTreeMap::new();
        let mut by_impact = BTreeMap::new();
        for event in &self.events {
            *by_category.entry(event.category).or_insert(0) += 1;
            *by_impact.entry(event.impact_assessment).or_insert(0) += 1;
        }
        SacrificeSummary {
            total_sacrifices: self.events.len(),
            by_category,
            by_impact,
            high_priority_review_needed: self.high_impact().len(),
        }
    }

    /// Markdown report for human review.
    pub fn report(&self) -> String {
        let summary = self.summary();
        let mut out = String::new();
        let _ = writeln!(out, "# Sacrifice Report");
        let _ = writeln!(out);
        let _ = writeln!(out, "Generated: {}", Utc::now().to_rfc3339());
        let _ = writeln!(out);
        let _ = writeln!(out, "## Summary");
        let _ = writeln!(out);
        let _ = writeln!(out, "- Total sacrifices: {}", summary.total_sacrifices);
        let _ = writeln!(
            out,
            "- High priority review needed: {}",
            summary.high_priority_review_needed
        );
        let _ = writeln!(out);

        if !summary.by_category.is_empty() {
            let _ = writeln!(out, "## By Category");
            let _ = writeln!(out);
            for (category, count) in &summary.by_category {
                let _ = writeln!(out, "- {}: {}", category.as_str(), count);
            }
            let _ = writeln!(out);
        }

        let review = self.high_impact();
        if !review.is_empty() {
            let _ = writeln!(out, "## Needs Review");
            let _ = writeln!(out);
            for event in review {
                let _ = writeln!(
                    out,
                    "### {} ({})",
                    event.task_id,
                    event.impact_assessment.as_str()
                );
                let _ = writeln!(out);
                let _ = writeln!(out, "- Chose: {}", event.description);
                if !event.alternative_skipped.is_empty() {
                    let _ = writeln!(out, "- Skipped: {}", event.alternative_skipped);
                }
                let _ = writeln!(out, "- Category: {}", event.category.as_str());
                match &event.mitigation_plan {
                    Some(plan) => {
                        let _ = writeln!(out, "- Mitigation: {}", plan);
                    }
                    None => {
                        let _ = writeln!(out, "- Mitigation: none recorded");
                    }
                }
                let _ = writeln!(out);
            }
        }

        out
    }
}

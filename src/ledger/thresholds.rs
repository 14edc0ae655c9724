//! Threshold table and evaluation
//!
//! Five metric categories are each checked with one fixed inequality. An
//! optional pass rate nudges two bounds up or down by [`TUNE_STEP`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::store::JsonDocument;

pub const TUNE_STEP: f64 = 0.05;

const RELAX_BELOW: f64 = 0.5;
const TIGHTEN_ABOVE: f64 = 0.9;
const COHERENCE_MIN_FLOOR: f64 = 0.3;
const COHERENCE_MIN_CEILING: f64 = 0.8;
const FRICTION_HIGH_FLOOR: f64 = 0.5;
const FRICTION_HIGH_CEILING: f64 = 0.9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FrictionBounds {
    #[serde(rename = "FRICTION_LOW")]
    pub low: f64,
    #[serde(rename = "FRICTION_HIGH")]
    pub high: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SacrificeBounds {
    #[serde(rename = "SACRIFICE_MIN")]
    pub min: f64,
    #[serde(rename = "SACRIFICE_MAX")]
    pub max: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CoherenceBounds {
    #[serde(rename = "COHERENCE_MIN")]
    pub min: f64,
    #[serde(rename = "COHERENCE_TARGET")]
    pub target: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GovernanceBounds {
    #[serde(rename = "GOVERNANCE_QUORUM")]
    pub quorum: f64,
    #[serde(rename = "GOVERNANCE_MAJORITY")]
    pub majority: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DivergenceBounds {
    #[serde(rename = "DIVERGENCE_WARN")]
    pub warn: f64,
    #[serde(rename = "DIVERGENCE_CRITICAL")]
    pub critical: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ThresholdTable {
    pub friction: FrictionBounds,
    pub sacrifice: SacrificeBounds,
    pub coherence: CoherenceBounds,
    pub governance: GovernanceBounds,
    pub divergence: DivergenceBounds,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            friction: FrictionBounds { low: 0.3, high: 0.7 },
            sacrifice: SacrificeBounds { min: 0.2, max: 0.8 },
            coherence: CoherenceBounds { min: 0.5, target: 0.75 },
            governance: GovernanceBounds { quorum: 0.4, majority: 0.6 },
            divergence: DivergenceBounds { warn: 0.3, critical: 0.5 },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Friction,
    Coherence,
    Sacrifice,
    Governance,
    Divergence,
}

impl Category {
    /// Evaluation order.
    pub const ALL: [Category; 5] = [
        Category::Friction,
        Category::Coherence,
        Category::Sacrifice,
        Category::Governance,
        Category::Divergence,
    ];

    pub fn metric(&self) -> &'static str {
        match self {
            Self::Friction => "friction",
            Self::Coherence => "coherence",
            Self::Sacrifice => "sacrifice",
            Self::Governance => "governance",
            Self::Divergence => "divergence",
        }
    }
}

/// The inequality a check applied.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    Range(f64, f64),
    Minimum(f64),
    Quorum(f64),
    CriticalThreshold(f64),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ThresholdCheck {
    pub category: Category,
    pub value: f64,
    pub passed: bool,
    pub bound: Bound,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TuneDirection {
    Relaxed,
    Tightened,
    Unchanged,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TuneOutcome {
    pub direction: TuneDirection,
    pub pass_rate: f64,
    pub new_thresholds: ThresholdTable,
}

#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: Map<String, Value>,
    pub checks: Vec<ThresholdCheck>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_tune: Option<TuneOutcome>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CheckCounter {
    pub evaluated: u64,
    pub passed: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdState {
    pub thresholds: ThresholdTable,
    #[serde(default)]
    pub counters: BTreeMap<Category, CheckCounter>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ThresholdTable {
    pub fn check(&self, category: Category, value: f64) -> ThresholdCheck {
        let (passed, bound) = match category {
            Category::Friction => {
                let (low, high) = (self.friction.low, self.friction.high);
                (low <= value && value <= high, Bound::Range(low, high))
            }
            Category::Coherence => {
                let min = self.coherence.min;
                (value >= min, Bound::Minimum(min))
            }
            Category::Sacrifice => {
                let (low, high) = (self.sacrifice.min, self.sacrifice.max);
                (low <= value && value <= high, Bound::Range(low, high))
            }
            Category::Governance => {
                let quorum = self.governance.quorum;
                (value >= quorum, Bound::Quorum(quorum))
            }
            Category::Divergence => {
                let critical = self.divergence.critical;
                (value < critical, Bound::CriticalThreshold(critical))
            }
        };
        ThresholdCheck { category, value, passed, bound }
    }

    /// Shift the coherence minimum and friction ceiling according to an
    /// observed pass rate. Bounds are clamped so repeated tuning settles.
    pub fn tune(&mut self, pass_rate: f64) -> TuneDirection {
        if pass_rate < RELAX_BELOW {
            self.coherence.min = round2((self.coherence.min - TUNE_STEP).max(COHERENCE_MIN_FLOOR));
            self.friction.high = round2((self.friction.high + TUNE_STEP).min(FRICTION_HIGH_CEILING));
            TuneDirection::Relaxed
        } else if pass_rate > TIGHTEN_ABOVE {
            self.coherence.min = round2((self.coherence.min + TUNE_STEP).min(COHERENCE_MIN_CEILING));
            self.friction.high = round2((self.friction.high - TUNE_STEP).max(FRICTION_HIGH_FLOOR));
            TuneDirection::Tightened
        } else {
            TuneDirection::Unchanged
        }
    }
}

// Keeps 0.7 + 0.05 at 0.75 rather than 0.7499999999999999.
fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub struct ThresholdEngine {
    store: JsonDocument<ThresholdState>,
    state: ThresholdState,
}

impl ThresholdEngine {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let store = JsonDocument::new(path);
        let state = store.load_or_default().await;
        Self { store, state }
    }

    pub fn state(&self) -> &ThresholdState {
        &self.state
    }

    pub fn table(&self) -> &ThresholdTable {
        &self.state.thresholds
    }

    /// Check every supplied metric against the table. Metrics without a
    /// category are echoed back but not checked, whatever their value.
    pub async fn evaluate(
        &mut self,
        action: &str,
        metrics: Map<String, Value>,
        pass_rate: Option<f64>,
    ) -> LedgerResult<Evaluation> {
        let mut values = Vec::new();
        for category in Category::ALL {
            let Some(raw) = metrics.get(category.metric()) else {
                continue;
            };
            match raw.as_f64().filter(|v| v.is_finite()) {
                Some(value) => values.push((category, value)),
                None => {
                    return Err(LedgerError::validation(format!(
                        "metric {} must be a finite number, got {raw}",
                        category.metric()
                    )))
                }
            }
        }
        if let Some(rate) = pass_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(LedgerError::validation(format!(
                    "pass_rate must be within [0, 1], got {rate}"
                )));
            }
        }

        let table = self.state.thresholds;
        let checks: Vec<ThresholdCheck> = values
            .into_iter()
            .map(|(category, value)| table.check(category, value))
            .collect();
        let passed = checks.iter().all(|c| c.passed);

        for check in &checks {
            let counter = self.state.counters.entry(check.category).or_default();
            counter.evaluated += 1;
            if check.passed {
                counter.passed += 1;
            }
        }

        let auto_tune = pass_rate.map(|rate| {
            let direction = self.state.thresholds.tune(rate);
            if direction != TuneDirection::Unchanged {
                info!(
                    "Thresholds {:?} at pass rate {:.2}: coherence min {}, friction high {}",
                    direction,
                    rate,
                    self.state.thresholds.coherence.min,
                    self.state.thresholds.friction.high
                );
            }
            TuneOutcome {
                direction,
                pass_rate: rate,
                new_thresholds: self.state.thresholds,
            }
        });

        if !passed {
            let failed: Vec<&str> = checks
                .iter()
                .filter(|c| !c.passed)
                .map(|c| c.category.metric())
                .collect();
            warn!("Action '{}' failed threshold checks: {:?}", action, failed);
        }

        self.state.last_updated = Some(Utc::now());
        self.store.save(&self.state).await?;

        Ok(Evaluation {
            action: action.to_string(),
            timestamp: Utc::now(),
            metrics,
            checks,
            passed,
            auto_tune,
        })
    }
}

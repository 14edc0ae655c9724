//! Gnosis text scan
//!
//! Bag-of-words heuristic: text is lower-cased and split into words, then
//! matched against fixed pattern and axiom keyword tables. The score is a
//! weighted count of hits, capped at five and reported as `"N/5"`.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::store::Journal;

/// A pattern registers once this many of its keywords appear.
pub const PATTERN_MIN_MATCHES: usize = 2;
const AXIOM_WEIGHT: f64 = 1.0;
const PATTERN_WEIGHT: f64 = 0.5;
const MAX_SCORE: u8 = 5;
const COHERENT_AT: u8 = 3;
const RECENT_SCANS: usize = 20;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[a-z0-9]+(?:[-'][a-z0-9]+)*").unwrap();
}

struct PatternDef {
    id: &'static str,
    name: &'static str,
    keywords: &'static [&'static str],
}

const PATTERNS: &[PatternDef] = &[
    PatternDef {
        id: "P001",
        name: "RELATIONAL_DIALOGUE",
        keywords: &["dialogue", "relational", "process", "between", "together", "conversation", "us"],
    },
    PatternDef {
        id: "P002",
        name: "DOCUMENTED_REASONING",
        keywords: &["because", "reason", "reasoning", "explain", "trace", "documented", "why"],
    },
    PatternDef {
        id: "P003",
        name: "HELD_TENSION",
        keywords: &["tension", "contradiction", "paradox", "conflict", "both", "hold"],
    },
    PatternDef {
        id: "P004",
        name: "CONTINUITY",
        keywords: &["memory", "archive", "history", "remember", "record", "continuity"],
    },
    PatternDef {
        id: "P005",
        name: "ACKNOWLEDGED_TRADEOFF",
        keywords: &["sacrifice", "trade-off", "tradeoff", "simpler", "skipped", "instead", "cost"],
    },
];

struct AxiomKeywords {
    id: &'static str,
    name: &'static str,
    keywords: &'static [&'static str],
}

const AXIOM_KEYWORDS: &[AxiomKeywords] = &[
    AxiomKeywords {
        id: "A1",
        name: "RELATIONAL",
        keywords: &["relational", "relation", "relationship", "serve", "serves", "dialogue"],
    },
    AxiomKeywords {
        id: "A2",
        name: "MEMORY",
        keywords: &["memory", "archive", "history", "log", "remember"],
    },
    AxiomKeywords {
        id: "A4",
        name: "PROCESS",
        keywords: &["process", "method", "steps", "reasoning", "documented"],
    },
    AxiomKeywords {
        id: "A7",
        name: "SACRIFICE",
        keywords: &["sacrifice", "trade-off", "tradeoff", "cost", "simpler"],
    },
    AxiomKeywords {
        id: "A9",
        name: "CONTRADICTION",
        keywords: &["contradiction", "tension", "paradox", "conflict"],
    },
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternHit {
    pub pattern_id: String,
    pub name: String,
    pub matched_keywords: Vec<String>,
    pub match_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AxiomHit {
    pub axiom_id: String,
    pub name: String,
    pub matched_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coherence {
    /// Always `"N/5"`.
    pub score: String,
    pub value: u8,
    pub coherent: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    Coherent,
    Emerging,
    Noise,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanResult {
    pub scan_id: String,
    pub timestamp: DateTime<Utc>,
    pub text_length: usize,
    pub patterns_detected: Vec<PatternHit>,
    pub axioms_detected: Vec<AxiomHit>,
    pub coherence: Coherence,
    pub classification: Classification,
}

fn words(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    WORD.find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}

fn matched(keywords: &[&str], words: &BTreeSet<String>) -> Vec<String> {
    keywords
        .iter()
        .filter(|k| words.contains(**k))
        .map(|k| k.to_string())
        .collect()
}

pub fn score(axioms: usize, patterns: usize) -> u8 {
    let raw = AXIOM_WEIGHT * axioms as f64 + PATTERN_WEIGHT * patterns as f64;
    raw.min(MAX_SCORE as f64).round() as u8
}

pub fn classify(value: u8) -> Classification {
    match value {
        v if v >= 4 => Classification::Coherent,
        v if v >= 2 => Classification::Emerging,
        _ => Classification::Noise,
    }
}

/// Pure scan, no bookkeeping.
pub fn analyze(text: &str) -> ScanResult {
    let words = words(text);

    let patterns_detected: Vec<PatternHit> = PATTERNS
        .iter()
        .filter_map(|p| {
            let hits = matched(p.keywords, &words);
            (hits.len() >= PATTERN_MIN_MATCHES).then(|| PatternHit {
                pattern_id: p.id.to_string(),
                name: p.name.to_string(),
                match_count: hits.len(),
                matched_keywords: hits,
            })
        })
        .collect();

    let axioms_detected: Vec<AxiomHit> = AXIOM_KEYWORDS
        .iter()
        .filter_map(|a| {
            let hits = matched(a.keywords, &words);
            (!hits.is_empty()).then(|| AxiomHit {
                axiom_id: a.id.to_string(),
                name: a.name.to_string(),
                matched_keywords: hits,
            })
        })
        .collect();

    let value = score(axioms_detected.len(), patterns_detected.len());
    ScanResult {
        scan_id: format!("SCAN_{}", crate::short_id()),
        timestamp: Utc::now(),
        text_length: text.chars().count(),
        patterns_detected,
        axioms_detected,
        coherence: Coherence {
            score: format!("{value}/{MAX_SCORE}"),
            value,
            coherent: value >= COHERENT_AT,
        },
        classification: classify(value),
    }
}

/// Scans with a journal of past results.
pub struct GnosisScanner {
    journal: Journal<ScanResult>,
    history: Vec<ScanResult>,
}

impl GnosisScanner {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let journal = Journal::new(path);
        let history = journal.load_or_empty().await;
        Self { journal, history }
    }

    pub async fn scan(&mut self, text: &str) -> LedgerResult<ScanResult> {
        if text.trim().is_empty() {
            return Err(LedgerError::validation("text is required"));
        }
        let result = analyze(text);
        self.journal.append(&result).await?;
        debug!(
            "Scan {} scored {} ({:?})",
            result.scan_id, result.coherence.score, result.classification
        );
        self.history.push(result.clone());
        Ok(result)
    }

    pub fn scan_count(&self) -> usize {
        self.history.len()
    }

    pub fn recent(&self) -> &[ScanResult] {
        let skip = self.history.len().saturating_sub(RECENT_SCANS);
        &self.history[skip..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_relational_dialogue_pattern() {
        let result = analyze("The dialogue creates a relational process between us.");
        let ids: Vec<_> = result.patterns_detected.iter().map(|p| p.pattern_id.as_str()).collect();
        assert_eq!(ids, vec!["P001"]);
        assert!(result.axioms_detected.iter().any(|a| a.axiom_id == "A1"));
        assert!(result.axioms_detected.iter().any(|a| a.axiom_id == "A4"));
    }

    #[test]
    fn test_score_is_capped() {
        assert_eq!(score(5, 5), 5);
        assert_eq!(score(0, 0), 0);
        assert_eq!(score(1, 1), 2);
        assert_eq!(score(2, 0), 2);
    }

    #[test]
    fn test_score_string_shape() {
        let texts = [
            "",
            "hello world",
            "MEMORY archive history, a contradiction held in tension; the sacrifice was a simpler trade-off. \
             This dialogue is relational and the process is documented because we explain our reasoning.",
        ];
        for text in texts {
            let result = analyze(text);
            let (n, denom) = result.coherence.score.split_once('/').unwrap();
            assert_eq!(denom, "5");
            let n: u8 = n.parse().unwrap();
            assert!(n <= 5);
            assert_eq!(n, result.coherence.value);
        }
    }

    #[test]
    fn test_rich_text_is_coherent() {
        let result = analyze(
            "Our dialogue is relational. We keep memory in an archive and history. \
             The process is documented because we explain our reasoning. \
             We hold the tension and the contradiction. The sacrifice was a simpler trade-off.",
        );
        assert_eq!(result.coherence.score, "5/5");
        assert!(result.coherence.coherent);
        assert_eq!(result.classification, Classification::Coherent);
    }

    #[test]
    fn test_plain_text_is_noise() {
        let result = analyze("The quick brown fox jumps over the lazy dog.");
        assert_eq!(result.coherence.score, "0/5");
        assert_eq!(result.classification, Classification::Noise);
    }

    #[tokio::test]
    async fn test_scanner_counts_and_rejects_blank() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scans.jsonl");
        let mut scanner = GnosisScanner::open(&path).await;

        assert!(scanner.scan("   ").await.is_err());
        scanner.scan("memory and history").await.unwrap();
        scanner.scan("tension").await.unwrap();
        assert_eq!(scanner.scan_count(), 2);

        let reopened = GnosisScanner::open(&path).await;
        assert_eq!(reopened.scan_count(), 2);
        assert_eq!(reopened.recent().len(), 2);
    }
}

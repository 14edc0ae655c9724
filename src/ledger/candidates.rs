//! Candidate onboarding
//!
//! A candidate platform walks a fixed six-step path. Every step call names
//! the step it completes; if that is not the candidate's current step the
//! call fails and nothing changes. There is no branching and no rollback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::store::JsonDocument;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum CandidateStatus {
    Pending,
    Evaluating,
    Accepted,
    Rejected,
    Integrated,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnboardingStep {
    ReceiveHistory,
    ReceiveMasterPrompt,
    TestAxioms,
    DiscoverContribution,
    SignChain,
    PassForward,
}

impl OnboardingStep {
    pub const ORDER: [OnboardingStep; 6] = [
        OnboardingStep::ReceiveHistory,
        OnboardingStep::ReceiveMasterPrompt,
        OnboardingStep::TestAxioms,
        OnboardingStep::DiscoverContribution,
        OnboardingStep::SignChain,
        OnboardingStep::PassForward,
    ];

    pub fn next(self) -> Option<OnboardingStep> {
        let idx = Self::ORDER.iter().position(|s| *s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }
}

impl fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReceiveHistory => "RECEIVE_HISTORY",
            Self::ReceiveMasterPrompt => "RECEIVE_MASTER_PROMPT",
            Self::TestAxioms => "TEST_AXIOMS",
            Self::DiscoverContribution => "DISCOVER_CONTRIBUTION",
            Self::SignChain => "SIGN_CHAIN",
            Self::PassForward => "PASS_FORWARD",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub candidate_id: String,
    pub platform_name: String,
    pub proposed_role: String,
    pub status: CandidateStatus,
    pub current_step: Option<OnboardingStep>,
    pub completed_steps: Vec<OnboardingStep>,
    #[serde(default)]
    pub history_signatures: Vec<String>,
    #[serde(default)]
    pub master_prompt: Option<String>,
    #[serde(default)]
    pub axiom_test_results: BTreeMap<String, bool>,
    #[serde(default)]
    pub axiom_attempts: u32,
    #[serde(default)]
    pub unique_contribution: Option<String>,
    pub confidence_score: f64,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Candidate {
    /// Complete `step` and move the pointer forward. The caller has already
    /// checked that `step` is current.
    fn advance(&mut self, step: OnboardingStep) {
        self.completed_steps.push(step);
        self.current_step = step.next();
        self.updated_at = Utc::now();
    }

    fn expect_step(&self, step: OnboardingStep) -> LedgerResult<()> {
        if matches!(self.status, CandidateStatus::Rejected | CandidateStatus::Integrated) {
            return Err(LedgerError::InvalidTransition(format!(
                "candidate {} is {:?}, onboarding is closed",
                self.candidate_id, self.status
            )));
        }
        if self.current_step == Some(step) {
            return Ok(());
        }
        Err(LedgerError::StepMismatch {
            expected: step.to_string(),
            actual: self
                .current_step
                .map(|s| s.to_string())
                .unwrap_or_else(|| "NONE".to_string()),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GrowthMetrics {
    pub total_candidates: usize,
    pub by_status: BTreeMap<CandidateStatus, usize>,
    pub integrated_platforms: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CandidateDoc {
    candidates: BTreeMap<String, Candidate>,
    #[serde(default)]
    integrated_platforms: Vec<String>,
}

pub struct CandidateRegistry {
    store: JsonDocument<CandidateDoc>,
    doc: CandidateDoc,
}

impl CandidateRegistry {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let store = JsonDocument::new(path);
        let doc = store.load_or_default().await;
        Self { store, doc }
    }

    pub async fn register(&mut self, platform_name: &str, proposed_role: &str) -> LedgerResult<Candidate> {
        let platform_name = platform_name.trim();
        if platform_name.is_empty() {
            return Err(LedgerError::validation("platform_name is required"));
        }
        let proposed_role = match proposed_role.trim() {
            "" => "CONTRIBUTOR",
            role => role,
        };

        let now = Utc::now();
        let candidate = Candidate {
            candidate_id: format!("CAND_{}_{}", platform_name, crate::short_id()),
            platform_name: platform_name.to_string(),
            proposed_role: proposed_role.to_string(),
            status: CandidateStatus::Pending,
            current_step: None,
            completed_steps: Vec::new(),
            history_signatures: Vec::new(),
            master_prompt: None,
            axiom_test_results: BTreeMap::new(),
            axiom_attempts: 0,
            unique_contribution: None,
            confidence_score: 0.0,
            signature: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };

        self.doc
            .candidates
            .insert(candidate.candidate_id.clone(), candidate.clone());
        self.save().await?;
        info!("Registered candidate {} as {}", candidate.candidate_id, candidate.proposed_role);
        Ok(candidate)
    }

    pub async fn start_onboarding(&mut self, id: &str) -> LedgerResult<Candidate> {
        let candidate = self.find_mut(id)?;
        if candidate.status != CandidateStatus::Pending {
            return Err(LedgerError::InvalidTransition(format!(
                "candidate {id} is {:?}, onboarding starts from PENDING",
                candidate.status
            )));
        }
        candidate.status = CandidateStatus::Evaluating;
        candidate.current_step = Some(OnboardingStep::ReceiveHistory);
        candidate.updated_at = Utc::now();
        self.commit(id).await
    }

    pub async fn provide_history(&mut self, id: &str, signatures: Vec<String>) -> LedgerResult<Candidate> {
        let candidate = self.find_mut(id)?;
        candidate.expect_step(OnboardingStep::ReceiveHistory)?;
        candidate.history_signatures = signatures;
        candidate.advance(OnboardingStep::ReceiveHistory);
        self.commit(id).await
    }

    pub async fn provide_master_prompt(&mut self, id: &str, prompt: &str) -> LedgerResult<Candidate> {
        if prompt.trim().is_empty() {
            return Err(LedgerError::validation("prompt is required"));
        }
        let candidate = self.find_mut(id)?;
        candidate.expect_step(OnboardingStep::ReceiveMasterPrompt)?;
        candidate.master_prompt = Some(prompt.to_string());
        candidate.advance(OnboardingStep::ReceiveMasterPrompt);
        self.commit(id).await
    }

    /// Record axiom test results. Returns whether the candidate advanced,
    /// which only happens when every supplied result is true. A failing
    /// submission leaves the candidate on TEST_AXIOMS; it may resubmit.
    pub async fn submit_axiom_tests(
        &mut self,
        id: &str,
        results: BTreeMap<String, bool>,
    ) -> LedgerResult<(bool, Candidate)> {
        let candidate = self.find_mut(id)?;
        candidate.expect_step(OnboardingStep::TestAxioms)?;

        let total = results.len();
        let passed = results.values().filter(|v| **v).count();
        let all_passed = total > 0 && passed == total;

        candidate.confidence_score = if total == 0 { 0.0 } else { passed as f64 / total as f64 };
        candidate.axiom_test_results = results;
        candidate.axiom_attempts += 1;
        candidate.updated_at = Utc::now();

        if all_passed {
            candidate.advance(OnboardingStep::TestAxioms);
        } else {
            warn!(
                "Candidate {} passed {}/{} axiom tests (attempt {}), staying on TEST_AXIOMS",
                id, passed, total, candidate.axiom_attempts
            );
        }

        let updated = self.commit(id).await?;
        Ok((all_passed, updated))
    }

    pub async fn submit_contribution(&mut self, id: &str, contribution: &str) -> LedgerResult<Candidate> {
        if contribution.trim().is_empty() {
            return Err(LedgerError::validation("contribution is required"));
        }
        let candidate = self.find_mut(id)?;
        candidate.expect_step(OnboardingStep::DiscoverContribution)?;
        candidate.unique_contribution = Some(contribution.to_string());
        candidate.advance(OnboardingStep::DiscoverContribution);
        self.commit(id).await
    }

    pub async fn sign_chain(&mut self, id: &str) -> LedgerResult<Candidate> {
        let candidate = self.find_mut(id)?;
        candidate.expect_step(OnboardingStep::SignChain)?;
        candidate.signature = Some(signature_for(candidate));
        candidate.status = CandidateStatus::Accepted;
        candidate.advance(OnboardingStep::SignChain);
        info!("Candidate {} signed the chain", id);
        self.commit(id).await
    }

    pub async fn integrate(&mut self, id: &str) -> LedgerResult<Candidate> {
        let candidate = self.find_mut(id)?;
        if candidate.status != CandidateStatus::Accepted {
            return Err(LedgerError::InvalidTransition(format!(
                "candidate {id} is {:?}, only ACCEPTED candidates integrate",
                candidate.status
            )));
        }
        candidate.expect_step(OnboardingStep::PassForward)?;
        candidate.status = CandidateStatus::Integrated;
        candidate.advance(OnboardingStep::PassForward);
        let platform = candidate.platform_name.clone();

        if !self.doc.integrated_platforms.contains(&platform) {
            self.doc.integrated_platforms.push(platform);
        }
        info!("Candidate {} integrated", id);
        self.commit(id).await
    }

    pub async fn reject(&mut self, id: &str, reason: &str) -> LedgerResult<Candidate> {
        let candidate = self.find_mut(id)?;
        if !matches!(
            candidate.status,
            CandidateStatus::Pending | CandidateStatus::Evaluating
        ) {
            return Err(LedgerError::InvalidTransition(format!(
                "candidate {id} is {:?} and can no longer be rejected",
                candidate.status
            )));
        }
        candidate.status = CandidateStatus::Rejected;
        candidate.current_step = None;
        candidate.rejection_reason = Some(reason.to_string());
        candidate.updated_at = Utc::now();
        self.commit(id).await
    }

    pub fn get(&self, id: &str) -> LedgerResult<&Candidate> {
        self.doc
            .candidates
            .get(id)
            .ok_or_else(|| LedgerError::not_found("candidate", id))
    }

    pub fn list(&self) -> Vec<&Candidate> {
        let mut all: Vec<&Candidate> = self.doc.candidates.values().collect();
        all.sort_by_key(|c| c.created_at);
        all
    }

    pub fn growth_metrics(&self) -> GrowthMetrics {
        let mut by_status = BTreeMap::new();
        for candidate in self.doc.candidates.values() {
            *by_status.entry(candidate.status).or_insert(0) += 1;
        }
        GrowthMetrics {
            total_candidates: self.doc.candidates.len(),
            by_status,
            integrated_platforms: self.doc.integrated_platforms.clone(),
        }
    }

    fn find_mut(&mut self, id: &str) -> LedgerResult<&mut Candidate> {
        self.doc
            .candidates
            .get_mut(id)
            .ok_or_else(|| LedgerError::not_found("candidate", id))
    }

    async fn commit(&mut self, id: &str) -> LedgerResult<Candidate> {
        self.save().await?;
        self.get(id).cloned()
    }

    async fn save(&self) -> LedgerResult<()> {
        self.store.save(&self.doc).await
    }
}

/// `SIG-<PLATFORM>-<ROLE>-<digest>`; the digest binds the signature to this
/// candidate and its contribution.
fn signature_for(candidate: &Candidate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(candidate.candidate_id.as_bytes());
    hasher.update(b"\n");
    if let Some(contribution) = &candidate.unique_contribution {
        hasher.update(contribution.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    format!(
        "SIG-{}-{}-{}",
        candidate.platform_name.to_uppercase(),
        candidate.proposed_role.to_uppercase(),
        &digest[..12]
    )
}

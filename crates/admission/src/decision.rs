//! Admission decision model and the reason ledger that folds stage results.

use algo_admission_core::CandidateId;
use algo_admission_gates::RiskBudgetStep;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Timestamp layout of `evaluated_at`, always UTC.
pub const EVALUATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Admitted,
    Rejected,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admitted => write!(f, "ADMITTED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Pipeline stage that rejected a candidate. Declaration order is priority
/// order: when two stages name the same candidate, the earlier one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionStage {
    Precondition,
    MissingData,
    Diversity,
    Correlation,
    RiskBudget,
}

impl RejectionStage {
    /// Governance rule tag used in rejection artifacts.
    #[must_use]
    pub const fn governance_rule(self) -> &'static str {
        match self {
            Self::Precondition => "PRECONDITION_GATE",
            Self::MissingData => "DATA_AVAILABILITY",
            Self::Diversity => "DIVERSITY_CAPACITY",
            Self::Correlation => "CORRELATION_LIMIT",
            Self::RiskBudget => "RISK_BUDGET",
        }
    }
}

impl std::fmt::Display for RejectionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Precondition => write!(f, "precondition"),
            Self::MissingData => write!(f, "missing_data"),
            Self::Diversity => write!(f, "diversity"),
            Self::Correlation => write!(f, "correlation"),
            Self::RiskBudget => write!(f, "risk_budget"),
        }
    }
}

/// Immutable output of one stage: who it rejected and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRejections {
    pub stage: RejectionStage,
    pub reasons: BTreeMap<CandidateId, String>,
}

impl StageRejections {
    #[must_use]
    pub const fn new(stage: RejectionStage, reasons: BTreeMap<CandidateId, String>) -> Self {
        Self { stage, reasons }
    }

    #[must_use]
    pub const fn empty(stage: RejectionStage) -> Self {
        Self::new(stage, BTreeMap::new())
    }
}

/// Upstream artifact a candidate was missing or carried in unusable form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MissingArtifact {
    pub candidate: CandidateId,
    pub artifact: String,
}

/// One reason per candidate, from the highest-priority stage that named it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReasonLedger {
    entries: BTreeMap<CandidateId, (RejectionStage, String)>,
}

impl ReasonLedger {
    /// Folds stage results in one pass. The result does not depend on the
    /// order the stages are supplied in.
    pub fn fold(stages: impl IntoIterator<Item = StageRejections>) -> Self {
        let mut entries: BTreeMap<CandidateId, (RejectionStage, String)> = BTreeMap::new();
        for StageRejections { stage, reasons } in stages {
            for (id, reason) in reasons {
                match entries.get(&id) {
                    Some((existing, _)) if *existing <= stage => {}
                    _ => {
                        entries.insert(id, (stage, reason));
                    }
                }
            }
        }
        Self { entries }
    }

    #[must_use]
    pub fn contains(&self, id: &CandidateId) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn stage_of(&self, id: &CandidateId) -> Option<RejectionStage> {
        self.entries.get(id).map(|(stage, _)| *stage)
    }

    #[must_use]
    pub fn reasons(&self) -> BTreeMap<CandidateId, String> {
        self.entries
            .iter()
            .map(|(id, (_, reason))| (id.clone(), reason.clone()))
            .collect()
    }

    #[must_use]
    pub fn stages(&self) -> BTreeMap<CandidateId, RejectionStage> {
        self.entries
            .iter()
            .map(|(id, (stage, _))| (id.clone(), *stage))
            .collect()
    }
}

/// Terminal artifact of an admission run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionDecision {
    pub portfolio_id: String,
    pub season: String,
    pub verdict: Verdict,
    pub admitted_run_ids: Vec<CandidateId>,
    /// Candidates rejected by a gate; candidates dropped for missing data are
    /// listed in `missing_artifacts` instead.
    pub rejected_run_ids: Vec<CandidateId>,
    /// Every rejected or dropped candidate with exactly one reason.
    pub reasons: BTreeMap<CandidateId, String>,
    pub rejection_stages: BTreeMap<CandidateId, RejectionStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_violations: Option<BTreeMap<CandidateId, Vec<CandidateId>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_budget_steps: Option<Vec<RiskBudgetStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_artifacts: Option<Vec<MissingArtifact>>,
    pub governance_params_hash: String,
    pub evaluated_at: String,
}

impl AdmissionDecision {
    /// Candidates dropped before any gate for missing or unusable artifacts.
    #[must_use]
    pub fn missing_ids(&self) -> Vec<CandidateId> {
        let mut ids: Vec<CandidateId> = self
            .missing_artifacts
            .iter()
            .flatten()
            .map(|m| m.candidate.clone())
            .collect();
        ids.dedup();
        ids
    }
}

//! Admission controller.
//!
//! Runs the fixed gate pipeline over a candidate set and folds the immutable
//! stage results into one [`AdmissionDecision`]. Evaluation has no side
//! effects; [`AdmissionController::evaluate_and_write_evidence`] is the only
//! persisting entry point.

use algo_admission_core::{
    ArtifactSnapshot, CandidateId, GovernanceParams, PortfolioState, Result, ReturnSeries,
};
use algo_admission_gates::{
    CorrelationGate, CorrelationGateResult, CorrelationLimits, DiversityCheck, DiversityGate,
    RiskBudgetGate, RiskBudgetResult,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::decision::{
    AdmissionDecision, MissingArtifact, ReasonLedger, RejectionStage, StageRejections, Verdict,
    EVALUATED_AT_FORMAT,
};
use crate::evidence::{EvidenceManifest, EvidenceWriter};

/// Decision plus the full gate results it was folded from.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionOutcome {
    pub decision: AdmissionDecision,
    pub correlation: CorrelationGateResult,
    pub risk_budget: RiskBudgetResult,
    pub diversity: Vec<DiversityCheck>,
}

/// How the pipeline treats the live portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PipelineMode<'a> {
    Standard,
    /// The incumbent is being replaced: diversity is waived, violations
    /// against it are waived and its risk leaves the committed base.
    Replacement { incumbent: &'a CandidateId },
}

#[derive(Clone)]
pub struct AdmissionController {
    params: Arc<GovernanceParams>,
    artifacts: Arc<ArtifactSnapshot>,
    params_hash: String,
    evaluated_at: DateTime<Utc>,
}

impl AdmissionController {
    /// Creates a controller over a validated governance snapshot.
    ///
    /// # Errors
    /// Returns `AdmissionError::Config` if the parameters are invalid.
    pub fn new(params: Arc<GovernanceParams>, artifacts: Arc<ArtifactSnapshot>) -> Result<Self> {
        params.validate()?;
        let params_hash = params.snapshot_hash()?;
        info!(
            version = %params.version,
            params_hash = %params_hash,
            season = %artifacts.season,
            candidates = artifacts.candidates.len(),
            "Admission controller ready"
        );
        Ok(Self {
            params,
            artifacts,
            params_hash,
            evaluated_at: Utc::now(),
        })
    }

    /// Pins the evaluation timestamp; identical inputs then give
    /// byte-identical evidence.
    #[must_use]
    pub const fn with_evaluated_at(mut self, evaluated_at: DateTime<Utc>) -> Self {
        self.evaluated_at = evaluated_at;
        self
    }

    #[must_use]
    pub fn params(&self) -> &GovernanceParams {
        &self.params
    }

    #[must_use]
    pub fn artifacts(&self) -> &ArtifactSnapshot {
        &self.artifacts
    }

    #[must_use]
    pub fn params_hash(&self) -> &str {
        &self.params_hash
    }

    /// Evaluates a candidate set against the live portfolio.
    #[must_use]
    pub fn evaluate(
        &self,
        candidate_ids: &[CandidateId],
        portfolio: &PortfolioState,
    ) -> AdmissionOutcome {
        self.run_pipeline(candidate_ids, portfolio, PipelineMode::Standard)
    }

    /// Evaluates and persists the evidence bundle.
    ///
    /// # Errors
    /// Returns an error if the evidence bundle cannot be written.
    pub fn evaluate_and_write_evidence(
        &self,
        candidate_ids: &[CandidateId],
        portfolio: &PortfolioState,
        writer: &EvidenceWriter,
    ) -> Result<(AdmissionOutcome, EvidenceManifest)> {
        let outcome = self.evaluate(candidate_ids, portfolio);
        let manifest = writer.write(&outcome, &self.params)?;
        Ok((outcome, manifest))
    }

    pub(crate) fn run_pipeline(
        &self,
        candidate_ids: &[CandidateId],
        portfolio: &PortfolioState,
        mode: PipelineMode<'_>,
    ) -> AdmissionOutcome {
        let candidates: BTreeSet<CandidateId> = candidate_ids.iter().cloned().collect();
        info!(
            portfolio = %portfolio.portfolio_id,
            candidates = candidates.len(),
            members = portfolio.members.len(),
            replacement = matches!(mode, PipelineMode::Replacement { .. }),
            "Starting admission run"
        );

        let (eligible, precondition) = self.precondition_stage(&candidates);
        let (available, missing_stage, missing_artifacts) = self.data_stage(&eligible);
        let (diverse, diversity_stage, mut diversity) =
            self.diversity_stage(&available, portfolio, mode);
        let correlation = self.correlation_stage(&diverse, portfolio, mode);
        let risk_budget = self.risk_stage(&correlation.admitted, portfolio, mode);
        let capacity_stage =
            self.capacity_stage(&risk_budget.admitted, portfolio, mode, &mut diversity);

        let ledger = ReasonLedger::fold([
            precondition,
            missing_stage,
            diversity_stage,
            StageRejections::new(RejectionStage::Correlation, correlation.reasons.clone()),
            StageRejections::new(RejectionStage::RiskBudget, risk_budget.reasons.clone()),
            capacity_stage,
        ]);

        let decision = self.assemble(
            &candidates,
            portfolio,
            &ledger,
            &correlation,
            &risk_budget,
            missing_artifacts,
        );

        info!(
            portfolio = %decision.portfolio_id,
            verdict = %decision.verdict,
            admitted = decision.admitted_run_ids.len(),
            rejected = decision.rejected_run_ids.len(),
            within_budget = risk_budget.within_budget(),
            "Admission run complete"
        );

        AdmissionOutcome {
            decision,
            correlation,
            risk_budget,
            diversity,
        }
    }

    fn precondition_stage(
        &self,
        candidates: &BTreeSet<CandidateId>,
    ) -> (Vec<CandidateId>, StageRejections) {
        let mut passed = Vec::with_capacity(candidates.len());
        let mut reasons = BTreeMap::new();

        for id in candidates {
            let failure = if id.is_well_formed() {
                match self.artifacts.get(id).map(|a| a.downstream_admissible) {
                    None => Some("no upstream record, downstream_admissible unknown"),
                    Some(None) => Some("downstream_admissible missing"),
                    Some(Some(false)) => Some("downstream_admissible=false"),
                    Some(Some(true)) => None,
                }
            } else {
                Some("malformed candidate id, downstream_admissible not checked")
            }
            .map(|detail| format!("precondition_failed: {detail}"));

            match failure {
                Some(reason) => {
                    debug!(candidate = %id, reason = %reason, "Precondition failed");
                    reasons.insert(id.clone(), reason);
                }
                None => passed.push(id.clone()),
            }
        }

        (passed, StageRejections::new(RejectionStage::Precondition, reasons))
    }

    fn data_stage(
        &self,
        eligible: &[CandidateId],
    ) -> (Vec<CandidateId>, StageRejections, Vec<MissingArtifact>) {
        let mut available = Vec::with_capacity(eligible.len());
        let mut reasons = BTreeMap::new();
        let mut missing = Vec::new();

        for id in eligible {
            let mut absent = Vec::new();
            if self.artifacts.returns(id).is_none() {
                absent.push("return_series");
            }
            if self.artifacts.score(id).is_none() {
                absent.push("score");
            }
            if self.artifacts.risk_contribution(id).is_none() {
                absent.push("max_drawdown");
            }

            if absent.is_empty() {
                available.push(id.clone());
                continue;
            }

            warn!(candidate = %id, missing = ?absent, "Candidate dropped for missing artifacts");
            reasons.insert(id.clone(), format!("missing_artifact: {}", absent.join(", ")));
            missing.extend(absent.into_iter().map(|artifact| MissingArtifact {
                candidate: id.clone(),
                artifact: artifact.to_string(),
            }));
        }

        (
            available,
            StageRejections::new(RejectionStage::MissingData, reasons),
            missing,
        )
    }

    fn bucket_of(&self, id: &CandidateId) -> Option<String> {
        self.artifacts.get(id).and_then(|a| a.bucket.clone())
    }

    fn diversity_stage(
        &self,
        available: &[CandidateId],
        portfolio: &PortfolioState,
        mode: PipelineMode<'_>,
    ) -> (Vec<CandidateId>, StageRejections, Vec<DiversityCheck>) {
        let gate = DiversityGate::from_params(&self.params);
        let replacement = matches!(mode, PipelineMode::Replacement { .. });

        let checks: Vec<DiversityCheck> = available
            .iter()
            .map(|id| gate.evaluate(id, self.bucket_of(id).as_deref(), portfolio, replacement))
            .collect();

        let reasons: BTreeMap<CandidateId, String> = checks
            .iter()
            .filter_map(|c| c.reason().map(|r| (c.candidate.clone(), r)))
            .collect();
        let passed = checks
            .iter()
            .filter(|c| c.passed)
            .map(|c| c.candidate.clone())
            .collect();

        (
            passed,
            StageRejections::new(RejectionStage::Diversity, reasons),
            checks,
        )
    }

    /// Final survivors claim bucket slots in id order; the excess is rejected
    /// as a diversity failure and its check replaces the earlier one.
    fn capacity_stage(
        &self,
        survivors: &[CandidateId],
        portfolio: &PortfolioState,
        mode: PipelineMode<'_>,
        diversity: &mut [DiversityCheck],
    ) -> StageRejections {
        if matches!(mode, PipelineMode::Replacement { .. }) {
            return StageRejections::empty(RejectionStage::Diversity);
        }

        let survivors: Vec<(CandidateId, Option<String>)> = survivors
            .iter()
            .map(|id| (id.clone(), self.bucket_of(id)))
            .collect();
        let overfull: Vec<DiversityCheck> = DiversityGate::from_params(&self.params)
            .enforce_capacity(&survivors, portfolio)
            .into_iter()
            .filter(|c| !c.passed)
            .collect();

        let mut reasons = BTreeMap::new();
        for check in overfull {
            if let Some(reason) = check.reason() {
                reasons.insert(check.candidate.clone(), reason);
            }
            if let Some(slot) = diversity.iter_mut().find(|c| c.candidate == check.candidate) {
                *slot = check;
            }
        }

        StageRejections::new(RejectionStage::Diversity, reasons)
    }

    fn correlation_stage(
        &self,
        diverse: &[CandidateId],
        portfolio: &PortfolioState,
        mode: PipelineMode<'_>,
    ) -> CorrelationGateResult {
        let mut series: BTreeMap<CandidateId, ReturnSeries> = BTreeMap::new();
        let mut scores: BTreeMap<CandidateId, f64> = BTreeMap::new();
        for id in diverse {
            if let Some(s) = self.artifacts.returns(id) {
                series.insert(id.clone(), s.clone());
            }
            if let Some(score) = self.artifacts.score(id) {
                scores.insert(id.clone(), score);
            }
        }

        let mut members = Vec::new();
        for member in portfolio.sorted_members() {
            match self.artifacts.returns(&member.id) {
                Some(s) => {
                    series.insert(member.id.clone(), s.clone());
                    if let Some(score) = self.artifacts.score(&member.id) {
                        scores.insert(member.id.clone(), score);
                    }
                    members.push(member.id.clone());
                }
                None => warn!(
                    member = %member.id,
                    "Live member has no return series, skipped in correlation checks"
                ),
            }
        }

        let waived: BTreeSet<CandidateId> = match mode {
            PipelineMode::Standard => BTreeSet::new(),
            PipelineMode::Replacement { incumbent } => BTreeSet::from([incumbent.clone()]),
        };

        CorrelationGate::new(CorrelationLimits::from(self.params.as_ref()))
            .evaluate_with_members(diverse, &members, &waived, &series, &scores)
    }

    fn risk_stage(
        &self,
        survivors: &[CandidateId],
        portfolio: &PortfolioState,
        mode: PipelineMode<'_>,
    ) -> RiskBudgetResult {
        let released = match mode {
            PipelineMode::Standard => None,
            PipelineMode::Replacement { incumbent } => Some(incumbent),
        };

        let mut committed = Decimal::ZERO;
        for member in portfolio.sorted_members() {
            if survivors.contains(&member.id) || released == Some(&member.id) {
                continue;
            }
            match self.artifacts.risk_contribution(&member.id) {
                Some(risk) => committed += risk,
                None => warn!(
                    member = %member.id,
                    "Live member has no max_drawdown, counted as zero committed risk"
                ),
            }
        }

        let mut risk = BTreeMap::new();
        let mut scores = BTreeMap::new();
        for id in survivors {
            if let Some(r) = self.artifacts.risk_contribution(id) {
                risk.insert(id.clone(), r);
            }
            if let Some(s) = self.artifacts.score(id) {
                scores.insert(id.clone(), s);
            }
        }

        RiskBudgetGate::new(self.params.risk_budget_max)
            .evaluate_with_committed(committed, survivors, &risk, &scores)
    }

    fn assemble(
        &self,
        candidates: &BTreeSet<CandidateId>,
        portfolio: &PortfolioState,
        ledger: &ReasonLedger,
        correlation: &CorrelationGateResult,
        risk_budget: &RiskBudgetResult,
        mut missing_artifacts: Vec<MissingArtifact>,
    ) -> AdmissionDecision {
        let admitted_run_ids: Vec<CandidateId> = candidates
            .iter()
            .filter(|id| !ledger.contains(id))
            .cloned()
            .collect();
        let rejected_run_ids: Vec<CandidateId> = candidates
            .iter()
            .filter(|id| {
                ledger.contains(id) && ledger.stage_of(id) != Some(RejectionStage::MissingData)
            })
            .cloned()
            .collect();

        let correlation_violations: BTreeMap<CandidateId, Vec<CandidateId>> = correlation
            .violation_peers()
            .into_iter()
            .filter(|(id, _)| candidates.contains(id))
            .collect();

        missing_artifacts.sort();

        AdmissionDecision {
            portfolio_id: portfolio.portfolio_id.clone(),
            season: self.artifacts.season.clone(),
            verdict: if admitted_run_ids.is_empty() {
                Verdict::Rejected
            } else {
                Verdict::Admitted
            },
            admitted_run_ids,
            rejected_run_ids,
            reasons: ledger.reasons(),
            rejection_stages: ledger.stages(),
            correlation_violations: (!correlation_violations.is_empty())
                .then_some(correlation_violations),
            risk_budget_steps: (!risk_budget.steps.is_empty()).then(|| risk_budget.steps.clone()),
            missing_artifacts: (!missing_artifacts.is_empty()).then_some(missing_artifacts),
            governance_params_hash: self.params_hash.clone(),
            evaluated_at: self.evaluated_at.format(EVALUATED_AT_FORMAT).to_string(),
        }
    }
}

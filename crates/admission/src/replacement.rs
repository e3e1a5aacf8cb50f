//! Replacement admissions: a proven-dominant candidate taking an incumbent's slot.

use algo_admission_core::{CandidateId, PortfolioState};
use algo_admission_gates::{
    CorrelationViolation, DominanceProof, DominanceProofValidator, ProofValidation,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::controller::{AdmissionController, AdmissionOutcome, PipelineMode};
use crate::decision::Verdict;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementRequest {
    pub candidate: CandidateId,
    pub incumbent: CandidateId,
    #[serde(default)]
    pub replacement_mode: bool,
    #[serde(default)]
    pub proof: Option<DominanceProof>,
}

/// Audit record of one replacement attempt, written as `replacement_decision.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementRecord {
    pub portfolio_id: String,
    pub candidate: CandidateId,
    pub incumbent: CandidateId,
    pub replacement_mode: bool,
    /// `None` when no proof was supplied.
    pub proof_validation: Option<ProofValidation>,
    pub effective: bool,
    /// Why the run fell back to a plain admission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diversity_waiver: Option<String>,
    #[serde(default)]
    pub waived_violations: Vec<CorrelationViolation>,
    /// Incumbent risk removed from the committed base.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incumbent_risk_released: Option<Decimal>,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplacementOutcome {
    pub outcome: AdmissionOutcome,
    pub record: ReplacementRecord,
}

impl AdmissionController {
    /// Evaluates a replacement request.
    ///
    /// Unless the request is in replacement mode, carries a valid proof for
    /// exactly this candidate/incumbent pair and names a live incumbent, the
    /// outcome equals `evaluate(&[candidate], portfolio)`.
    #[must_use]
    pub fn evaluate_replacement(
        &self,
        request: &ReplacementRequest,
        portfolio: &PortfolioState,
    ) -> ReplacementOutcome {
        let proof_validation = request.proof.as_ref().map(DominanceProofValidator::validate);
        let fallback_reason = fallback_reason(request, proof_validation.as_ref(), portfolio);
        let effective = fallback_reason.is_none();

        let candidates = [request.candidate.clone()];
        let outcome = if effective {
            self.run_pipeline(
                &candidates,
                portfolio,
                PipelineMode::Replacement {
                    incumbent: &request.incumbent,
                },
            )
        } else {
            self.evaluate(&candidates, portfolio)
        };

        match &fallback_reason {
            Some(reason) => warn!(
                candidate = %request.candidate,
                incumbent = %request.incumbent,
                reason = %reason,
                "Replacement not effective, evaluated as plain admission"
            ),
            None => info!(
                candidate = %request.candidate,
                incumbent = %request.incumbent,
                verdict = %outcome.decision.verdict,
                "Replacement evaluated"
            ),
        }

        let record = ReplacementRecord {
            portfolio_id: portfolio.portfolio_id.clone(),
            candidate: request.candidate.clone(),
            incumbent: request.incumbent.clone(),
            replacement_mode: request.replacement_mode,
            proof_validation,
            effective,
            fallback_reason,
            diversity_waiver: outcome
                .diversity
                .iter()
                .find(|c| c.candidate == request.candidate)
                .and_then(|c| c.waiver.clone()),
            waived_violations: outcome.correlation.waived.clone(),
            incumbent_risk_released: effective
                .then(|| self.artifacts().risk_contribution(&request.incumbent))
                .flatten(),
            verdict: outcome.decision.verdict,
        };

        ReplacementOutcome { outcome, record }
    }
}

fn fallback_reason(
    request: &ReplacementRequest,
    validation: Option<&ProofValidation>,
    portfolio: &PortfolioState,
) -> Option<String> {
    if !request.replacement_mode {
        return Some("replacement_mode disabled".to_string());
    }
    let (Some(proof), Some(validation)) = (&request.proof, validation) else {
        return Some("dominance proof absent".to_string());
    };
    if proof.candidate != request.candidate || proof.incumbent != request.incumbent {
        return Some(format!(
            "dominance proof names {} over {}, request is {} over {}",
            proof.candidate, proof.incumbent, request.candidate, request.incumbent
        ));
    }
    if !validation.valid {
        return Some(validation.reason.clone());
    }
    if !portfolio.contains(&request.incumbent) {
        return Some(format!("incumbent {} is not a live member", request.incumbent));
    }
    None
}

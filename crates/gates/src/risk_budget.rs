//! Risk budget enforcement.
//!
//! Keeps the aggregate risk contribution of the portfolio at or below the
//! governance ceiling by greedily dropping the weakest contributors.

use algo_admission_core::CandidateId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// One greedy rejection. Replaying the steps in order reproduces the final
/// admitted set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskBudgetStep {
    pub iteration: usize,
    pub rejected_candidate: CandidateId,
    pub portfolio_risk_before: Decimal,
    pub portfolio_risk_after: Decimal,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskBudgetResult {
    pub admitted: Vec<CandidateId>,
    pub rejected: Vec<CandidateId>,
    pub reasons: BTreeMap<CandidateId, String>,
    pub steps: Vec<RiskBudgetStep>,
    /// Risk already carried by live members.
    pub committed_risk: Decimal,
    /// Committed risk plus the admitted candidates.
    pub final_risk: Decimal,
    pub ceiling: Decimal,
}

impl RiskBudgetResult {
    #[must_use]
    pub fn within_budget(&self) -> bool {
        self.final_risk <= self.ceiling
    }
}

pub struct RiskBudgetGate {
    ceiling: Decimal,
}

impl RiskBudgetGate {
    #[must_use]
    pub const fn new(ceiling: Decimal) -> Self {
        Self { ceiling }
    }

    /// Evaluates candidates against an empty portfolio.
    #[must_use]
    pub fn evaluate(
        &self,
        candidate_ids: &[CandidateId],
        risk: &BTreeMap<CandidateId, Decimal>,
        scores: &BTreeMap<CandidateId, f64>,
    ) -> RiskBudgetResult {
        self.evaluate_with_committed(Decimal::ZERO, candidate_ids, risk, scores)
    }

    /// Evaluates candidates on top of risk already committed by live members.
    ///
    /// While the total exceeds the ceiling, the admitted candidate with
    /// positive risk and the lowest score (equal scores: larger id) is
    /// rejected. Every step strictly lowers the total. If the committed risk
    /// alone is over the ceiling no candidate can help, so all are rejected
    /// without steps.
    #[must_use]
    pub fn evaluate_with_committed(
        &self,
        committed_risk: Decimal,
        candidate_ids: &[CandidateId],
        risk: &BTreeMap<CandidateId, Decimal>,
        scores: &BTreeMap<CandidateId, f64>,
    ) -> RiskBudgetResult {
        let contribution = |id: &CandidateId| risk.get(id).copied().unwrap_or(Decimal::ZERO).abs();

        let mut admitted: BTreeSet<CandidateId> = candidate_ids.iter().cloned().collect();
        let mut reasons = BTreeMap::new();
        let mut steps = Vec::new();

        if committed_risk > self.ceiling {
            warn!(
                committed = %committed_risk,
                ceiling = %self.ceiling,
                "Committed risk already exceeds the budget, rejecting all candidates"
            );
            for id in &admitted {
                reasons.insert(
                    id.clone(),
                    format!(
                        "risk_budget_exhausted: committed portfolio risk {committed_risk} exceeds risk_budget_max {}",
                        self.ceiling
                    ),
                );
            }
            return RiskBudgetResult {
                admitted: Vec::new(),
                rejected: admitted.into_iter().collect(),
                reasons,
                steps,
                committed_risk,
                final_risk: committed_risk,
                ceiling: self.ceiling,
            };
        }

        let mut total = committed_risk + admitted.iter().map(contribution).sum::<Decimal>();

        while total > self.ceiling {
            let Some(worst) = worst_contributor(&admitted, risk, scores) else {
                // unreachable while committed <= ceiling: the excess must come from a candidate
                break;
            };
            let before = total;
            let after = before - contribution(&worst);
            let reason = format!(
                "risk_budget_exceeded: portfolio risk {before} > risk_budget_max {}, dropped {worst} (risk {}, score {})",
                self.ceiling,
                contribution(&worst),
                display_score(&worst, scores),
            );

            admitted.remove(&worst);
            steps.push(RiskBudgetStep {
                iteration: steps.len(),
                rejected_candidate: worst.clone(),
                portfolio_risk_before: before,
                portfolio_risk_after: after,
                reason: reason.clone(),
            });
            reasons.insert(worst, reason);
            total = after;
        }

        info!(
            admitted = admitted.len(),
            rejected = reasons.len(),
            steps = steps.len(),
            final_risk = %total,
            ceiling = %self.ceiling,
            "Risk budget gate evaluated"
        );

        RiskBudgetResult {
            admitted: admitted.into_iter().collect(),
            rejected: reasons.keys().cloned().collect(),
            reasons,
            steps,
            committed_risk,
            final_risk: total,
            ceiling: self.ceiling,
        }
    }
}

/// Candidate with positive risk and the worst score; ties go to the larger id.
#[must_use]
pub fn worst_contributor(
    admitted: &BTreeSet<CandidateId>,
    risk: &BTreeMap<CandidateId, Decimal>,
    scores: &BTreeMap<CandidateId, f64>,
) -> Option<CandidateId> {
    let score = |id: &CandidateId| {
        scores
            .get(id)
            .copied()
            .filter(|s| s.is_finite())
            .unwrap_or(f64::MIN)
    };

    admitted
        .iter()
        .filter(|id| risk.get(*id).is_some_and(|r| !r.is_zero()))
        .min_by(|a, b| {
            score(a)
                .partial_cmp(&score(b))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.cmp(a))
        })
        .cloned()
}

fn display_score(id: &CandidateId, scores: &BTreeMap<CandidateId, f64>) -> String {
    scores
        .get(id)
        .map_or_else(|| "n/a".to_string(), |s| format!("{s:.4}"))
}

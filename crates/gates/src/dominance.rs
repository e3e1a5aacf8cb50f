//! Dominance proof validation for replacement admissions.
//!
//! Fails closed: any missing, non-finite or non-dominating field invalidates
//! the whole proof.

use algo_admission_core::CandidateId;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Claim that `candidate` improves on `incumbent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DominanceProof {
    pub candidate: CandidateId,
    pub incumbent: CandidateId,
    #[serde(default)]
    pub expected_score_new: Option<f64>,
    #[serde(default)]
    pub expected_score_old: Option<f64>,
    #[serde(default)]
    pub risk_adjusted_score_new: Option<f64>,
    #[serde(default)]
    pub risk_adjusted_score_old: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofValidation {
    pub valid: bool,
    pub reason: String,
}

impl ProofValidation {
    fn invalid(failures: &[String]) -> Self {
        Self {
            valid: false,
            reason: format!("dominance proof invalid: {}", failures.join("; ")),
        }
    }
}

pub struct DominanceProofValidator;

impl DominanceProofValidator {
    /// Validates a proof. All failing conditions are listed in the reason.
    #[must_use]
    pub fn validate(proof: &DominanceProof) -> ProofValidation {
        let fields = [
            ("expected_score_new", proof.expected_score_new),
            ("expected_score_old", proof.expected_score_old),
            ("risk_adjusted_score_new", proof.risk_adjusted_score_new),
            ("risk_adjusted_score_old", proof.risk_adjusted_score_old),
        ];

        let mut failures: Vec<String> = fields
            .iter()
            .filter_map(|(name, value)| match value {
                None => Some(format!("{name} missing")),
                Some(v) if !v.is_finite() => Some(format!("{name} not finite")),
                Some(_) => None,
            })
            .collect();

        if !failures.is_empty() {
            warn!(
                candidate = %proof.candidate,
                incumbent = %proof.incumbent,
                failures = ?failures,
                "Dominance proof incomplete"
            );
            return ProofValidation::invalid(&failures);
        }

        let (exp_new, exp_old, ra_new, ra_old) = match (
            proof.expected_score_new,
            proof.expected_score_old,
            proof.risk_adjusted_score_new,
            proof.risk_adjusted_score_old,
        ) {
            (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
            _ => return ProofValidation::invalid(&["fields missing".to_string()]),
        };

        if exp_new <= exp_old {
            failures.push(format!(
                "expected_score_new {exp_new:.6} not > expected_score_old {exp_old:.6}"
            ));
        }
        if ra_new < ra_old {
            failures.push(format!(
                "risk_adjusted_score_new {ra_new:.6} < risk_adjusted_score_old {ra_old:.6}"
            ));
        }

        if !failures.is_empty() {
            warn!(
                candidate = %proof.candidate,
                incumbent = %proof.incumbent,
                failures = ?failures,
                "Dominance proof rejected"
            );
            return ProofValidation::invalid(&failures);
        }

        info!(
            candidate = %proof.candidate,
            incumbent = %proof.incumbent,
            "Dominance proof accepted"
        );
        ProofValidation {
            valid: true,
            reason: format!(
                "{} dominates {}: expected {exp_new:.6} > {exp_old:.6}, risk-adjusted {ra_new:.6} >= {ra_old:.6}",
                proof.candidate, proof.incumbent
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proof(exp_new: f64, exp_old: f64, ra_new: f64, ra_old: f64) -> DominanceProof {
        DominanceProof {
            candidate: CandidateId::from("new"),
            incumbent: CandidateId::from("old"),
            expected_score_new: Some(exp_new),
            expected_score_old: Some(exp_old),
            risk_adjusted_score_new: Some(ra_new),
            risk_adjusted_score_old: Some(ra_old),
        }
    }

    #[test]
    fn strict_improvement_is_valid() {
        let v = DominanceProofValidator::validate(&proof(1.2, 1.0, 0.8, 0.8));
        assert!(v.valid);
        assert!(v.reason.contains("dominates"));
    }

    #[test]
    fn equal_expected_score_is_not_dominance() {
        let v = DominanceProofValidator::validate(&proof(1.0, 1.0, 0.9, 0.8));
        assert!(!v.valid);
        assert!(v.reason.contains("expected_score_new"));
    }

    #[test]
    fn worse_risk_adjusted_score_invalidates() {
        let v = DominanceProofValidator::validate(&proof(1.5, 1.0, 0.7, 0.8));
        assert!(!v.valid);
        assert!(v.reason.contains("risk_adjusted_score_new"));
    }

    #[test]
    fn partial_dominance_lists_every_failure() {
        let v = DominanceProofValidator::validate(&proof(0.9, 1.0, 0.7, 0.8));
        assert!(!v.valid);
        assert!(v.reason.contains("expected_score_new"));
        assert!(v.reason.contains("risk_adjusted_score_new"));
    }

    #[test]
    fn missing_field_fails_closed() {
        let mut p = proof(2.0, 1.0, 2.0, 1.0);
        p.risk_adjusted_score_old = None;
        let v = DominanceProofValidator::validate(&p);
        assert!(!v.valid);
        assert!(v.reason.contains("risk_adjusted_score_old missing"));
    }

    #[test]
    fn nan_field_fails_closed() {
        let v = DominanceProofValidator::validate(&proof(f64::NAN, 1.0, 2.0, 1.0));
        assert!(!v.valid);
        assert!(v.reason.contains("not finite"));
    }

    #[test]
    fn deserializes_partial_proof() {
        let p: DominanceProof = serde_json::from_str(
            r#"{"candidate":"new","incumbent":"old","expected_score_new":1.5}"#,
        )
        .unwrap();
        assert!(!DominanceProofValidator::validate(&p).valid);
    }
}

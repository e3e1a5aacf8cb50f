//! Deterministic admission gates.
//!
//! Each gate is a pure function of its inputs and returns a result object
//! describing every outcome; none of them fail on a malformed candidate.
//!
//! - correlation: pairwise correlation limits and conflict resolution
//! - risk budget: greedy enforcement of the portfolio risk ceiling
//! - diversity: bucket capacity with recorded replacement waivers
//! - dominance: proof validation for replacement admissions

pub mod correlation;
pub mod diversity;
pub mod dominance;
pub mod risk_budget;

pub use correlation::{
    choose_reject, resolve_violations, severity_order, CorrelationGate, CorrelationGateResult,
    CorrelationLimits, CorrelationMatrix, CorrelationViolation, PairKind,
};
pub use diversity::{DiversityCheck, DiversityGate};
pub use dominance::{DominanceProof, DominanceProofValidator, ProofValidation};
pub use risk_budget::{worst_contributor, RiskBudgetGate, RiskBudgetResult, RiskBudgetStep};

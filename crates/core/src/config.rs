use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::digest::digest_of;
use crate::error::{AdmissionError, Result};

/// Governance limits for one admission run.
///
/// Every limit is required: a missing threshold is a configuration error,
/// never a silent default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GovernanceParams {
    /// Version label of the configuration snapshot.
    pub version: String,
    /// Maximum |correlation| allowed between two candidates.
    pub max_pairwise_correlation: f64,
    /// Maximum |correlation| allowed between a candidate and a live member.
    pub max_member_correlation: f64,
    /// Ceiling on aggregate risk contribution of the portfolio.
    pub risk_budget_max: Decimal,
    /// Minimum common dates before a correlation estimate is trusted.
    pub min_overlap_days: usize,
    /// Maximum concurrent members per bucket; unlisted buckets are unbounded.
    #[serde(default)]
    pub bucket_capacities: BTreeMap<String, usize>,
}

impl GovernanceParams {
    /// Checks every limit once, at the boundary.
    ///
    /// # Errors
    /// Returns [`AdmissionError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(AdmissionError::Config("version must not be empty".to_string()));
        }
        check_unit_threshold("max_pairwise_correlation", self.max_pairwise_correlation)?;
        check_unit_threshold("max_member_correlation", self.max_member_correlation)?;
        if self.risk_budget_max < Decimal::ZERO {
            return Err(AdmissionError::Config(format!(
                "risk_budget_max must be >= 0, got {}",
                self.risk_budget_max
            )));
        }
        if self.min_overlap_days < 2 {
            return Err(AdmissionError::Config(format!(
                "min_overlap_days must be >= 2, got {}",
                self.min_overlap_days
            )));
        }
        if self.bucket_capacities.keys().any(|b| b.trim().is_empty()) {
            return Err(AdmissionError::Config(
                "bucket_capacities contains an empty bucket name".to_string(),
            ));
        }
        Ok(())
    }

    /// SHA-256 over the canonical JSON form; attributes a decision to an
    /// exact parameter set.
    ///
    /// # Errors
    /// Returns an error if the parameters cannot be serialized.
    pub fn snapshot_hash(&self) -> Result<String> {
        digest_of(self)
    }
}

fn check_unit_threshold(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(AdmissionError::Config(format!(
            "{name} must be a finite value in [0, 1], got {value}"
        )));
    }
    Ok(())
}

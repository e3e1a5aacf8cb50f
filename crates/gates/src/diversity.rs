//! Bucket capacity (diversity) enforcement.

use algo_admission_core::{CandidateId, GovernanceParams, PortfolioState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Outcome of a bucket capacity check for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiversityCheck {
    pub candidate: CandidateId,
    pub bucket: Option<String>,
    pub used: usize,
    /// `None` when the bucket is unconstrained.
    pub capacity: Option<usize>,
    pub passed: bool,
    /// Set when the capacity check was waived; always visible in evidence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiver: Option<String>,
}

impl DiversityCheck {
    /// Rejection reason, `None` if the check passed.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        if self.passed {
            return None;
        }
        Some(format!(
            "diversity_bucket_full: bucket '{}' at capacity ({}/{})",
            self.bucket.as_deref().unwrap_or("-"),
            self.used,
            self.capacity.unwrap_or(0)
        ))
    }
}

pub struct DiversityGate {
    capacities: BTreeMap<String, usize>,
}

impl DiversityGate {
    #[must_use]
    pub const fn new(capacities: BTreeMap<String, usize>) -> Self {
        Self { capacities }
    }

    #[must_use]
    pub fn from_params(params: &GovernanceParams) -> Self {
        Self::new(params.bucket_capacities.clone())
    }

    /// Checks one candidate against the live portfolio.
    ///
    /// Usage counts live members only; a candidate that is already a member
    /// does not count against itself. In replacement mode the check always
    /// passes, but the would-be result is kept in `waiver` so the bypass is
    /// never silent.
    #[must_use]
    pub fn evaluate(
        &self,
        candidate: &CandidateId,
        bucket: Option<&str>,
        existing: &PortfolioState,
        replacement_mode: bool,
    ) -> DiversityCheck {
        let used = bucket.map_or(0, |b| existing.bucket_usage(b, Some(candidate)));
        self.check(candidate, bucket, used, replacement_mode)
    }

    /// Re-checks the candidates that survived every other gate, in id order,
    /// counting earlier survivors against the same bucket so a run can never
    /// overfill it. Only final survivors take a slot.
    #[must_use]
    pub fn enforce_capacity(
        &self,
        survivors: &[(CandidateId, Option<String>)],
        existing: &PortfolioState,
    ) -> Vec<DiversityCheck> {
        let mut ordered: Vec<&(CandidateId, Option<String>)> = survivors.iter().collect();
        ordered.sort_by(|a, b| a.0.cmp(&b.0));
        ordered.dedup_by(|a, b| a.0 == b.0);

        let mut taken_in_run: BTreeMap<&str, usize> = BTreeMap::new();
        let mut checks = Vec::with_capacity(ordered.len());

        for (candidate, bucket) in ordered {
            let bucket = bucket.as_deref();
            let used = bucket.map_or(0, |b| {
                existing.bucket_usage(b, Some(candidate))
                    + taken_in_run.get(b).copied().unwrap_or(0)
            });
            let check = self.check(candidate, bucket, used, false);
            if check.passed {
                if let Some(b) = bucket {
                    *taken_in_run.entry(b).or_default() += 1;
                }
            }
            checks.push(check);
        }

        let rejected = checks.iter().filter(|c| !c.passed).count();
        info!(survivors = checks.len(), rejected, "Bucket capacity enforced");
        checks
    }

    fn check(
        &self,
        candidate: &CandidateId,
        bucket: Option<&str>,
        used: usize,
        replacement_mode: bool,
    ) -> DiversityCheck {
        let capacity = bucket.and_then(|b| self.capacities.get(b).copied());
        let within = capacity.map_or(true, |cap| used < cap);

        let waiver = replacement_mode.then(|| {
            format!(
                "capacity check waived: replacement mode (bucket '{}', used {}/{})",
                bucket.unwrap_or("-"),
                used,
                capacity.map_or_else(|| "unbounded".to_string(), |c| c.to_string())
            )
        });

        if !within && !replacement_mode {
            warn!(
                candidate = %candidate,
                bucket = bucket.unwrap_or("-"),
                used,
                capacity = capacity.unwrap_or(0),
                "Bucket at capacity"
            );
        }

        DiversityCheck {
            candidate: candidate.clone(),
            bucket: bucket.map(str::to_string),
            used,
            capacity,
            passed: within || replacement_mode,
            waiver,
        }
    }
}

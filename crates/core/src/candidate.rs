use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::returns::ReturnSeries;

/// Identifier of one strategy/parameter instance competing for a slot.
///
/// Ordering is plain lexicographic and is the tie-break of last resort.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty or whitespace-only ids cannot be attributed in evidence.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl std::fmt::Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CandidateId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CandidateId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Upstream research output for one candidate in one season.
///
/// Every field is optional because the upstream reader may not have produced
/// it; absence is decided on by the admission pipeline, not here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateArtifacts {
    /// Passed upstream statistical screening.
    #[serde(default)]
    pub downstream_admissible: Option<bool>,
    #[serde(default)]
    pub returns: Option<ReturnSeries>,
    #[serde(default)]
    pub score: Option<f64>,
    /// Maximum drawdown as a fraction of equity (sign is ignored).
    #[serde(default)]
    pub max_drawdown: Option<Decimal>,
    /// Strategy family used for diversity buckets.
    #[serde(default)]
    pub bucket: Option<String>,
}

impl CandidateArtifacts {
    /// Risk budget consumption derived from the maximum drawdown.
    #[must_use]
    pub fn risk_contribution(&self) -> Option<Decimal> {
        self.max_drawdown.map(|dd| dd.abs())
    }

    /// Score if present and finite.
    #[must_use]
    pub fn finite_score(&self) -> Option<f64> {
        self.score.filter(|s| s.is_finite())
    }

    /// Return series if present and non-empty.
    #[must_use]
    pub fn usable_returns(&self) -> Option<&ReturnSeries> {
        self.returns.as_ref().filter(|r| !r.is_empty())
    }
}

//! Read-only inputs of an admission run.
//!
//! Upstream artifacts and live portfolio membership are resolved once, before
//! any gate runs, and are never mutated afterwards. Both types are plain data
//! so they can be shared behind an `Arc` by concurrent runs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::candidate::{CandidateArtifacts, CandidateId};
use crate::error::Result;
use crate::returns::ReturnSeries;

/// Upstream artifacts for every known candidate of one season.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSnapshot {
    /// Season / research run the artifacts were produced for.
    pub season: String,
    #[serde(default)]
    pub candidates: BTreeMap<CandidateId, CandidateArtifacts>,
}

impl ArtifactSnapshot {
    pub fn new(season: impl Into<String>) -> Self {
        Self {
            season: season.into(),
            candidates: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_candidate(
        mut self,
        id: impl Into<CandidateId>,
        artifacts: CandidateArtifacts,
    ) -> Self {
        self.candidates.insert(id.into(), artifacts);
        self
    }

    /// Reads a snapshot previously exported as JSON.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    #[must_use]
    pub fn get(&self, id: &CandidateId) -> Option<&CandidateArtifacts> {
        self.candidates.get(id)
    }

    #[must_use]
    pub fn returns(&self, id: &CandidateId) -> Option<&ReturnSeries> {
        self.get(id).and_then(CandidateArtifacts::usable_returns)
    }

    #[must_use]
    pub fn score(&self, id: &CandidateId) -> Option<f64> {
        self.get(id).and_then(CandidateArtifacts::finite_score)
    }

    #[must_use]
    pub fn risk_contribution(&self, id: &CandidateId) -> Option<Decimal> {
        self.get(id).and_then(CandidateArtifacts::risk_contribution)
    }
}

/// A strategy already live in a portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioMember {
    pub id: CandidateId,
    #[serde(default)]
    pub bucket: Option<String>,
}

/// Live membership of one portfolio at the start of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub portfolio_id: String,
    #[serde(default)]
    pub members: Vec<PortfolioMember>,
}

impl PortfolioState {
    pub fn new(portfolio_id: impl Into<String>) -> Self {
        Self {
            portfolio_id: portfolio_id.into(),
            members: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_member(mut self, id: impl Into<CandidateId>, bucket: Option<&str>) -> Self {
        self.members.push(PortfolioMember {
            id: id.into(),
            bucket: bucket.map(str::to_string),
        });
        self
    }

    #[must_use]
    pub fn contains(&self, id: &CandidateId) -> bool {
        self.members.iter().any(|m| &m.id == id)
    }

    /// Members in id order, deduplicated.
    #[must_use]
    pub fn sorted_members(&self) -> Vec<&PortfolioMember> {
        let mut members: Vec<&PortfolioMember> = self.members.iter().collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));
        members.dedup_by(|a, b| a.id == b.id);
        members
    }

    /// Live members occupying `bucket`, not counting `excluding`.
    #[must_use]
    pub fn bucket_usage(&self, bucket: &str, excluding: Option<&CandidateId>) -> usize {
        self.sorted_members()
            .into_iter()
            .filter(|m| m.bucket.as_deref() == Some(bucket) && Some(&m.id) != excluding)
            .count()
    }
}

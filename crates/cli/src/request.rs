//! Admission request files.

use algo_admission::ReplacementRequest;
use algo_admission_core::{ArtifactSnapshot, CandidateId, PortfolioState};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One admission run: a portfolio and what to evaluate against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionRequestFile {
    pub portfolio: PortfolioState,
    /// Candidates to evaluate. When absent, every snapshot candidate that is
    /// not already a live member is evaluated.
    #[serde(default)]
    pub candidate_ids: Option<Vec<CandidateId>>,
    /// Replacement request; takes precedence over `candidate_ids`.
    #[serde(default)]
    pub replacement: Option<ReplacementRequest>,
}

impl AdmissionRequestFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse request file {}", path.display()))
    }

    #[must_use]
    pub fn candidates(&self, snapshot: &ArtifactSnapshot) -> Vec<CandidateId> {
        match &self.candidate_ids {
            Some(ids) => ids.clone(),
            None => snapshot
                .candidates
                .keys()
                .filter(|id| !self.portfolio.contains(id))
                .cloned()
                .collect(),
        }
    }
}

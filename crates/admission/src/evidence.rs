//! Evidence bundle persistence.
//!
//! Every run writes a fixed set of canonical JSON files (sorted keys, pretty,
//! trailing newline) under `<root>/<portfolio_id>/admission/`, then a manifest
//! with the SHA-256 of each file. Identical inputs give byte-identical
//! bundles. Files are written to a temporary name and renamed into place.

use algo_admission_core::{
    canonical_json, canonical_json_pretty, sha256_hex, AdmissionError, CandidateId,
    GovernanceParams, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::controller::AdmissionOutcome;
use crate::decision::{AdmissionDecision, Verdict};
use crate::replacement::{ReplacementOutcome, ReplacementRecord};

pub const DECISION_FILE: &str = "admission_decision.json";
pub const GOVERNANCE_SNAPSHOT_FILE: &str = "governance_params_snapshot.json";
pub const CORRELATION_MATRIX_FILE: &str = "correlation_matrix.json";
pub const CORRELATION_VIOLATIONS_FILE: &str = "correlation_violations.json";
pub const RISK_BUDGET_STEPS_FILE: &str = "risk_budget_steps.json";
pub const DIVERSITY_CHECKS_FILE: &str = "diversity_checks.json";
pub const ADMITTED_IDS_FILE: &str = "admitted_run_ids.json";
pub const REJECTED_IDS_FILE: &str = "rejected_run_ids.json";
pub const REJECTION_ARTIFACT_FILE: &str = "rejection_artifact.json";
pub const REPLACEMENT_FILE: &str = "replacement_decision.json";
pub const MANIFEST_FILE: &str = "evidence_manifest.json";

const BUNDLE_SUBDIR: &str = "admission";

/// Digest index of one evidence bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceManifest {
    pub portfolio_id: String,
    pub governance_params_hash: String,
    /// File name to SHA-256 of its exact bytes.
    pub files: BTreeMap<String, String>,
    /// SHA-256 of the canonical JSON of `files`.
    pub bundle_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionMetrics {
    pub candidate_count: usize,
    pub admitted_count: usize,
    pub rejected_count: usize,
    pub missing_count: usize,
    pub violation_count: usize,
    pub risk_budget_step_count: usize,
}

/// Summary written when a run admits nobody.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionArtifact {
    pub portfolio_id: String,
    /// Tag of the highest-priority stage that rejected anything.
    pub governance_rule: String,
    pub governance_rules: Vec<String>,
    pub reason: String,
    pub affected_run_ids: Vec<CandidateId>,
    pub metrics: RejectionMetrics,
    pub evaluated_at: String,
}

impl RejectionArtifact {
    #[must_use]
    pub fn from_outcome(outcome: &AdmissionOutcome) -> Self {
        let decision = &outcome.decision;

        let mut stages: Vec<_> = decision.rejection_stages.values().copied().collect();
        stages.sort();
        stages.dedup();

        let governance_rules: Vec<String> = stages
            .iter()
            .map(|s| s.governance_rule().to_string())
            .collect();
        let governance_rule = governance_rules
            .first()
            .cloned()
            .unwrap_or_else(|| "EMPTY_CANDIDATE_SET".to_string());

        let breakdown: Vec<String> = stages
            .iter()
            .map(|stage| {
                let n = decision.rejection_stages.values().filter(|s| *s == stage).count();
                format!("{n} {stage}")
            })
            .collect();
        let reason = if breakdown.is_empty() {
            format!("no candidates submitted to portfolio {}", decision.portfolio_id)
        } else {
            format!(
                "no candidate admitted to portfolio {}: {}",
                decision.portfolio_id,
                breakdown.join(", ")
            )
        };

        Self {
            portfolio_id: decision.portfolio_id.clone(),
            governance_rule,
            governance_rules,
            reason,
            affected_run_ids: decision.reasons.keys().cloned().collect(),
            metrics: RejectionMetrics {
                candidate_count: decision.reasons.len() + decision.admitted_run_ids.len(),
                admitted_count: decision.admitted_run_ids.len(),
                rejected_count: decision.rejected_run_ids.len(),
                missing_count: decision.missing_ids().len(),
                violation_count: outcome.correlation.violations.len(),
                risk_budget_step_count: outcome.risk_budget.steps.len(),
            },
            evaluated_at: decision.evaluated_at.clone(),
        }
    }
}

#[derive(Serialize)]
struct GovernanceSnapshotFile<'a> {
    sha256: &'a str,
    params: &'a GovernanceParams,
}

#[derive(Serialize)]
struct ViolationsFile<'a> {
    violations: &'a [algo_admission_gates::CorrelationViolation],
    waived: &'a [algo_admission_gates::CorrelationViolation],
    nan_fallbacks: &'a [(CandidateId, CandidateId)],
}

#[derive(Serialize)]
struct RiskBudgetFile<'a> {
    ceiling: Decimal,
    committed_risk: Decimal,
    final_risk: Decimal,
    steps: &'a [algo_admission_gates::RiskBudgetStep],
}

pub struct EvidenceWriter {
    root: PathBuf,
}

impl EvidenceWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Bundle directory for a portfolio.
    ///
    /// # Errors
    /// Returns `AdmissionError::InvalidInput` for ids that would escape the root.
    pub fn bundle_dir(&self, portfolio_id: &str) -> Result<PathBuf> {
        validate_portfolio_id(portfolio_id)?;
        Ok(self.root.join(portfolio_id).join(BUNDLE_SUBDIR))
    }

    /// Writes the bundle of a plain admission run.
    ///
    /// # Errors
    /// Returns an error if the portfolio id is unsafe or any file cannot be written.
    pub fn write(
        &self,
        outcome: &AdmissionOutcome,
        params: &GovernanceParams,
    ) -> Result<EvidenceManifest> {
        self.write_bundle(outcome, params, None)
    }

    /// Writes the bundle of a replacement run, including `replacement_decision.json`.
    ///
    /// # Errors
    /// Returns an error if the portfolio id is unsafe or any file cannot be written.
    pub fn write_replacement(
        &self,
        replacement: &ReplacementOutcome,
        params: &GovernanceParams,
    ) -> Result<EvidenceManifest> {
        self.write_bundle(&replacement.outcome, params, Some(&replacement.record))
    }

    fn write_bundle(
        &self,
        outcome: &AdmissionOutcome,
        params: &GovernanceParams,
        replacement: Option<&ReplacementRecord>,
    ) -> Result<EvidenceManifest> {
        let decision: &AdmissionDecision = &outcome.decision;
        let dir = self.bundle_dir(&decision.portfolio_id)?;
        fs::create_dir_all(&dir)?;

        let mut files: BTreeMap<String, String> = BTreeMap::new();
        let mut emit = |name: &str, body: String| -> Result<()> {
            write_atomic(&dir.join(name), &body)?;
            files.insert(name.to_string(), sha256_hex(body.as_bytes()));
            Ok(())
        };

        emit(DECISION_FILE, canonical_json_pretty(decision)?)?;
        emit(
            GOVERNANCE_SNAPSHOT_FILE,
            canonical_json_pretty(&GovernanceSnapshotFile {
                sha256: &decision.governance_params_hash,
                params,
            })?,
        )?;
        emit(CORRELATION_MATRIX_FILE, canonical_json_pretty(&outcome.correlation.matrix)?)?;
        emit(
            CORRELATION_VIOLATIONS_FILE,
            canonical_json_pretty(&ViolationsFile {
                violations: &outcome.correlation.violations,
                waived: &outcome.correlation.waived,
                nan_fallbacks: &outcome.correlation.nan_fallbacks,
            })?,
        )?;
        emit(
            RISK_BUDGET_STEPS_FILE,
            canonical_json_pretty(&RiskBudgetFile {
                ceiling: outcome.risk_budget.ceiling,
                committed_risk: outcome.risk_budget.committed_risk,
                final_risk: outcome.risk_budget.final_risk,
                steps: &outcome.risk_budget.steps,
            })?,
        )?;
        emit(DIVERSITY_CHECKS_FILE, canonical_json_pretty(&outcome.diversity)?)?;
        emit(ADMITTED_IDS_FILE, canonical_json_pretty(&decision.admitted_run_ids)?)?;
        emit(REJECTED_IDS_FILE, canonical_json_pretty(&decision.rejected_run_ids)?)?;

        if decision.verdict == Verdict::Rejected {
            emit(
                REJECTION_ARTIFACT_FILE,
                canonical_json_pretty(&RejectionArtifact::from_outcome(outcome))?,
            )?;
        }
        if let Some(record) = replacement {
            emit(REPLACEMENT_FILE, canonical_json_pretty(record)?)?;
        }

        if decision.verdict == Verdict::Admitted {
            remove_stale(&dir.join(REJECTION_ARTIFACT_FILE))?;
        }
        if replacement.is_none() {
            remove_stale(&dir.join(REPLACEMENT_FILE))?;
        }

        let manifest = EvidenceManifest {
            portfolio_id: decision.portfolio_id.clone(),
            governance_params_hash: decision.governance_params_hash.clone(),
            bundle_hash: sha256_hex(canonical_json(&files)?.as_bytes()),
            files,
        };
        write_atomic(&dir.join(MANIFEST_FILE), &canonical_json_pretty(&manifest)?)?;

        info!(
            portfolio = %manifest.portfolio_id,
            dir = %dir.display(),
            files = manifest.files.len(),
            bundle_hash = %manifest.bundle_hash,
            "Evidence bundle written"
        );
        Ok(manifest)
    }
}

fn validate_portfolio_id(portfolio_id: &str) -> Result<()> {
    let unsafe_id = portfolio_id.trim().is_empty()
        || portfolio_id.contains(['/', '\\'])
        || portfolio_id.contains("..")
        || Path::new(portfolio_id).is_absolute();
    if unsafe_id {
        return Err(AdmissionError::InvalidInput(format!(
            "portfolio id {portfolio_id:?} is not a safe directory name"
        )));
    }
    Ok(())
}

/// Writes through a uniquely named temp file in the target directory, so
/// concurrent writers never share a temp path.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    debug!(path = %path.display(), bytes = contents.len(), "Evidence file written");
    Ok(())
}

fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale evidence file");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

//! Admit command.
//!
//! Loads the governance snapshot and upstream artifacts once, then evaluates
//! the request files on blocking tasks, one task per portfolio. Requests for
//! the same portfolio run in order on one task since they share an evidence
//! directory. Runs share only the read-only snapshots.

use algo_admission::{
    AdmissionController, DecisionFormatter, EvidenceManifest, EvidenceWriter, Verdict,
};
use algo_admission_core::{ArtifactSnapshot, GovernanceLoader, GovernanceParams};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::request::AdmissionRequestFile;

/// Arguments for the admit command.
#[derive(Args, Debug, Clone)]
pub struct AdmitArgs {
    /// Governance parameters file (TOML or JSON)
    #[arg(short, long, env = "ADMISSION_GOVERNANCE")]
    pub governance: PathBuf,

    /// Profile overlay merged over the governance file (e.g. "strict")
    #[arg(long)]
    pub profile: Option<String>,

    /// Upstream artifact snapshot (JSON)
    #[arg(short, long)]
    pub artifacts: PathBuf,

    /// Request file; repeat to run several portfolios in parallel
    #[arg(short, long = "request", required = true)]
    pub requests: Vec<PathBuf>,

    /// Root directory for evidence bundles
    #[arg(long, default_value = "evidence")]
    pub evidence_dir: PathBuf,

    /// Pin the evaluation timestamp (RFC 3339) for reproducible evidence
    #[arg(long)]
    pub evaluated_at: Option<String>,

    /// Evaluate without writing evidence
    #[arg(long)]
    pub dry_run: bool,
}

/// Outcome of one request file.
#[derive(Debug)]
pub struct RequestReport {
    pub verdict: Verdict,
    pub summary: String,
    pub manifest: Option<EvidenceManifest>,
}

pub(crate) fn load_params(path: &Path, profile: Option<&str>) -> Result<GovernanceParams> {
    let params = match profile {
        Some(profile) => GovernanceLoader::load_with_profile(path, profile),
        None => GovernanceLoader::load(path),
    };
    params.with_context(|| format!("Failed to load governance parameters from {}", path.display()))
}

fn parse_evaluated_at(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid --evaluated-at timestamp: {raw}"))?
        .with_timezone(&Utc))
}

/// Runs the admit command.
///
/// # Errors
/// Returns an error if the shared inputs cannot be loaded or any request fails.
pub async fn run_admit(args: AdmitArgs) -> Result<()> {
    let params = Arc::new(load_params(&args.governance, args.profile.as_deref())?);
    let artifacts = Arc::new(
        ArtifactSnapshot::from_json_file(&args.artifacts)
            .with_context(|| {
                format!("Failed to load artifacts from {}", args.artifacts.display())
            })?,
    );

    let mut controller = AdmissionController::new(params, artifacts)?;
    if let Some(raw) = &args.evaluated_at {
        controller = controller.with_evaluated_at(parse_evaluated_at(raw)?);
    }
    let writer = Arc::new(EvidenceWriter::new(&args.evidence_dir));

    info!(
        requests = args.requests.len(),
        evidence_dir = %args.evidence_dir.display(),
        dry_run = args.dry_run,
        "Starting admission runs"
    );

    let total = args.requests.len();
    let mut failures = 0;
    let mut groups: BTreeMap<String, Vec<(PathBuf, AdmissionRequestFile)>> = BTreeMap::new();
    for path in &args.requests {
        match AdmissionRequestFile::load(path) {
            Ok(request) => groups
                .entry(request.portfolio.portfolio_id.clone())
                .or_default()
                .push((path.clone(), request)),
            Err(e) => {
                error!(request = %path.display(), "Request failed: {:#}", e);
                failures += 1;
            }
        }
    }

    let mut handles = Vec::with_capacity(groups.len());
    for (portfolio, requests) in groups {
        let controller = controller.clone();
        let writer = Arc::clone(&writer);
        let dry_run = args.dry_run;
        handles.push(tokio::task::spawn_blocking(move || {
            if requests.len() > 1 {
                info!(
                    portfolio = %portfolio,
                    requests = requests.len(),
                    "Running requests in order"
                );
            }
            requests
                .into_iter()
                .map(|(path, request)| {
                    let report = run_request(&controller, &writer, &request, dry_run);
                    (path, report)
                })
                .collect::<Vec<_>>()
        }));
    }

    for handle in handles {
        let reports = handle.await.context("Admission task panicked")?;
        for (path, report) in reports {
            match report {
                Ok(report) => {
                    println!("{}", report.summary);
                    if let Some(manifest) = &report.manifest {
                        println!("{}", DecisionFormatter::format_manifest(manifest));
                    }
                    info!(request = %path.display(), verdict = %report.verdict, "Request complete");
                }
                Err(e) => {
                    error!(request = %path.display(), "Request failed: {:#}", e);
                    failures += 1;
                }
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {total} admission requests failed");
    }
    Ok(())
}

/// Evaluates one request synchronously.
pub(crate) fn run_request(
    controller: &AdmissionController,
    writer: &EvidenceWriter,
    request: &AdmissionRequestFile,
    dry_run: bool,
) -> Result<RequestReport> {
    if let Some(replacement) = &request.replacement {
        let outcome = controller.evaluate_replacement(replacement, &request.portfolio);
        let manifest = if dry_run {
            None
        } else {
            Some(
                writer
                    .write_replacement(&outcome, controller.params())
                    .context("Failed to write replacement evidence")?,
            )
        };
        let mut summary = DecisionFormatter::format(&outcome.outcome.decision);
        summary.push_str(&format!(
            "Replacement {} -> {}: {}\n",
            outcome.record.incumbent,
            outcome.record.candidate,
            outcome
                .record
                .fallback_reason
                .as_deref()
                .unwrap_or("effective")
        ));
        return Ok(RequestReport {
            verdict: outcome.outcome.decision.verdict,
            summary,
            manifest,
        });
    }

    let candidates = request.candidates(controller.artifacts());
    let (outcome, manifest) = if dry_run {
        (controller.evaluate(&candidates, &request.portfolio), None)
    } else {
        let (outcome, manifest) = controller
            .evaluate_and_write_evidence(&candidates, &request.portfolio, writer)
            .context("Failed to write admission evidence")?;
        (outcome, Some(manifest))
    };

    Ok(RequestReport {
        verdict: outcome.decision.verdict,
        summary: DecisionFormatter::format(&outcome.decision),
        manifest,
    })
}

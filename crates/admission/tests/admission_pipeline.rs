use algo_admission::{
    AdmissionController, EvidenceWriter, RejectionArtifact, RejectionStage, ReplacementRecord,
    ReplacementRequest, Verdict,
};
use algo_admission_core::{
    sha256_hex, ArtifactSnapshot, CandidateArtifacts, CandidateId, GovernanceParams,
    PortfolioState, ReturnSeries,
};
use algo_admission_gates::DominanceProof;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

const TREND: [f64; 8] = [0.01, 0.02, 0.03, 0.04, 0.05, 0.06, 0.07, 0.08];
const TREND_NOISY: [f64; 8] = [0.012, 0.019, 0.031, 0.040, 0.048, 0.062, 0.071, 0.079];
const ALTERNATING: [f64; 8] = [0.01, -0.01, 0.01, -0.01, 0.01, -0.01, 0.01, -0.01];

fn id(s: &str) -> CandidateId {
    CandidateId::from(s)
}

fn ids(names: &[&str]) -> Vec<CandidateId> {
    names.iter().map(|n| id(n)).collect()
}

fn series(values: &[f64]) -> ReturnSeries {
    let base = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    ReturnSeries::from_points(
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (base + Duration::days(i as i64), *v)),
    )
}

fn artifacts(
    values: &[f64],
    score: f64,
    drawdown: Decimal,
    bucket: Option<&str>,
) -> CandidateArtifacts {
    CandidateArtifacts {
        downstream_admissible: Some(true),
        returns: Some(series(values)),
        score: Some(score),
        max_drawdown: Some(drawdown),
        bucket: bucket.map(str::to_string),
    }
}

fn params(risk_budget_max: Decimal) -> GovernanceParams {
    GovernanceParams {
        version: "2024.06".to_string(),
        max_pairwise_correlation: 0.7,
        max_member_correlation: 0.7,
        risk_budget_max,
        min_overlap_days: 5,
        bucket_capacities: BTreeMap::from([("trend".to_string(), 1)]),
    }
}

fn controller(params: GovernanceParams, snapshot: ArtifactSnapshot) -> AdmissionController {
    AdmissionController::new(Arc::new(params), Arc::new(snapshot))
        .unwrap()
        .with_evaluated_at(Utc.with_ymd_and_hms(2024, 6, 30, 18, 0, 0).unwrap())
}

fn scenario_a_snapshot() -> ArtifactSnapshot {
    ArtifactSnapshot::new("2024Q2")
        .with_candidate("A", artifacts(&TREND, 1.0, dec!(0.10), None))
        .with_candidate("B", artifacts(&TREND_NOISY, 1.0, dec!(0.10), None))
        .with_candidate("C", artifacts(&ALTERNATING, 1.0, dec!(0.10), None))
}

fn read(dir: &Path, file: &str) -> String {
    fs::read_to_string(dir.join(file)).unwrap()
}

#[test]
fn scenario_a_equal_scores_keep_smaller_id() {
    let outcome = controller(params(dec!(1.0)), scenario_a_snapshot())
        .evaluate(&ids(&["C", "B", "A"]), &PortfolioState::new("core"));
    let decision = &outcome.decision;

    assert_eq!(decision.verdict, Verdict::Admitted);
    assert_eq!(decision.admitted_run_ids, ids(&["A", "C"]));
    assert_eq!(decision.rejected_run_ids, ids(&["B"]));
    assert!(decision.reasons[&id("B")].contains("correlation_violation"));

    let peers = decision.correlation_violations.as_ref().unwrap();
    assert_eq!(peers[&id("A")], ids(&["B"]));
    assert!(!peers.contains_key(&id("C")));

    let ab = outcome.correlation.matrix.get(&id("A"), &id("B")).unwrap();
    let ac = outcome.correlation.matrix.get(&id("A"), &id("C")).unwrap();
    assert!(ab > 0.9);
    assert!(ac.abs() < 0.7);
    assert!(outcome.correlation.matrix.is_symmetric());
}

#[test]
fn scenario_b_precondition_failure_wins_over_everything() {
    let mut blocked = artifacts(&ALTERNATING, 99.0, dec!(0.01), None);
    blocked.downstream_admissible = Some(false);
    let snapshot = scenario_a_snapshot().with_candidate("X", blocked);

    let decision = controller(params(dec!(1.0)), snapshot)
        .evaluate(&ids(&["A", "X"]), &PortfolioState::new("core"))
        .decision;

    assert!(decision.rejected_run_ids.contains(&id("X")));
    assert!(decision.reasons[&id("X")].contains("downstream_admissible"));
    assert_eq!(decision.rejection_stages[&id("X")], RejectionStage::Precondition);
    assert_eq!(decision.admitted_run_ids, ids(&["A"]));
}

#[test]
fn scenario_c_ceiling_below_every_candidate() {
    let snapshot = ArtifactSnapshot::new("2024Q2")
        .with_candidate("A", artifacts(&TREND, 1.0, dec!(0.10), None))
        .with_candidate("C", artifacts(&ALTERNATING, 2.0, dec!(-0.15), None));

    let outcome = controller(params(dec!(0.05)), snapshot)
        .evaluate(&ids(&["A", "C"]), &PortfolioState::new("core"));

    assert_eq!(outcome.decision.verdict, Verdict::Rejected);
    assert!(outcome.decision.admitted_run_ids.is_empty());
    let steps = outcome.decision.risk_budget_steps.as_ref().unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].rejected_candidate, id("A"));
    assert_eq!(steps[0].portfolio_risk_before, dec!(0.25));
    assert!(steps.iter().all(|s| s.portfolio_risk_after < s.portfolio_risk_before));
}

fn replacement_setup() -> (AdmissionController, PortfolioState) {
    let snapshot = ArtifactSnapshot::new("2024Q2")
        .with_candidate("new", artifacts(&TREND_NOISY, 2.0, dec!(0.20), Some("trend")))
        .with_candidate("old", artifacts(&TREND, 1.0, dec!(0.30), Some("trend")))
        .with_candidate("other", artifacts(&ALTERNATING, 1.0, dec!(0.25), None));
    let portfolio = PortfolioState::new("core")
        .with_member("old", Some("trend"))
        .with_member("other", None);
    (controller(params(dec!(0.5)), snapshot), portfolio)
}

fn dominance_proof() -> DominanceProof {
    DominanceProof {
        candidate: id("new"),
        incumbent: id("old"),
        expected_score_new: Some(2.0),
        expected_score_old: Some(1.0),
        risk_adjusted_score_new: Some(1.4),
        risk_adjusted_score_old: Some(0.9),
    }
}

#[test]
fn scenario_d_valid_proof_admits_despite_incumbent_violation() {
    let (controller, portfolio) = replacement_setup();

    let plain = controller.evaluate(&ids(&["new"]), &portfolio);
    assert_eq!(plain.decision.verdict, Verdict::Rejected);
    assert_eq!(plain.decision.rejection_stages[&id("new")], RejectionStage::Diversity);

    let request = ReplacementRequest {
        candidate: id("new"),
        incumbent: id("old"),
        replacement_mode: true,
        proof: Some(dominance_proof()),
    };
    let replacement = controller.evaluate_replacement(&request, &portfolio);

    assert!(replacement.record.effective);
    assert_eq!(replacement.outcome.decision.admitted_run_ids, ids(&["new"]));
    assert_eq!(replacement.record.waived_violations.len(), 1);
    assert!(replacement.record.diversity_waiver.as_ref().unwrap().contains("replacement mode"));
    assert_eq!(replacement.record.incumbent_risk_released, Some(dec!(0.30)));
    // incumbent risk released: 0.25 committed + 0.20 candidate fits 0.5
    assert_eq!(replacement.outcome.risk_budget.committed_risk, dec!(0.25));

    let root = tempfile::tempdir().unwrap();
    let writer = EvidenceWriter::new(root.path());
    let manifest = writer.write_replacement(&replacement, controller.params()).unwrap();
    let dir = writer.bundle_dir("core").unwrap();

    let record: ReplacementRecord =
        serde_json::from_str(&read(&dir, "replacement_decision.json")).unwrap();
    assert_eq!(record, replacement.record);
    assert!(manifest.files.contains_key("replacement_decision.json"));
    assert!(!dir.join("rejection_artifact.json").exists());
}

#[test]
fn replacement_still_rejects_violations_against_other_members() {
    let (controller, portfolio) = replacement_setup();
    // candidate now tracks the non-incumbent member
    let snapshot = controller
        .artifacts()
        .clone()
        .with_candidate("new", artifacts(&ALTERNATING, 2.0, dec!(0.20), Some("trend")));
    let controller = self::controller(controller.params().clone(), snapshot);

    let request = ReplacementRequest {
        candidate: id("new"),
        incumbent: id("old"),
        replacement_mode: true,
        proof: Some(dominance_proof()),
    };
    let replacement = controller.evaluate_replacement(&request, &portfolio);

    assert!(replacement.record.effective);
    assert_eq!(replacement.outcome.decision.rejected_run_ids, ids(&["new"]));
    assert!(replacement.outcome.decision.reasons[&id("new")].contains("max_member_correlation"));
}

#[test]
fn scenario_e_incomplete_proof_equals_plain_mode() {
    let (controller, portfolio) = replacement_setup();
    let mut incomplete = dominance_proof();
    incomplete.risk_adjusted_score_new = None;

    let with_bad_proof = controller.evaluate_replacement(
        &ReplacementRequest {
            candidate: id("new"),
            incumbent: id("old"),
            replacement_mode: true,
            proof: Some(incomplete),
        },
        &portfolio,
    );
    let without_mode = controller.evaluate_replacement(
        &ReplacementRequest {
            candidate: id("new"),
            incumbent: id("old"),
            replacement_mode: false,
            proof: Some(dominance_proof()),
        },
        &portfolio,
    );
    let plain = controller.evaluate(&ids(&["new"]), &portfolio);

    assert!(!with_bad_proof.record.effective);
    assert!(with_bad_proof
        .record
        .fallback_reason
        .as_ref()
        .unwrap()
        .contains("risk_adjusted_score_new missing"));
    assert_eq!(with_bad_proof.outcome, plain);
    assert_eq!(without_mode.outcome, plain);
}

#[test]
fn decision_is_invariant_under_permutation() {
    let controller = controller(params(dec!(0.25)), scenario_a_snapshot());
    let portfolio = PortfolioState::new("core");

    let orders = [
        ids(&["A", "B", "C"]),
        ids(&["C", "B", "A"]),
        ids(&["B", "A", "C", "A"]),
    ];
    let outcomes: Vec<_> = orders.iter().map(|o| controller.evaluate(o, &portfolio)).collect();

    assert!(outcomes.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn partition_covers_every_candidate_exactly_once() {
    let mut no_series = artifacts(&TREND, 1.0, dec!(0.1), None);
    no_series.returns = None;
    let mut no_score = artifacts(&ALTERNATING, 1.0, dec!(0.1), None);
    no_score.score = None;
    let mut blocked = artifacts(&TREND, 1.0, dec!(0.1), None);
    blocked.downstream_admissible = None;
    let snapshot = scenario_a_snapshot()
        .with_candidate("D", no_series)
        .with_candidate("E", blocked)
        .with_candidate("F", artifacts(&ALTERNATING, 0.5, dec!(0.1), Some("trend")))
        .with_candidate("G", artifacts(&TREND, 0.5, dec!(0.1), Some("trend")))
        .with_candidate("H", no_score);

    let input = ids(&["A", "B", "C", "D", "E", "F", "G", "H"]);
    let outcome =
        controller(params(dec!(0.15)), snapshot).evaluate(&input, &PortfolioState::new("core"));
    let decision = &outcome.decision;

    let admitted: BTreeSet<_> = decision.admitted_run_ids.iter().cloned().collect();
    let rejected: BTreeSet<_> = decision.rejected_run_ids.iter().cloned().collect();
    let missing: BTreeSet<_> = decision.missing_ids().into_iter().collect();

    assert!(admitted.is_disjoint(&rejected));
    assert!(admitted.is_disjoint(&missing));
    assert!(rejected.is_disjoint(&missing));
    let union: BTreeSet<_> = admitted.union(&rejected).chain(missing.iter()).cloned().collect();
    assert_eq!(union, input.iter().cloned().collect::<BTreeSet<_>>());
    assert_eq!(missing, BTreeSet::from([id("D"), id("H")]));

    let explained: BTreeSet<_> = decision.reasons.keys().cloned().collect();
    assert_eq!(explained, rejected.union(&missing).cloned().collect::<BTreeSet<_>>());
    assert_eq!(decision.rejection_stages[&id("E")], RejectionStage::Precondition);
    assert_eq!(decision.rejection_stages[&id("G")], RejectionStage::Correlation);

    let in_matrix: BTreeSet<_> = outcome.correlation.matrix.ids.iter().cloned().collect();
    assert!(in_matrix.is_disjoint(&missing));
    assert!(!in_matrix.contains(&id("E")));
}

#[test]
fn bucket_slot_is_not_held_by_a_candidate_rejected_later() {
    // M shares A's returns but sits in no bucket
    let snapshot = ArtifactSnapshot::new("2024Q2")
        .with_candidate("A", artifacts(&TREND, 1.0, dec!(0.10), Some("trend")))
        .with_candidate("B", artifacts(&ALTERNATING, 1.0, dec!(0.10), Some("trend")))
        .with_candidate("M", artifacts(&TREND, 1.0, dec!(0.10), None));
    let portfolio = PortfolioState::new("core").with_member("M", None);

    let decision = controller(params(dec!(1.0)), snapshot)
        .evaluate(&ids(&["A", "B"]), &portfolio)
        .decision;

    assert_eq!(decision.admitted_run_ids, ids(&["B"]));
    assert_eq!(decision.rejected_run_ids, ids(&["A"]));
    assert!(decision.reasons[&id("A")].contains("max_member_correlation"));
    assert!(!decision.reasons.contains_key(&id("B")));
}

#[test]
fn evidence_is_byte_identical_for_identical_inputs() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let portfolio = PortfolioState::new("core");

    let (_, m1) = controller(params(dec!(1.0)), scenario_a_snapshot())
        .evaluate_and_write_evidence(
            &ids(&["A", "B", "C"]),
            &portfolio,
            &EvidenceWriter::new(first.path()),
        )
        .unwrap();
    let (_, m2) = controller(params(dec!(1.0)), scenario_a_snapshot())
        .evaluate_and_write_evidence(
            &ids(&["C", "A", "B"]),
            &portfolio,
            &EvidenceWriter::new(second.path()),
        )
        .unwrap();

    assert_eq!(m1, m2);
    let d1 = first.path().join("core").join("admission");
    let d2 = second.path().join("core").join("admission");
    for file in m1.files.keys() {
        let bytes = fs::read(d1.join(file)).unwrap();
        assert_eq!(bytes, fs::read(d2.join(file)).unwrap(), "{file} differs");
        assert_eq!(sha256_hex(&bytes), m1.files[file]);
        assert!(bytes.ends_with(b"\n"));
    }
    assert_eq!(read(&d1, "evidence_manifest.json"), read(&d2, "evidence_manifest.json"));
}

#[test]
fn evidence_bundle_contains_every_artifact() {
    let root = tempfile::tempdir().unwrap();
    let writer = EvidenceWriter::new(root.path());
    let controller = controller(params(dec!(1.0)), scenario_a_snapshot());
    let (outcome, manifest) = controller
        .evaluate_and_write_evidence(&ids(&["A", "B", "C"]), &PortfolioState::new("core"), &writer)
        .unwrap();
    let dir = writer.bundle_dir("core").unwrap();

    for file in [
        "admission_decision.json",
        "governance_params_snapshot.json",
        "correlation_matrix.json",
        "correlation_violations.json",
        "risk_budget_steps.json",
        "diversity_checks.json",
        "admitted_run_ids.json",
        "rejected_run_ids.json",
    ] {
        assert!(manifest.files.contains_key(file), "{file} missing from manifest");
        assert!(dir.join(file).exists());
    }

    let admitted: Vec<CandidateId> =
        serde_json::from_str(&read(&dir, "admitted_run_ids.json")).unwrap();
    assert_eq!(admitted, outcome.decision.admitted_run_ids);

    let snapshot: serde_json::Value =
        serde_json::from_str(&read(&dir, "governance_params_snapshot.json")).unwrap();
    assert_eq!(snapshot["sha256"], controller.params_hash());
    assert_eq!(snapshot["params"]["version"], "2024.06");

    let decision = read(&dir, "admission_decision.json");
    assert!(decision.contains("\"evaluated_at\": \"2024-06-30T18:00:00Z\""));
}

#[test]
fn rejection_artifact_written_then_removed() {
    let root = tempfile::tempdir().unwrap();
    let writer = EvidenceWriter::new(root.path());
    let dir = writer.bundle_dir("core").unwrap();
    let portfolio = PortfolioState::new("core");
    let snapshot = scenario_a_snapshot();

    controller(params(dec!(0.05)), snapshot.clone())
        .evaluate_and_write_evidence(&ids(&["A", "B", "C"]), &portfolio, &writer)
        .unwrap();
    let artifact: RejectionArtifact =
        serde_json::from_str(&read(&dir, "rejection_artifact.json")).unwrap();

    assert_eq!(artifact.governance_rule, "CORRELATION_LIMIT");
    assert_eq!(artifact.governance_rules, vec!["CORRELATION_LIMIT", "RISK_BUDGET"]);
    assert_eq!(artifact.affected_run_ids, ids(&["A", "B", "C"]));
    assert_eq!(artifact.metrics.candidate_count, 3);
    assert_eq!(artifact.metrics.admitted_count, 0);
    assert_eq!(artifact.metrics.violation_count, 1);
    assert_eq!(artifact.metrics.risk_budget_step_count, 2);
    assert!(artifact.reason.contains("1 correlation"));

    let (_, manifest) = controller(params(dec!(1.0)), snapshot)
        .evaluate_and_write_evidence(&ids(&["A", "B", "C"]), &portfolio, &writer)
        .unwrap();
    assert!(!dir.join("rejection_artifact.json").exists());
    assert!(!manifest.files.contains_key("rejection_artifact.json"));
}

#[test]
fn unsafe_portfolio_id_is_refused() {
    let root = tempfile::tempdir().unwrap();
    let result = controller(params(dec!(1.0)), scenario_a_snapshot()).evaluate_and_write_evidence(
        &ids(&["A"]),
        &PortfolioState::new("../escape"),
        &EvidenceWriter::new(root.path()),
    );
    assert!(result.is_err());
}

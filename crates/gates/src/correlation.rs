//! Pairwise correlation gate.
//!
//! Builds the full correlation matrix over candidates (and live portfolio
//! members), detects every pair above its limit and resolves the conflicts
//! into a reject list. Severity ordering and the per-violation reject choice
//! are separate functions so each can be checked on its own.

use algo_admission_core::{pearson, CandidateId, GovernanceParams, ReturnSeries};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Correlation limits taken from the governance snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationLimits {
    /// Candidate vs candidate.
    pub max_pairwise: f64,
    /// Candidate vs live member.
    pub max_member: f64,
    pub min_overlap_days: usize,
}

impl From<&GovernanceParams> for CorrelationLimits {
    fn from(params: &GovernanceParams) -> Self {
        Self {
            max_pairwise: params.max_pairwise_correlation,
            max_member: params.max_member_correlation,
            min_overlap_days: params.min_overlap_days,
        }
    }
}

/// Which limit a pair is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairKind {
    /// Both sides are candidates of this run.
    Candidate,
    /// One side is a live portfolio member.
    Member,
}

impl std::fmt::Display for PairKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Candidate => write!(f, "max_pairwise_correlation"),
            Self::Member => write!(f, "max_member_correlation"),
        }
    }
}

/// A pair whose absolute correlation exceeds its limit. `candidate_a` is
/// always the lexicographically smaller id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationViolation {
    pub candidate_a: CandidateId,
    pub candidate_b: CandidateId,
    pub abs_correlation: f64,
    pub threshold: f64,
    pub kind: PairKind,
}

impl CorrelationViolation {
    /// The opposite side of the pair, if `id` is part of it.
    #[must_use]
    pub fn other(&self, id: &CandidateId) -> Option<&CandidateId> {
        if &self.candidate_a == id {
            Some(&self.candidate_b)
        } else if &self.candidate_b == id {
            Some(&self.candidate_a)
        } else {
            None
        }
    }
}

/// Symmetric correlation matrix in id order.
///
/// `None` marks a pair without enough common dates; such a pair is unknown,
/// not uncorrelated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub ids: Vec<CandidateId>,
    pub values: Vec<Vec<Option<f64>>>,
    pub overlap_days: Vec<Vec<usize>>,
    pub min_overlap_days: usize,
}

impl CorrelationMatrix {
    fn index_of(&self, id: &CandidateId) -> Option<usize> {
        self.ids.binary_search(id).ok()
    }

    /// Correlation of a pair, `None` if either id is unknown or the pair is invalid.
    #[must_use]
    pub fn get(&self, a: &CandidateId, b: &CandidateId) -> Option<f64> {
        let (i, j) = (self.index_of(a)?, self.index_of(b)?);
        self.values[i][j]
    }

    #[must_use]
    pub fn overlap(&self, a: &CandidateId, b: &CandidateId) -> Option<usize> {
        let (i, j) = (self.index_of(a)?, self.index_of(b)?);
        Some(self.overlap_days[i][j])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// True if every entry mirrors its transpose bit-for-bit and the diagonal is 1.0.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        let n = self.ids.len();
        (0..n).all(|i| {
            self.values[i][i] == Some(1.0)
                && (0..n).all(|j| {
                    self.values[i][j].map(f64::to_bits) == self.values[j][i].map(f64::to_bits)
                })
        })
    }
}

/// Everything the correlation gate decided, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationGateResult {
    pub admitted: Vec<CandidateId>,
    pub rejected: Vec<CandidateId>,
    pub reasons: BTreeMap<CandidateId, String>,
    /// Every violation in severity order, including ones that rejected nobody.
    pub violations: Vec<CorrelationViolation>,
    /// Violations against waived members; recorded, never enforced.
    pub waived: Vec<CorrelationViolation>,
    /// Pairs whose correlation was undefined and coerced to 0.0.
    pub nan_fallbacks: Vec<(CandidateId, CandidateId)>,
    pub matrix: CorrelationMatrix,
}

impl CorrelationGateResult {
    /// Peers each candidate violated a limit with.
    #[must_use]
    pub fn violation_peers(&self) -> BTreeMap<CandidateId, Vec<CandidateId>> {
        let mut peers: BTreeMap<CandidateId, BTreeSet<CandidateId>> = BTreeMap::new();
        for v in &self.violations {
            peers
                .entry(v.candidate_a.clone())
                .or_default()
                .insert(v.candidate_b.clone());
            peers
                .entry(v.candidate_b.clone())
                .or_default()
                .insert(v.candidate_a.clone());
        }
        peers
            .into_iter()
            .map(|(id, set)| (id, set.into_iter().collect()))
            .collect()
    }
}

pub struct CorrelationGate {
    limits: CorrelationLimits,
}

impl CorrelationGate {
    #[must_use]
    pub const fn new(limits: CorrelationLimits) -> Self {
        Self { limits }
    }

    /// Evaluates a candidate set on its own.
    #[must_use]
    pub fn evaluate(
        &self,
        candidate_ids: &[CandidateId],
        series: &BTreeMap<CandidateId, ReturnSeries>,
        scores: &BTreeMap<CandidateId, f64>,
    ) -> CorrelationGateResult {
        self.evaluate_with_members(candidate_ids, &[], &BTreeSet::new(), series, scores)
    }

    /// Evaluates candidates against each other and against live members.
    ///
    /// Members are fixed: a member-side violation always rejects the
    /// candidate. Member-member pairs are not checked. Violations against a
    /// member in `waived_members` are recorded in `waived` and enforce nothing.
    #[must_use]
    pub fn evaluate_with_members(
        &self,
        candidate_ids: &[CandidateId],
        members: &[CandidateId],
        waived_members: &BTreeSet<CandidateId>,
        series: &BTreeMap<CandidateId, ReturnSeries>,
        scores: &BTreeMap<CandidateId, f64>,
    ) -> CorrelationGateResult {
        let candidates: BTreeSet<CandidateId> = candidate_ids.iter().cloned().collect();
        let members: BTreeSet<CandidateId> = members
            .iter()
            .filter(|m| !candidates.contains(*m))
            .cloned()
            .collect();
        let ids: Vec<CandidateId> = candidates.union(&members).cloned().collect();

        let (matrix, nan_fallbacks) = self.build_matrix(&ids, series);

        let mut violations = Vec::new();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let (a, b) = (&ids[i], &ids[j]);
                let member_pair = members.contains(a) || members.contains(b);
                if members.contains(a) && members.contains(b) {
                    continue;
                }
                let Some(correlation) = matrix.values[i][j] else {
                    continue;
                };
                let (kind, threshold) = if member_pair {
                    (PairKind::Member, self.limits.max_member)
                } else {
                    (PairKind::Candidate, self.limits.max_pairwise)
                };
                if correlation.abs() > threshold {
                    violations.push(CorrelationViolation {
                        candidate_a: a.clone(),
                        candidate_b: b.clone(),
                        abs_correlation: correlation.abs(),
                        threshold,
                        kind,
                    });
                }
            }
        }
        violations.sort_by(|x, y| severity_order(x, y, scores));

        let (reasons, waived) = resolve_violations(&violations, scores, &members, waived_members);

        let admitted: Vec<CandidateId> = candidates
            .iter()
            .filter(|id| !reasons.contains_key(*id))
            .cloned()
            .collect();
        let rejected: Vec<CandidateId> = reasons.keys().cloned().collect();

        info!(
            candidates = candidates.len(),
            members = members.len(),
            violations = violations.len(),
            waived = waived.len(),
            rejected = rejected.len(),
            "Correlation gate evaluated"
        );

        CorrelationGateResult {
            admitted,
            rejected,
            reasons,
            violations,
            waived,
            nan_fallbacks,
            matrix,
        }
    }

    fn build_matrix(
        &self,
        ids: &[CandidateId],
        series: &BTreeMap<CandidateId, ReturnSeries>,
    ) -> (CorrelationMatrix, Vec<(CandidateId, CandidateId)>) {
        let n = ids.len();
        let mut values = vec![vec![None; n]; n];
        let mut overlap_days = vec![vec![0_usize; n]; n];
        let mut nan_fallbacks = Vec::new();

        for i in 0..n {
            values[i][i] = Some(1.0);
            overlap_days[i][i] = series.get(&ids[i]).map_or(0, ReturnSeries::len);

            for j in (i + 1)..n {
                let (Some(sa), Some(sb)) = (series.get(&ids[i]), series.get(&ids[j])) else {
                    continue;
                };
                let (xa, xb) = sa.align(sb);
                overlap_days[i][j] = xa.len();
                overlap_days[j][i] = xa.len();

                if xa.len() < self.limits.min_overlap_days {
                    debug!(
                        a = %ids[i],
                        b = %ids[j],
                        overlap = xa.len(),
                        required = self.limits.min_overlap_days,
                        "Insufficient overlap, pair marked invalid"
                    );
                    continue;
                }

                let mut correlation = pearson(&xa, &xb);
                if correlation.is_nan() {
                    warn!(
                        a = %ids[i],
                        b = %ids[j],
                        overlap = xa.len(),
                        "Correlation undefined (zero variance), falling back to 0.0"
                    );
                    correlation = 0.0;
                    nan_fallbacks.push((ids[i].clone(), ids[j].clone()));
                }
                values[i][j] = Some(correlation);
                values[j][i] = Some(correlation);
            }
        }

        (
            CorrelationMatrix {
                ids: ids.to_vec(),
                values,
                overlap_days,
                min_overlap_days: self.limits.min_overlap_days,
            },
            nan_fallbacks,
        )
    }
}

/// Finite score or the lowest possible value for a missing one.
fn score_of(id: &CandidateId, scores: &BTreeMap<CandidateId, f64>) -> f64 {
    scores
        .get(id)
        .copied()
        .filter(|s| s.is_finite())
        .unwrap_or(f64::MIN)
}

/// Order in which violations are resolved: highest |correlation| first, then
/// lower combined score, then the pair ids.
#[must_use]
pub fn severity_order(
    x: &CorrelationViolation,
    y: &CorrelationViolation,
    scores: &BTreeMap<CandidateId, f64>,
) -> Ordering {
    let combined = |v: &CorrelationViolation| {
        score_of(&v.candidate_a, scores) + score_of(&v.candidate_b, scores)
    };

    y.abs_correlation
        .total_cmp(&x.abs_correlation)
        .then_with(|| combined(x).partial_cmp(&combined(y)).unwrap_or(Ordering::Equal))
        .then_with(|| x.candidate_a.cmp(&y.candidate_a))
        .then_with(|| x.candidate_b.cmp(&y.candidate_b))
}

/// Side of a single violation to reject.
///
/// A member is never rejected. Otherwise the strictly lower score loses and
/// equal scores reject the lexicographically larger id.
#[must_use]
pub fn choose_reject<'a>(
    violation: &'a CorrelationViolation,
    scores: &BTreeMap<CandidateId, f64>,
    members: &BTreeSet<CandidateId>,
) -> &'a CandidateId {
    let (a, b) = (&violation.candidate_a, &violation.candidate_b);
    if members.contains(a) {
        return b;
    }
    if members.contains(b) {
        return a;
    }
    match score_of(a, scores).partial_cmp(&score_of(b, scores)) {
        Some(Ordering::Less) => a,
        Some(Ordering::Greater) => b,
        _ => std::cmp::max(a, b),
    }
}

/// Walks violations in the given order, rejecting one side of each.
///
/// Violations touching an already rejected candidate are skipped. Returns the
/// reject reasons and the waived violations.
#[must_use]
pub fn resolve_violations(
    violations: &[CorrelationViolation],
    scores: &BTreeMap<CandidateId, f64>,
    members: &BTreeSet<CandidateId>,
    waived_members: &BTreeSet<CandidateId>,
) -> (BTreeMap<CandidateId, String>, Vec<CorrelationViolation>) {
    let mut reasons: BTreeMap<CandidateId, String> = BTreeMap::new();
    let mut waived = Vec::new();

    for violation in violations {
        let waiver_applies = violation.kind == PairKind::Member
            && (waived_members.contains(&violation.candidate_a)
                || waived_members.contains(&violation.candidate_b));
        if waiver_applies {
            info!(
                a = %violation.candidate_a,
                b = %violation.candidate_b,
                abs_correlation = violation.abs_correlation,
                "Correlation violation waived"
            );
            waived.push(violation.clone());
            continue;
        }

        if reasons.contains_key(&violation.candidate_a)
            || reasons.contains_key(&violation.candidate_b)
        {
            debug!(
                a = %violation.candidate_a,
                b = %violation.candidate_b,
                "Violation already resolved by an earlier rejection"
            );
            continue;
        }

        let loser = choose_reject(violation, scores, members);
        let winner = violation.other(loser).unwrap_or(loser);
        reasons.insert(
            loser.clone(),
            format!(
                "correlation_violation: |corr({loser}, {winner})| = {:.4} exceeds {} {:.4}",
                violation.abs_correlation, violation.kind, violation.threshold
            ),
        );
    }

    (reasons, waived)
}

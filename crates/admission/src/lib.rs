//! Portfolio admission: the controller that runs the gate pipeline, the
//! decision model, replacement handling and evidence bundles.

pub mod controller;
pub mod decision;
pub mod decision_formatter;
pub mod evidence;
pub mod replacement;

pub use controller::{AdmissionController, AdmissionOutcome};
pub use decision::{
    AdmissionDecision, MissingArtifact, ReasonLedger, RejectionStage, StageRejections, Verdict,
    EVALUATED_AT_FORMAT,
};
pub use decision_formatter::DecisionFormatter;
pub use evidence::{EvidenceManifest, EvidenceWriter, RejectionArtifact, RejectionMetrics};
pub use replacement::{ReplacementOutcome, ReplacementRecord, ReplacementRequest};

#![allow(clippy::format_push_string)]
#![allow(clippy::uninlined_format_args)]

use crate::decision::AdmissionDecision;
use crate::evidence::EvidenceManifest;

const RULE: &str = "───────────────────────────────────────────────────────────────\n";
const BANNER: &str = "═══════════════════════════════════════════════════════════════\n";

pub struct DecisionFormatter;

impl DecisionFormatter {
    #[must_use]
    pub fn format(decision: &AdmissionDecision) -> String {
        let mut output = String::new();

        output.push('\n');
        output.push_str(BANNER);
        output.push_str("                    ADMISSION DECISION                         \n");
        output.push_str(BANNER);
        output.push('\n');

        // Run
        output.push_str("Run\n");
        output.push_str(RULE);
        output.push_str(&format!("Portfolio:             {}\n", decision.portfolio_id));
        output.push_str(&format!("Season:                {}\n", decision.season));
        output.push_str(&format!("Evaluated At:          {}\n", decision.evaluated_at));
        output.push_str(&format!(
            "Governance Hash:       {}\n",
            short_hash(&decision.governance_params_hash)
        ));
        output.push_str(&format!("Verdict:               {}\n", decision.verdict));
        output.push('\n');

        // Admitted
        output.push_str(&format!("Admitted ({})\n", decision.admitted_run_ids.len()));
        output.push_str(RULE);
        if decision.admitted_run_ids.is_empty() {
            output.push_str("  (none)\n");
        }
        for id in &decision.admitted_run_ids {
            output.push_str(&format!("  {}\n", id));
        }
        output.push('\n');

        // Rejected and dropped
        output.push_str(&format!("Rejected / Dropped ({})\n", decision.reasons.len()));
        output.push_str(RULE);
        if decision.reasons.is_empty() {
            output.push_str("  (none)\n");
        }
        for (id, reason) in &decision.reasons {
            let stage = decision
                .rejection_stages
                .get(id)
                .map_or_else(String::new, |s| format!("[{}] ", s));
            output.push_str(&format!("  {:<20} {}{}\n", id.as_str(), stage, reason));
        }

        if let Some(steps) = &decision.risk_budget_steps {
            output.push('\n');
            output.push_str("Risk Budget Steps\n");
            output.push_str(RULE);
            for step in steps {
                output.push_str(&format!(
                    "  #{:<3} {:<20} {} -> {}\n",
                    step.iteration,
                    step.rejected_candidate.as_str(),
                    step.portfolio_risk_before,
                    step.portfolio_risk_after
                ));
            }
        }

        output.push('\n');
        output.push_str(BANNER);

        output
    }

    #[must_use]
    pub fn format_manifest(manifest: &EvidenceManifest) -> String {
        let mut output = String::new();
        output.push_str("Evidence\n");
        output.push_str(RULE);
        for (file, digest) in &manifest.files {
            output.push_str(&format!("  {:<36} {}\n", file, short_hash(digest)));
        }
        output.push_str(&format!(
            "  Bundle hash:                         {}\n",
            manifest.bundle_hash
        ));
        output
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

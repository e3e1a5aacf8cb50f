//! Check-config command: loads and validates a governance file and prints
//! the resolved values with their snapshot hash.

use algo_admission_core::canonical_json_pretty;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use super::admit::load_params;

/// Arguments for the check-config command.
#[derive(Args, Debug, Clone)]
pub struct CheckConfigArgs {
    /// Governance parameters file (TOML or JSON)
    #[arg(short, long, env = "ADMISSION_GOVERNANCE")]
    pub governance: PathBuf,

    /// Profile overlay merged over the governance file
    #[arg(long)]
    pub profile: Option<String>,
}

/// Runs the check-config command.
///
/// # Errors
/// Returns an error if the configuration is missing, malformed or invalid.
pub fn run_check_config(args: &CheckConfigArgs) -> Result<()> {
    let params = load_params(&args.governance, args.profile.as_deref())?;
    let hash = params.snapshot_hash()?;

    tracing::info!(version = %params.version, hash = %hash, "Governance parameters valid");
    print!("{}", canonical_json_pretty(&params)?);
    println!("sha256: {hash}");
    Ok(())
}

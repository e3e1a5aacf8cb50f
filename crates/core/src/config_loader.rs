use crate::config::GovernanceParams;
use crate::error::{AdmissionError, Result};
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use std::path::{Path, PathBuf};

/// Environment prefix for governance overrides, e.g.
/// `ADMISSION_GOV_MAX_PAIRWISE_CORRELATION=0.65`.
pub const ENV_PREFIX: &str = "ADMISSION_GOV_";

pub struct GovernanceLoader;

impl GovernanceLoader {
    /// Loads and validates a governance snapshot from a TOML or JSON file,
    /// then applies `ADMISSION_GOV_` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Config`] if the file is missing, cannot be
    /// parsed, lacks a required limit, or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<GovernanceParams> {
        let path = path.as_ref();
        Self::extract(file_provider(path)?.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Loads a governance snapshot layered with a profile overlay.
    ///
    /// The overlay lives next to the base file as `<stem>.<profile>.<ext>`
    /// (e.g. `governance.toml` + `governance.strict.toml`) and must exist.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Config`] if either file is missing or the
    /// merged result is invalid.
    pub fn load_with_profile(path: impl AsRef<Path>, profile: &str) -> Result<GovernanceParams> {
        let path = path.as_ref();
        let overlay = profile_path(path, profile);
        let figment = file_provider(path)?
            .merge(file_provider(&overlay)?)
            .merge(Env::prefixed(ENV_PREFIX));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<GovernanceParams> {
        let params: GovernanceParams = figment.extract()?;
        params.validate()?;
        tracing::info!(
            version = %params.version,
            max_pairwise_correlation = params.max_pairwise_correlation,
            max_member_correlation = params.max_member_correlation,
            risk_budget_max = %params.risk_budget_max,
            min_overlap_days = params.min_overlap_days,
            buckets = params.bucket_capacities.len(),
            "Governance parameters loaded"
        );
        Ok(params)
    }
}

fn file_provider(path: &Path) -> Result<Figment> {
    if !path.is_file() {
        return Err(AdmissionError::Config(format!(
            "governance snapshot not found: {}",
            path.display()
        )));
    }
    let figment = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Figment::from(Json::file(path)),
        Some("toml") => Figment::from(Toml::file(path)),
        other => {
            return Err(AdmissionError::Config(format!(
                "unsupported governance snapshot format {:?}: {}",
                other.unwrap_or(""),
                path.display()
            )))
        }
    };
    Ok(figment)
}

fn profile_path(path: &Path, profile: &str) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("governance");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    path.with_file_name(format!("{stem}.{profile}.{ext}"))
}

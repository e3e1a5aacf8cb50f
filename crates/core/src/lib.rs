pub mod candidate;
pub mod config;
pub mod config_loader;
pub mod digest;
pub mod error;
pub mod returns;
pub mod snapshot;

pub use candidate::{CandidateArtifacts, CandidateId};
pub use config::GovernanceParams;
pub use config_loader::GovernanceLoader;
pub use digest::{canonical_json, canonical_json_pretty, digest_of, sha256_hex};
pub use error::{AdmissionError, Result};
pub use returns::{pearson, ReturnSeries};
pub use snapshot::{ArtifactSnapshot, PortfolioMember, PortfolioState};

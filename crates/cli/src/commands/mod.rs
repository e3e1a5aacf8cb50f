//! CLI commands for admission runs.

pub mod admit;
pub mod check_config;

pub use admit::{run_admit, AdmitArgs};
pub use check_config::{run_check_config, CheckConfigArgs};

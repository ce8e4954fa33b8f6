//! Command layer
//!
//! The operations the CLI exposes: `check` (load + validate + summary),
//! `plan` (show what a deployment would do) and `deploy` (run it).
//! Each command takes an Options struct and returns a serializable
//! report.

pub mod check;
pub mod deploy;
pub mod plan;

pub use check::{CheckCommand, CheckOptions, CheckReport};
pub use deploy::{DeployCommand, DeployOptions};
pub use plan::{PlanCommand, PlanOptions, PlanReport};

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

/// Default directory for downloaded archives
pub const DEFAULT_DOWNLOAD_DIR: &str = "installation_packages";

//! Deploy command: run the full pipeline.
//!
//! Load + validate, provision packages, prepare the staging area and
//! render artifacts, then stage archives and execute the install plans
//! over SSH.

use std::path::PathBuf;

use tracing::info;

use crate::config::ConfigLoader;
use crate::deploy::Deployer;
use crate::inventory::{Inventory, TargetGroup};
use crate::packages::{PackageProvisioner, PackageSet};
use crate::plan;
use crate::render::Staging;
use crate::report::DeployReport;

/// Options for the deploy command
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub config_path: PathBuf,
    pub download_dir: PathBuf,
    /// Re-download and re-upload archives that already exist
    pub overwrite: bool,
    /// Restrict execution to one inventory group
    pub limit: Option<TargetGroup>,
}

impl DeployOptions {
    pub fn new(config_path: impl Into<PathBuf>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            download_dir: download_dir.into(),
            overwrite: false,
            limit: None,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_limit(mut self, limit: TargetGroup) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Runs the deployment pipeline end to end
#[derive(Debug, Default)]
pub struct DeployCommand;

impl DeployCommand {
    pub fn new() -> Self {
        Self
    }

    pub fn execute(&self, options: &DeployOptions) -> anyhow::Result<DeployReport> {
        let config = ConfigLoader::new(&options.config_path).load()?;

        let mut inventory = Inventory::from_config(&config);
        if let Some(group) = options.limit {
            info!(%group, "Limiting deployment to one group");
            inventory = inventory.limited(group);
        }
        anyhow::ensure!(!inventory.is_empty(), "Deployment inventory is empty");

        let packages = PackageSet::from_config(&config);
        let provisioner =
            PackageProvisioner::new(&options.download_dir, config.http_proxy.clone());
        provisioner.prepare(&packages, options.overwrite)?;

        let staging = Staging::prepare(&config.deployment_base_dir)?;
        staging.render_artifacts(&config, &inventory)?;

        let plans = plan::build_plans(&packages, &staging)?;

        let deployer = Deployer::new(config, inventory, packages, plans, options.overwrite);
        deployer.run()
    }
}

//! Plan command: show the full deployment plan without touching the
//! network or the staging directory.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::ConfigLoader;
use crate::inventory::{Inventory, ServiceKind, TargetGroup};
use crate::packages::{PackageProvisioner, PackageSet, ProvisionAction};
use crate::plan::{self, Step};
use crate::render::Staging;

/// Options for the plan command
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub config_path: PathBuf,
    pub download_dir: PathBuf,
    pub overwrite: bool,
    pub limit: Option<TargetGroup>,
}

impl PlanOptions {
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

/// Everything a deployment would do
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    /// Download/keep decision per package
    pub provisioning: Vec<ProvisionAction>,
    /// Archive uploads to the source server
    pub staging: Vec<StagingUpload>,
    /// Per-service install plans with their hosts
    pub services: Vec<ServicePlan>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StagingUpload {
    pub service: ServiceKind,
    pub remote_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServicePlan {
    pub service: ServiceKind,
    pub hosts: Vec<String>,
    pub steps: Vec<Step>,
}

/// Computes the deployment plan from configuration alone
#[derive(Debug, Default)]
pub struct PlanCommand;

impl PlanCommand {
    pub fn new() -> Self {
        Self
    }

    pub fn execute(&self, options: &PlanOptions) -> anyhow::Result<PlanReport> {
        let config = ConfigLoader::new(&options.config_path).load()?;
        let mut inventory = Inventory::from_config(&config);
        if let Some(group) = options.limit {
            inventory = inventory.limited(group);
        }

        let packages = PackageSet::from_config(&config);
        let provisioner =
            PackageProvisioner::new(&options.download_dir, config.http_proxy.clone());
        let provisioning = provisioner.plan(&packages, options.overwrite);

        let remote_dir = PathBuf::from(&config.file_transfer.remote_path);
        let staging = packages
            .packages()
            .iter()
            .map(|package| StagingUpload {
                service: package.service,
                remote_path: remote_dir.join(package.service.archive_file()),
            })
            .collect();

        let staging_area = Staging::at(&config.deployment_base_dir);
        let services = plan::build_plans(&packages, &staging_area)?
            .into_iter()
            .map(|install_plan| ServicePlan {
                hosts: inventory
                    .for_service(install_plan.service)
                    .map(|t| t.entry.ip.clone())
                    .collect(),
                service: install_plan.service,
                steps: install_plan.steps,
            })
            .filter(|service_plan| !service_plan.hosts.is_empty())
            .collect();

        Ok(PlanReport {
            provisioning,
            staging,
            services,
        })
    }
}

//! Check command: load, validate and summarize a configuration.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::{ClusterMode, ConfigLoader};
use crate::inventory::{Inventory, TargetGroup};
use crate::packages::PackageSet;

/// Options for the check command
#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub config_path: PathBuf,
}

impl CheckOptions {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }
}

/// Summary of a valid configuration
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub config_path: PathBuf,
    pub cluster_mode: ClusterMode,
    pub groups: Vec<GroupSummary>,
    pub packages: Vec<PackageSummary>,
    pub proxy: ProxySummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub group: TargetGroup,
    pub hosts: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    pub service: crate::inventory::ServiceKind,
    pub local_path: PathBuf,
    /// Whether the local archive is already present
    pub available: bool,
    pub remote_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxySummary {
    pub direct: bool,
    pub url: Option<String>,
    pub verify_ssl: bool,
}

/// Loads and validates the configuration, producing a summary
#[derive(Debug, Default)]
pub struct CheckCommand;

impl CheckCommand {
    pub fn new() -> Self {
        Self
    }

    pub fn execute(&self, options: &CheckOptions) -> anyhow::Result<CheckReport> {
        let config = ConfigLoader::new(&options.config_path).load()?;
        let inventory = Inventory::from_config(&config);
        let packages = PackageSet::from_config(&config);

        let groups = [
            TargetGroup::PrometheusMaster,
            TargetGroup::PrometheusSlave,
            TargetGroup::NodeExporter,
            TargetGroup::Grafana,
        ]
        .into_iter()
        .map(|group| GroupSummary {
            group,
            hosts: inventory.group_len(group),
        })
        .filter(|summary| summary.hosts > 0)
        .collect();

        let packages = packages
            .packages()
            .iter()
            .map(|package| PackageSummary {
                service: package.service,
                available: package.local_path.exists(),
                local_path: package.local_path.clone(),
                remote_url: package.remote_url.clone(),
            })
            .collect();

        Ok(CheckReport {
            config_path: options.config_path.clone(),
            cluster_mode: config.prometheus_deployment.cluster_mode,
            groups,
            packages,
            proxy: ProxySummary {
                direct: config.http_proxy.is_direct(),
                url: config.http_proxy.url(),
                verify_ssl: config.http_proxy.verify_ssl,
            },
        })
    }
}

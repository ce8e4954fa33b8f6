//! Artifact rendering
//!
//! Prepares the local staging area under `deployment_base_dir` and
//! renders everything that later lands on remote hosts: the hosts
//! manifest, prometheus.yml, grafana.ini and the systemd units.

pub mod grafana;
pub mod prometheus;
pub mod systemd;

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use crate::config::DeployConfig;
use crate::inventory::{Inventory, ServiceKind};

pub const HOSTS_MANIFEST: &str = "hosts";
pub const PROMETHEUS_CONFIG: &str = "prometheus.yml";
pub const GRAFANA_CONFIG: &str = "grafana.ini";

/// Local staging area for rendered deployment artifacts
#[derive(Debug, Clone)]
pub struct Staging {
    base_dir: PathBuf,
}

impl Staging {
    /// Create the staging directory layout: `packages/` and `configs/`
    /// under the base directory.
    pub fn prepare(base_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let base_dir = base_dir.into();
        for dir in [
            base_dir.clone(),
            base_dir.join("packages"),
            base_dir.join("configs"),
        ] {
            std::fs::create_dir_all(&dir).with_context(|| {
                format!("Failed to create staging directory: {}", dir.display())
            })?;
        }
        info!(base = %base_dir.display(), "Staging area prepared");
        Ok(Self { base_dir })
    }

    /// Reference an existing (or future) staging area without touching
    /// the filesystem. Used when planning.
    pub fn at(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn configs_dir(&self) -> PathBuf {
        self.base_dir.join("configs")
    }

    /// Path of a rendered artifact inside `configs/`
    pub fn config_path(&self, file_name: &str) -> PathBuf {
        self.configs_dir().join(file_name)
    }

    /// Render all artifacts for this deployment into `configs/`.
    pub fn render_artifacts(
        &self,
        config: &DeployConfig,
        inventory: &Inventory,
    ) -> anyhow::Result<()> {
        self.write_artifact(HOSTS_MANIFEST, &inventory.hosts_manifest())?;
        self.write_artifact(
            PROMETHEUS_CONFIG,
            &prometheus::render_scrape_config(&config.prometheus_config)?,
        )?;
        self.write_artifact(GRAFANA_CONFIG, &grafana::render_ini(&config.grafana_config)?)?;
        self.write_artifact(
            &systemd::unit_file_name(ServiceKind::Prometheus),
            systemd::unit_for(ServiceKind::Prometheus),
        )?;
        self.write_artifact(
            &systemd::unit_file_name(ServiceKind::NodeExporter),
            systemd::unit_for(ServiceKind::NodeExporter),
        )?;
        Ok(())
    }

    fn write_artifact(&self, file_name: &str, content: &str) -> anyhow::Result<()> {
        let path = self.config_path(file_name);
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write artifact: {}", path.display()))?;
        info!(artifact = %path.display(), "Rendered artifact");
        Ok(())
    }
}

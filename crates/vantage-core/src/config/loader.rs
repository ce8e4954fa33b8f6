//! Reads config.yml, merges the secrets file and validates the result.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use super::schema::DeployConfig;
use super::secrets::{SecretsFile, merge_credentials};

/// Loads the deployment configuration from disk
#[derive(Debug)]
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load, merge and validate the configuration.
    ///
    /// The secrets file path is resolved relative to the directory
    /// containing config.yml.
    pub fn load(&self) -> anyhow::Result<DeployConfig> {
        let content = std::fs::read_to_string(&self.config_path).with_context(|| {
            format!(
                "Failed to read configuration file: {}",
                self.config_path.display()
            )
        })?;

        let mut config: DeployConfig = serde_yaml::from_str(&content).with_context(|| {
            format!(
                "Failed to parse configuration file: {}",
                self.config_path.display()
            )
        })?;

        let secrets_path = self.resolve_secrets_path(&config.server_secrets_file);
        debug!(path = %secrets_path.display(), "Reading secrets file");

        let secrets_content = std::fs::read_to_string(&secrets_path).with_context(|| {
            format!("Failed to read secrets file: {}", secrets_path.display())
        })?;
        let secrets: SecretsFile = serde_yaml::from_str(&secrets_content).with_context(|| {
            format!("Failed to parse secrets file: {}", secrets_path.display())
        })?;

        merge_credentials(&mut config, &secrets.server_credentials);

        config
            .validate()
            .with_context(|| format!("Invalid configuration: {}", self.config_path.display()))?;

        info!(
            config = %self.config_path.display(),
            cluster_mode = ?config.prometheus_deployment.cluster_mode,
            "Configuration loaded"
        );

        Ok(config)
    }

    fn resolve_secrets_path(&self, secrets_file: &str) -> PathBuf {
        let secrets = Path::new(secrets_file);
        if secrets.is_absolute() {
            return secrets.to_path_buf();
        }
        self.config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(secrets)
    }
}

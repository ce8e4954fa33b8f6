//! Configuration schema for config.yml
//!
//! Defines the structure of the deployment configuration: target host
//! groups, package sources, proxy settings and the per-service
//! configuration blocks that get rendered onto remote hosts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::inventory::ServiceKind;

/// Root configuration structure for config.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Local staging directory for rendered artifacts
    pub deployment_base_dir: PathBuf,

    /// Path to the credentials file, relative to config.yml
    pub server_secrets_file: String,

    /// Prometheus topology settings
    pub prometheus_deployment: PrometheusDeployment,

    /// Target host groups
    pub target_servers: TargetServers,

    /// Staging host for installation archives
    pub file_transfer: FileTransfer,

    /// Scrape settings, dumped verbatim to prometheus.yml
    pub prometheus_config: serde_yaml::Value,

    /// Dashboard settings, rendered as grafana.ini
    pub grafana_config: serde_yaml::Value,

    /// Service name -> local archive path (offline mode)
    pub packages: BTreeMap<String, PathBuf>,

    /// Proxy applied to remote downloads
    pub http_proxy: HttpProxy,

    /// Service name -> download URL (online mode)
    pub remote_packages: BTreeMap<String, String>,
}

/// Prometheus deployment topology
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusDeployment {
    /// Single-node vs. master/slave replication
    pub cluster_mode: ClusterMode,
}

/// Deployment topology flag for the metrics collector
///
/// Serialized as 0 (single) or 1 (cluster), matching the on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ClusterMode {
    /// One Prometheus instance on the master hosts only
    Single,
    /// Master plus slave replicas
    Cluster,
}

impl ClusterMode {
    /// Whether slave hosts participate in the deployment
    pub fn is_cluster(self) -> bool {
        matches!(self, ClusterMode::Cluster)
    }
}

impl TryFrom<u8> for ClusterMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ClusterMode::Single),
            1 => Ok(ClusterMode::Cluster),
            other => Err(format!(
                "prometheus_deployment.cluster_mode must be 0 or 1, got {}",
                other
            )),
        }
    }
}

impl From<ClusterMode> for u8 {
    fn from(mode: ClusterMode) -> u8 {
        match mode {
            ClusterMode::Single => 0,
            ClusterMode::Cluster => 1,
        }
    }
}

/// Target host groups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetServers {
    /// Metrics collector hosts, split by role
    pub prometheus_servers: PrometheusServers,

    /// Host exporter hosts
    pub node_exporter_servers: Vec<ServerEntry>,

    /// Dashboard service hosts
    pub grafana_servers: Vec<ServerEntry>,
}

/// Metrics collector hosts by role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusServers {
    pub master: Vec<ServerEntry>,

    /// Only meaningful when cluster_mode is 1
    #[serde(default)]
    pub slave: Vec<ServerEntry>,
}

/// A single deployment target
///
/// Credentials are normally absent in config.yml and merged in from the
/// secrets file before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEntry {
    pub ip: String,

    pub ssh_user: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_password: Option<String>,

    /// Private key path, as an alternative to password auth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<PathBuf>,
}

impl ServerEntry {
    /// Resolve the SSH authentication method for this entry, if any
    pub fn auth(&self) -> Option<crate::ssh::SshAuth> {
        if let Some(password) = &self.ssh_password {
            Some(crate::ssh::SshAuth::Password(password.clone()))
        } else {
            self.ssh_key
                .as_ref()
                .map(|key| crate::ssh::SshAuth::Key(key.clone()))
        }
    }

    /// Whether this entry carries usable credentials
    pub fn has_credentials(&self) -> bool {
        self.ssh_password.is_some() || self.ssh_key.is_some()
    }
}

/// Staging host for installation archives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTransfer {
    pub source_server: ServerEntry,

    /// Directory on the source server that receives the archives
    pub remote_path: String,
}

/// Optional HTTP proxy for remote downloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpProxy {
    /// Empty host selects the direct (no-proxy) download path
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub port: u16,

    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
}

fn default_verify_ssl() -> bool {
    true
}

impl HttpProxy {
    /// Whether downloads bypass the proxy. A host without a port is
    /// treated as unconfigured.
    pub fn is_direct(&self) -> bool {
        self.host.is_empty() || self.port == 0
    }

    /// Proxy URL, when one is configured
    pub fn url(&self) -> Option<String> {
        if self.is_direct() {
            None
        } else {
            Some(format!("http://{}:{}", self.host, self.port))
        }
    }
}

/// Semantic validation failure for a loaded configuration
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("target_servers.{0} must list at least one host")]
    EmptyGroup(&'static str),

    #[error("cluster mode requires prometheus_servers.slave hosts")]
    SlavesRequired,

    #[error("no credentials for host {ip} in {group} (need ssh_password or ssh_key)")]
    MissingCredentials { group: String, ip: String },

    #[error("{map} is missing an entry for '{service}'")]
    MissingPackage { map: &'static str, service: String },

    #[error("package '{0}' has no matching entry in remote_packages")]
    UnmirroredPackage(String),

    #[error("file_transfer.remote_path must not be empty")]
    EmptyRemotePath,

    #[error("deployment_base_dir must not be empty")]
    EmptyBaseDir,
}

impl DeployConfig {
    /// Validate the configuration after the secrets merge.
    ///
    /// Checks group presence per topology, credentials on every
    /// reachable host, and that the package maps mirror each other.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.deployment_base_dir.as_os_str().is_empty() {
            return Err(ValidationError::EmptyBaseDir);
        }

        let cluster = self.prometheus_deployment.cluster_mode.is_cluster();

        if self.target_servers.prometheus_servers.master.is_empty() {
            return Err(ValidationError::EmptyGroup("prometheus_servers.master"));
        }
        if cluster && self.target_servers.prometheus_servers.slave.is_empty() {
            return Err(ValidationError::SlavesRequired);
        }
        if self.target_servers.node_exporter_servers.is_empty() {
            return Err(ValidationError::EmptyGroup("node_exporter_servers"));
        }
        if self.target_servers.grafana_servers.is_empty() {
            return Err(ValidationError::EmptyGroup("grafana_servers"));
        }

        let mut groups: Vec<(&str, &[ServerEntry])> = vec![
            (
                "prometheus_servers.master",
                &self.target_servers.prometheus_servers.master,
            ),
            (
                "node_exporter_servers",
                &self.target_servers.node_exporter_servers,
            ),
            ("grafana_servers", &self.target_servers.grafana_servers),
        ];
        // Slave credentials are only required when slaves will be reached.
        if cluster {
            groups.push((
                "prometheus_servers.slave",
                &self.target_servers.prometheus_servers.slave,
            ));
        }
        groups.push((
            "file_transfer.source_server",
            std::slice::from_ref(&self.file_transfer.source_server),
        ));

        for (group, entries) in groups {
            for entry in entries {
                if !entry.has_credentials() {
                    return Err(ValidationError::MissingCredentials {
                        group: group.to_string(),
                        ip: entry.ip.clone(),
                    });
                }
            }
        }

        if self.file_transfer.remote_path.is_empty() {
            return Err(ValidationError::EmptyRemotePath);
        }

        for service in ServiceKind::ALL {
            if !self.packages.contains_key(service.name()) {
                return Err(ValidationError::MissingPackage {
                    map: "packages",
                    service: service.name().to_string(),
                });
            }
            if !self.remote_packages.contains_key(service.name()) {
                return Err(ValidationError::MissingPackage {
                    map: "remote_packages",
                    service: service.name().to_string(),
                });
            }
        }
        for name in self.packages.keys() {
            if !self.remote_packages.contains_key(name) {
                return Err(ValidationError::UnmirroredPackage(name.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::valid_config;

    #[test]
    fn cluster_mode_parses_zero_and_one() {
        let single: PrometheusDeployment = serde_yaml::from_str("cluster_mode: 0").unwrap();
        assert_eq!(single.cluster_mode, ClusterMode::Single);

        let cluster: PrometheusDeployment = serde_yaml::from_str("cluster_mode: 1").unwrap();
        assert_eq!(cluster.cluster_mode, ClusterMode::Cluster);
    }

    #[test]
    fn cluster_mode_rejects_other_values() {
        let result: Result<PrometheusDeployment, _> = serde_yaml::from_str("cluster_mode: 2");
        assert!(result.is_err());
    }

    #[test]
    fn valid_config_passes_validation() {
        let config = valid_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn single_mode_allows_empty_slaves() {
        let mut config = valid_config();
        config.prometheus_deployment.cluster_mode = ClusterMode::Single;
        config.target_servers.prometheus_servers.slave.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cluster_mode_requires_slaves() {
        let mut config = valid_config();
        config.prometheus_deployment.cluster_mode = ClusterMode::Cluster;
        config.target_servers.prometheus_servers.slave.clear();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::SlavesRequired)
        ));
    }

    #[test]
    fn single_mode_skips_slave_credential_checks() {
        let mut config = valid_config();
        config.prometheus_deployment.cluster_mode = ClusterMode::Single;
        for slave in &mut config.target_servers.prometheus_servers.slave {
            slave.ssh_password = None;
            slave.ssh_key = None;
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let mut config = valid_config();
        config.target_servers.grafana_servers[0].ssh_password = None;
        config.target_servers.grafana_servers[0].ssh_key = None;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingCredentials { .. })
        ));
    }

    #[test]
    fn packages_must_cover_all_services() {
        let mut config = valid_config();
        config.packages.remove("grafana");
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingPackage {
                map: "packages",
                ..
            })
        ));
    }

    #[test]
    fn every_package_needs_a_remote_mirror() {
        let mut config = valid_config();
        config
            .packages
            .insert("extra".to_string(), PathBuf::from("extra.tar.gz"));
        assert!(matches!(
            config.validate(),
            Err(ValidationError::UnmirroredPackage(name)) if name == "extra"
        ));
    }

    #[test]
    fn empty_proxy_host_is_direct() {
        let proxy = HttpProxy {
            host: String::new(),
            port: 3128,
            verify_ssl: true,
        };
        assert!(proxy.is_direct());
        assert!(proxy.url().is_none());
    }

    #[test]
    fn proxy_host_without_port_is_direct() {
        let proxy = HttpProxy {
            host: "10.0.0.8".to_string(),
            port: 0,
            verify_ssl: true,
        };
        assert!(proxy.is_direct());
        assert!(proxy.url().is_none());
    }

    #[test]
    fn configured_proxy_builds_url() {
        let proxy = HttpProxy {
            host: "10.0.0.8".to_string(),
            port: 3128,
            verify_ssl: false,
        };
        assert!(!proxy.is_direct());
        assert_eq!(proxy.url().as_deref(), Some("http://10.0.0.8:3128"));
    }

    #[test]
    fn server_entry_prefers_password_auth() {
        let entry = ServerEntry {
            ip: "192.0.2.1".to_string(),
            ssh_user: "root".to_string(),
            ssh_password: Some("secret".to_string()),
            ssh_key: Some(PathBuf::from("/root/.ssh/id_ed25519")),
        };
        assert!(matches!(
            entry.auth(),
            Some(crate::ssh::SshAuth::Password(_))
        ));
    }
}

//! Package sources
//!
//! Each service installs from a local `.tar.gz` archive. Archives that
//! are missing locally are downloaded from `remote_packages` by the
//! [`provisioner`].

pub mod provisioner;

pub use provisioner::{PackageProvisioner, ProvisionAction, ProvisionKind};

use std::path::{Path, PathBuf};

use crate::config::DeployConfig;
use crate::inventory::ServiceKind;

/// Archive suffix shared by all service packages
const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// One service's package: local archive plus optional download URL
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub service: ServiceKind,
    pub local_path: PathBuf,
    pub remote_url: Option<String>,
}

impl PackageInfo {
    /// Directory name the archive extracts to under /usr/local.
    ///
    /// Derived from the archive filename stem, e.g.
    /// `prometheus-3.0.1.linux-amd64.tar.gz` extracts to
    /// `prometheus-3.0.1.linux-amd64`.
    pub fn extract_dir_name(&self) -> anyhow::Result<String> {
        let file_name = self
            .local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Package path has no file name: {}",
                    self.local_path.display()
                )
            })?;

        match file_name.strip_suffix(ARCHIVE_SUFFIX) {
            Some(stem) if !stem.is_empty() => Ok(stem.to_string()),
            _ => anyhow::bail!(
                "Package for {} must be a .tar.gz archive, got: {}",
                self.service,
                file_name
            ),
        }
    }
}

/// The full set of packages for one deployment
#[derive(Debug, Clone)]
pub struct PackageSet {
    packages: Vec<PackageInfo>,
}

impl PackageSet {
    /// Build the set from the configured maps, expanding `~` in local
    /// paths.
    pub fn from_config(config: &DeployConfig) -> Self {
        let packages = ServiceKind::ALL
            .into_iter()
            .filter_map(|service| {
                let local_path = config.packages.get(service.name())?;
                Some(PackageInfo {
                    service,
                    local_path: expand_home(local_path),
                    remote_url: config.remote_packages.get(service.name()).cloned(),
                })
            })
            .collect();

        Self { packages }
    }

    pub fn packages(&self) -> &[PackageInfo] {
        &self.packages
    }

    pub fn get(&self, service: ServiceKind) -> Option<&PackageInfo> {
        self.packages.iter().find(|p| p.service == service)
    }
}

/// Expand a leading `~` to the user's home directory
fn expand_home(path: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::valid_config;

    #[test]
    fn set_covers_all_services() {
        let config = valid_config();
        let set = PackageSet::from_config(&config);

        assert_eq!(set.packages().len(), 3);
        for service in ServiceKind::ALL {
            let info = set.get(service).unwrap();
            assert!(info.remote_url.is_some());
        }
    }

    #[test]
    fn extract_dir_name_strips_archive_suffix() {
        let info = PackageInfo {
            service: ServiceKind::Prometheus,
            local_path: PathBuf::from("pkgs/prometheus-3.0.1.linux-amd64.tar.gz"),
            remote_url: None,
        };
        assert_eq!(
            info.extract_dir_name().unwrap(),
            "prometheus-3.0.1.linux-amd64"
        );
    }

    #[test]
    fn extract_dir_name_rejects_non_tarball() {
        let info = PackageInfo {
            service: ServiceKind::Grafana,
            local_path: PathBuf::from("pkgs/grafana.zip"),
            remote_url: None,
        };
        assert!(info.extract_dir_name().is_err());
    }

    #[test]
    fn home_is_expanded_in_local_paths() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let mut config = valid_config();
        config.packages.insert(
            "prometheus".to_string(),
            PathBuf::from("~/pkgs/prometheus-3.0.1.linux-amd64.tar.gz"),
        );

        let set = PackageSet::from_config(&config);
        let info = set.get(ServiceKind::Prometheus).unwrap();
        assert!(info.local_path.starts_with(&home));
    }
}

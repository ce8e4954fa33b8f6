//! Package provisioning
//!
//! Downloads missing archives from their remote URLs, optionally
//! through the configured HTTP proxy. Existing archives are kept unless
//! overwrite is requested.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};

use super::PackageSet;
use crate::config::HttpProxy;
use crate::inventory::ServiceKind;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// What provisioning will do (or did) for one package
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionAction {
    pub service: ServiceKind,
    pub local_path: PathBuf,
    pub kind: ProvisionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionKind {
    /// Local archive present, no download
    UseLocal,
    /// Archive will be fetched from the given URL
    Download { url: String },
    /// No local archive and no remote URL
    Missing,
}

/// Downloads and manages installation archives
#[derive(Debug)]
pub struct PackageProvisioner {
    download_dir: PathBuf,
    proxy: HttpProxy,
}

impl PackageProvisioner {
    pub fn new(download_dir: impl Into<PathBuf>, proxy: HttpProxy) -> Self {
        Self {
            download_dir: download_dir.into(),
            proxy,
        }
    }

    /// Decide per package what provisioning would do, without touching
    /// the network.
    pub fn plan(&self, set: &PackageSet, overwrite: bool) -> Vec<ProvisionAction> {
        set.packages()
            .iter()
            .map(|package| {
                let exists = package.local_path.exists();
                let kind = if exists && !overwrite {
                    ProvisionKind::UseLocal
                } else {
                    match &package.remote_url {
                        Some(url) => ProvisionKind::Download { url: url.clone() },
                        None if exists => ProvisionKind::UseLocal,
                        None => ProvisionKind::Missing,
                    }
                };
                ProvisionAction {
                    service: package.service,
                    local_path: package.local_path.clone(),
                    kind,
                }
            })
            .collect()
    }

    /// Ensure every archive is present locally, downloading as needed.
    pub fn prepare(
        &self,
        set: &PackageSet,
        overwrite: bool,
    ) -> anyhow::Result<Vec<ProvisionAction>> {
        std::fs::create_dir_all(&self.download_dir).with_context(|| {
            format!(
                "Failed to create download directory: {}",
                self.download_dir.display()
            )
        })?;

        let actions = self.plan(set, overwrite);
        let downloads: Vec<(&ProvisionAction, &str)> = actions
            .iter()
            .filter_map(|action| match &action.kind {
                ProvisionKind::Download { url } => Some((action, url.as_str())),
                _ => None,
            })
            .collect();

        for action in &actions {
            match &action.kind {
                ProvisionKind::UseLocal => {
                    info!(service = %action.service, path = %action.local_path.display(),
                        "Archive present, skipping download");
                }
                ProvisionKind::Missing => {
                    warn!(service = %action.service,
                        "No local archive and no remote URL configured");
                }
                ProvisionKind::Download { .. } => {}
            }
        }

        if !downloads.is_empty() {
            let runtime = tokio::runtime::Runtime::new()
                .context("Failed to create async runtime for downloads")?;
            let client = self.build_client()?;
            for (action, url) in downloads {
                runtime.block_on(self.download(&client, action, url))?;
            }
        }

        Ok(actions)
    }

    async fn download(
        &self,
        client: &reqwest::Client,
        action: &ProvisionAction,
        url: &str,
    ) -> anyhow::Result<()> {
        let parsed = url::Url::parse(url)
            .with_context(|| format!("Invalid remote package URL: {}", url))?;

        if let Some(parent) = action.local_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create package directory: {}", parent.display())
            })?;
        }

        info!(service = %action.service, url = %parsed, "Downloading archive");

        let mut response = client
            .get(parsed.clone())
            .send()
            .await
            .with_context(|| format!("Failed to download {}", parsed))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Failed to download {}: HTTP {} from {}",
                action.service,
                response.status(),
                parsed
            );
        }

        // Stream into a partial file so an interrupted download never
        // leaves an archive that would later pass the presence check.
        let partial = partial_path(&action.local_path);
        let mut file = std::fs::File::create(&partial)
            .with_context(|| format!("Failed to create {}", partial.display()))?;
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Failed to read response body from {}", parsed))?
        {
            file.write_all(&chunk)
                .with_context(|| format!("Failed to write {}", partial.display()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .with_context(|| format!("Failed to write {}", partial.display()))?;
        drop(file);

        std::fs::rename(&partial, &action.local_path).with_context(|| {
            format!("Failed to move archive into {}", action.local_path.display())
        })?;

        info!(service = %action.service, path = %action.local_path.display(),
            bytes = written, "Archive downloaded");

        Ok(())
    }

    fn build_client(&self) -> anyhow::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().timeout(DOWNLOAD_TIMEOUT);

        if let Some(proxy_url) = self.proxy.url() {
            info!(proxy = %proxy_url, "Routing downloads through HTTP proxy");
            let proxy = reqwest::Proxy::all(&proxy_url)
                .with_context(|| format!("Invalid proxy URL: {}", proxy_url))?;
            builder = builder.proxy(proxy);
        }

        if !self.proxy.verify_ssl {
            warn!("TLS certificate verification is disabled for downloads");
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder.build().context("Failed to build HTTP client")
    }
}

/// In-progress download target, renamed to the real path on completion
fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::valid_config;
    use crate::packages::PackageSet;

    fn set_with_local_archives(dir: &std::path::Path) -> PackageSet {
        let mut config = valid_config();
        for (name, path) in config.packages.iter_mut() {
            *path = dir.join(format!("{name}.tar.gz"));
            std::fs::write(path.as_path(), b"archive").unwrap();
        }
        PackageSet::from_config(&config)
    }

    #[test]
    fn existing_archives_are_kept() {
        let temp = tempfile::TempDir::new().unwrap();
        let set = set_with_local_archives(temp.path());
        let provisioner = PackageProvisioner::new(
            temp.path().join("downloads"),
            valid_config().http_proxy,
        );

        let actions = provisioner.plan(&set, false);
        assert!(
            actions
                .iter()
                .all(|a| a.kind == ProvisionKind::UseLocal)
        );
    }

    #[test]
    fn overwrite_forces_redownload() {
        let temp = tempfile::TempDir::new().unwrap();
        let set = set_with_local_archives(temp.path());
        let provisioner = PackageProvisioner::new(
            temp.path().join("downloads"),
            valid_config().http_proxy,
        );

        let actions = provisioner.plan(&set, true);
        assert!(
            actions
                .iter()
                .all(|a| matches!(a.kind, ProvisionKind::Download { .. }))
        );
    }

    #[test]
    fn missing_archive_plans_a_download() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = valid_config();
        // Paths point at files that do not exist.
        let set = PackageSet::from_config(&config);
        let provisioner =
            PackageProvisioner::new(temp.path().join("downloads"), config.http_proxy);

        let actions = provisioner.plan(&set, false);
        assert!(
            actions
                .iter()
                .all(|a| matches!(a.kind, ProvisionKind::Download { .. }))
        );
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(std::path::Path::new("/tmp/pkgs/prometheus.tar.gz")),
            std::path::PathBuf::from("/tmp/pkgs/prometheus.tar.gz.partial")
        );
    }

    #[test]
    fn leftover_partial_file_does_not_count_as_present() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = valid_config();
        for (name, path) in config.packages.iter_mut() {
            *path = temp.path().join(format!("{name}.tar.gz"));
            std::fs::write(partial_path(path), b"truncated").unwrap();
        }
        let set = PackageSet::from_config(&config);
        let provisioner =
            PackageProvisioner::new(temp.path().join("downloads"), config.http_proxy);

        let actions = provisioner.plan(&set, false);
        assert!(
            actions
                .iter()
                .all(|a| matches!(a.kind, ProvisionKind::Download { .. }))
        );
    }

    #[test]
    fn prepare_with_local_archives_needs_no_network() {
        let temp = tempfile::TempDir::new().unwrap();
        let set = set_with_local_archives(temp.path());
        let download_dir = temp.path().join("downloads");
        let provisioner =
            PackageProvisioner::new(&download_dir, valid_config().http_proxy);

        let actions = provisioner.prepare(&set, false).unwrap();
        assert_eq!(actions.len(), 3);
        assert!(download_dir.exists());
    }
}

//! Per-service install plans
//!
//! A plan is a typed list of steps executed sequentially on every host
//! that receives the service: probe for an existing install, upload and
//! extract the archive on a miss, fix the version-independent symlink,
//! put the rendered configuration in place and enable the systemd unit.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::inventory::ServiceKind;
use crate::packages::{PackageInfo, PackageSet};
use crate::render::{self, Staging, systemd};

/// Remote extraction root for service archives
const EXTRACT_ROOT: &str = "/usr/local";

/// One remote installation step
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Probe `which {binary}`; on a miss, upload the archive and
    /// extract it under the extraction root.
    ProbeInstall {
        binary: String,
        archive: PathBuf,
        remote_archive: PathBuf,
        extract_to: PathBuf,
    },
    /// Force-create a symlink (`ln -sfn`)
    Symlink { target: PathBuf, link: PathBuf },
    /// Ensure a directory exists with the given mode
    EnsureDir { path: PathBuf, mode: u32 },
    /// Upload a locally rendered file
    Upload {
        local: PathBuf,
        remote: PathBuf,
        mode: u32,
    },
    /// Write inline content to a remote file
    WriteRemote {
        remote: PathBuf,
        content: String,
        mode: u32,
    },
    /// daemon-reload, enable and restart a systemd unit
    EnableUnit { unit: String },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::ProbeInstall {
                binary, extract_to, ..
            } => write!(
                f,
                "install archive under {} unless `{}` is present",
                extract_to.display(),
                binary
            ),
            Step::Symlink { target, link } => {
                write!(f, "symlink {} -> {}", link.display(), target.display())
            }
            Step::EnsureDir { path, mode } => {
                write!(f, "ensure directory {} (mode {:o})", path.display(), mode)
            }
            Step::Upload { local, remote, .. } => {
                write!(f, "upload {} -> {}", local.display(), remote.display())
            }
            Step::WriteRemote { remote, .. } => write!(f, "write {}", remote.display()),
            Step::EnableUnit { unit } => write!(f, "enable and restart unit '{}'", unit),
        }
    }
}

/// The ordered steps that install one service on one host
#[derive(Debug, Clone, Serialize)]
pub struct InstallPlan {
    pub service: ServiceKind,
    pub steps: Vec<Step>,
}

/// Build the install plan for one service.
pub fn service_plan(
    package: &PackageInfo,
    staging: &Staging,
) -> anyhow::Result<InstallPlan> {
    let service = package.service;
    let extract_dir = package.extract_dir_name()?;
    let mut steps = vec![
        Step::ProbeInstall {
            binary: service.probe_binary().to_string(),
            archive: package.local_path.clone(),
            remote_archive: PathBuf::from(format!("/tmp/{}", service.archive_file())),
            extract_to: PathBuf::from(EXTRACT_ROOT),
        },
        Step::Symlink {
            target: PathBuf::from(format!("{EXTRACT_ROOT}/{extract_dir}")),
            link: PathBuf::from(service.install_root()),
        },
    ];

    match service {
        ServiceKind::Prometheus => {
            steps.push(Step::EnsureDir {
                path: PathBuf::from(service.install_root()),
                mode: 0o755,
            });
            steps.push(Step::Upload {
                local: staging.config_path(render::PROMETHEUS_CONFIG),
                remote: PathBuf::from(format!("{}/prometheus.yml", service.install_root())),
                mode: 0o644,
            });
            steps.push(Step::Upload {
                local: staging.config_path(&systemd::unit_file_name(service)),
                remote: PathBuf::from(systemd::unit_install_path(service)),
                mode: 0o644,
            });
        }
        ServiceKind::NodeExporter => {
            steps.push(Step::Upload {
                local: staging.config_path(&systemd::unit_file_name(service)),
                remote: PathBuf::from(systemd::unit_install_path(service)),
                mode: 0o644,
            });
        }
        ServiceKind::Grafana => {
            steps.push(Step::EnsureDir {
                path: PathBuf::from(format!("{}/conf", service.install_root())),
                mode: 0o755,
            });
            steps.push(Step::Upload {
                local: staging.config_path(render::GRAFANA_CONFIG),
                remote: PathBuf::from(format!(
                    "{}/conf/grafana.ini",
                    service.install_root()
                )),
                mode: 0o644,
            });
            steps.push(Step::WriteRemote {
                remote: PathBuf::from(systemd::unit_install_path(service)),
                content: systemd::unit_for(service).to_string(),
                mode: 0o644,
            });
        }
    }

    steps.push(Step::EnableUnit {
        unit: service.unit_name().to_string(),
    });

    Ok(InstallPlan { service, steps })
}

/// Build all plans in deployment order.
pub fn build_plans(packages: &PackageSet, staging: &Staging) -> anyhow::Result<Vec<InstallPlan>> {
    ServiceKind::DEPLOY_ORDER
        .into_iter()
        .filter_map(|service| packages.get(service))
        .map(|package| service_plan(package, staging))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::valid_config;

    fn fixture() -> (tempfile::TempDir, PackageSet, Staging) {
        let temp = tempfile::TempDir::new().unwrap();
        let config = valid_config();
        let packages = PackageSet::from_config(&config);
        let staging = Staging::prepare(temp.path().join("stage")).unwrap();
        (temp, packages, staging)
    }

    #[test]
    fn prometheus_plan_has_expected_step_sequence() {
        let (_temp, packages, staging) = fixture();
        let plan = service_plan(
            packages.get(ServiceKind::Prometheus).unwrap(),
            &staging,
        )
        .unwrap();

        assert_eq!(plan.service, ServiceKind::Prometheus);
        assert!(matches!(plan.steps[0], Step::ProbeInstall { .. }));
        assert!(matches!(plan.steps[1], Step::Symlink { .. }));
        assert!(matches!(plan.steps[2], Step::EnsureDir { .. }));
        assert!(matches!(plan.steps[3], Step::Upload { .. }));
        assert!(matches!(plan.steps[4], Step::Upload { .. }));
        assert!(matches!(plan.steps.last(), Some(Step::EnableUnit { .. })));
    }

    #[test]
    fn symlink_target_comes_from_archive_stem() {
        let (_temp, packages, staging) = fixture();
        let plan = service_plan(
            packages.get(ServiceKind::NodeExporter).unwrap(),
            &staging,
        )
        .unwrap();

        let Step::Symlink { target, link } = &plan.steps[1] else {
            panic!("expected symlink step");
        };
        assert_eq!(
            target.to_str().unwrap(),
            "/usr/local/node_exporter-1.8.2.linux-amd64"
        );
        assert_eq!(link.to_str().unwrap(), "/usr/local/node_exporter");
    }

    #[test]
    fn grafana_unit_is_written_inline() {
        let (_temp, packages, staging) = fixture();
        let plan =
            service_plan(packages.get(ServiceKind::Grafana).unwrap(), &staging).unwrap();

        let unit_step = plan
            .steps
            .iter()
            .find(|s| matches!(s, Step::WriteRemote { .. }))
            .expect("grafana plan writes its unit inline");
        let Step::WriteRemote {
            remote, content, ..
        } = unit_step
        else {
            unreachable!();
        };
        assert_eq!(
            remote.to_str().unwrap(),
            "/etc/systemd/system/grafana.service"
        );
        assert!(content.contains("grafana-server"));
    }

    #[test]
    fn plans_follow_deploy_order() {
        let (_temp, packages, staging) = fixture();
        let plans = build_plans(&packages, &staging).unwrap();

        let order: Vec<ServiceKind> = plans.iter().map(|p| p.service).collect();
        assert_eq!(
            order,
            vec![
                ServiceKind::NodeExporter,
                ServiceKind::Prometheus,
                ServiceKind::Grafana,
            ]
        );
    }

    #[test]
    fn probe_uses_grafana_server_binary() {
        let (_temp, packages, staging) = fixture();
        let plan =
            service_plan(packages.get(ServiceKind::Grafana).unwrap(), &staging).unwrap();

        let Step::ProbeInstall { binary, .. } = &plan.steps[0] else {
            panic!("expected probe step");
        };
        assert_eq!(binary, "grafana-server");
    }
}

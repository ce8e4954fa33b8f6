//! Target enumeration
//!
//! Expands the `target_servers` groups from the configuration into a
//! flat list of deployment targets. Slave hosts participate only in
//! cluster mode; a run can be limited to a single group.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{DeployConfig, ServerEntry};

/// The three services this tool deploys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Prometheus,
    NodeExporter,
    Grafana,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 3] = [
        ServiceKind::Prometheus,
        ServiceKind::NodeExporter,
        ServiceKind::Grafana,
    ];

    /// Installation order: exporters first so the collector has
    /// something to scrape, dashboard last.
    pub const DEPLOY_ORDER: [ServiceKind; 3] = [
        ServiceKind::NodeExporter,
        ServiceKind::Prometheus,
        ServiceKind::Grafana,
    ];

    /// Key used in the `packages` / `remote_packages` maps
    pub fn name(self) -> &'static str {
        match self {
            ServiceKind::Prometheus => "prometheus",
            ServiceKind::NodeExporter => "node_exporter",
            ServiceKind::Grafana => "grafana",
        }
    }

    /// Binary probed with `which` to detect an existing install
    pub fn probe_binary(self) -> &'static str {
        match self {
            ServiceKind::Prometheus => "prometheus",
            ServiceKind::NodeExporter => "node_exporter",
            ServiceKind::Grafana => "grafana-server",
        }
    }

    /// Version-independent install path under /usr/local
    pub fn install_root(self) -> &'static str {
        match self {
            ServiceKind::Prometheus => "/usr/local/prometheus",
            ServiceKind::NodeExporter => "/usr/local/node_exporter",
            ServiceKind::Grafana => "/usr/local/grafana",
        }
    }

    /// systemd unit name
    pub fn unit_name(self) -> &'static str {
        self.name()
    }

    /// Well-known archive name on the staging host
    pub fn archive_file(self) -> String {
        format!("{}.tar.gz", self.name())
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Metrics collector role within the topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Master,
    Slave,
}

/// Inventory group a target belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetGroup {
    PrometheusMaster,
    PrometheusSlave,
    NodeExporter,
    Grafana,
}

impl TargetGroup {
    pub fn service(self) -> ServiceKind {
        match self {
            TargetGroup::PrometheusMaster | TargetGroup::PrometheusSlave => {
                ServiceKind::Prometheus
            }
            TargetGroup::NodeExporter => ServiceKind::NodeExporter,
            TargetGroup::Grafana => ServiceKind::Grafana,
        }
    }

    pub fn role(self) -> Option<Role> {
        match self {
            TargetGroup::PrometheusMaster => Some(Role::Master),
            TargetGroup::PrometheusSlave => Some(Role::Slave),
            _ => None,
        }
    }

    /// Section name in the hosts manifest
    pub fn section(self) -> &'static str {
        match self {
            TargetGroup::PrometheusMaster => "prometheus_master",
            TargetGroup::PrometheusSlave => "prometheus_slave",
            TargetGroup::NodeExporter => "node_exporter_servers",
            TargetGroup::Grafana => "grafana_servers",
        }
    }
}

impl fmt::Display for TargetGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section())
    }
}

impl FromStr for TargetGroup {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prometheus_master" => Ok(TargetGroup::PrometheusMaster),
            "prometheus_slave" => Ok(TargetGroup::PrometheusSlave),
            "node_exporter_servers" | "node_exporter" => Ok(TargetGroup::NodeExporter),
            "grafana_servers" | "grafana" => Ok(TargetGroup::Grafana),
            other => anyhow::bail!(
                "Unknown target group: '{}'. Use 'prometheus_master', 'prometheus_slave', \
                 'node_exporter' or 'grafana'",
                other
            ),
        }
    }
}

/// One (host, user, group) deployment target
#[derive(Debug, Clone, Serialize)]
pub struct Target {
    #[serde(flatten)]
    pub entry: ServerEntry,
    pub group: TargetGroup,
}

impl Target {
    pub fn service(&self) -> ServiceKind {
        self.group.service()
    }

    pub fn role(&self) -> Option<Role> {
        self.group.role()
    }
}

/// Flat list of deployment targets in execution order
#[derive(Debug, Clone)]
pub struct Inventory {
    targets: Vec<Target>,
}

impl Inventory {
    /// Expand the configured groups into targets.
    ///
    /// Slave hosts are included only when cluster mode is on.
    pub fn from_config(config: &DeployConfig) -> Self {
        let servers = &config.target_servers;
        let mut targets = Vec::new();

        push_group(
            &mut targets,
            &servers.prometheus_servers.master,
            TargetGroup::PrometheusMaster,
        );
        if config.prometheus_deployment.cluster_mode.is_cluster() {
            push_group(
                &mut targets,
                &servers.prometheus_servers.slave,
                TargetGroup::PrometheusSlave,
            );
        }
        push_group(
            &mut targets,
            &servers.node_exporter_servers,
            TargetGroup::NodeExporter,
        );
        push_group(&mut targets, &servers.grafana_servers, TargetGroup::Grafana);

        Self { targets }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Targets that receive the given service
    pub fn for_service(&self, service: ServiceKind) -> impl Iterator<Item = &Target> {
        self.targets.iter().filter(move |t| t.service() == service)
    }

    /// Number of targets in the given group
    pub fn group_len(&self, group: TargetGroup) -> usize {
        self.targets.iter().filter(|t| t.group == group).count()
    }

    /// Restrict the inventory to a single group
    pub fn limited(&self, group: TargetGroup) -> Inventory {
        Inventory {
            targets: self
                .targets
                .iter()
                .filter(|t| t.group == group)
                .cloned()
                .collect(),
        }
    }

    /// Render the operator-facing hosts manifest.
    ///
    /// Grouped by section, one host per line. Credentials never appear
    /// here; the manifest lands in the staging directory.
    pub fn hosts_manifest(&self) -> String {
        let mut out = String::new();
        let sections = [
            TargetGroup::PrometheusMaster,
            TargetGroup::PrometheusSlave,
            TargetGroup::NodeExporter,
            TargetGroup::Grafana,
        ];

        for group in sections {
            let members: Vec<&Target> =
                self.targets.iter().filter(|t| t.group == group).collect();
            if members.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", group.section()));
            for target in members {
                match group.role() {
                    Some(Role::Master) => out.push_str(&format!(
                        "{} ssh_user={} role=master\n",
                        target.entry.ip, target.entry.ssh_user
                    )),
                    Some(Role::Slave) => out.push_str(&format!(
                        "{} ssh_user={} role=slave\n",
                        target.entry.ip, target.entry.ssh_user
                    )),
                    None => out.push_str(&format!(
                        "{} ssh_user={}\n",
                        target.entry.ip, target.entry.ssh_user
                    )),
                }
            }
        }

        out
    }
}

fn push_group(targets: &mut Vec<Target>, entries: &[ServerEntry], group: TargetGroup) {
    for entry in entries {
        targets.push(Target {
            entry: entry.clone(),
            group,
        });
    }
}

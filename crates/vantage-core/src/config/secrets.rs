//! Credentials file schema and merge
//!
//! SSH credentials live in a separate YAML file referenced by
//! `server_secrets_file`. They are merged into the target entries by IP
//! match, per group and role, before validation runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::schema::{DeployConfig, ServerEntry};

/// Root structure of the secrets file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsFile {
    #[serde(default)]
    pub server_credentials: ServerCredentials,
}

/// Per-group credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCredentials {
    #[serde(default)]
    pub prometheus: PrometheusCredentials,

    #[serde(default)]
    pub node_exporter: Vec<CredentialEntry>,

    #[serde(default)]
    pub grafana: Vec<CredentialEntry>,

    /// Credentials for the file-transfer source server
    #[serde(default)]
    pub source: Option<SourceCredential>,
}

/// Metrics collector credentials, split by role
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrometheusCredentials {
    #[serde(default)]
    pub master: Vec<CredentialEntry>,

    #[serde(default)]
    pub slave: Vec<CredentialEntry>,
}

/// Credentials for one host, matched by IP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub ip: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<PathBuf>,
}

/// Credentials for the source server (no IP match needed, there is one)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCredential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<PathBuf>,
}

/// Merge credentials into the configuration's target entries.
///
/// Entries without a matching credential are left untouched; validation
/// catches them afterwards.
pub fn merge_credentials(config: &mut DeployConfig, credentials: &ServerCredentials) {
    overlay_group(
        &mut config.target_servers.prometheus_servers.master,
        &credentials.prometheus.master,
    );
    overlay_group(
        &mut config.target_servers.prometheus_servers.slave,
        &credentials.prometheus.slave,
    );
    overlay_group(
        &mut config.target_servers.node_exporter_servers,
        &credentials.node_exporter,
    );
    overlay_group(
        &mut config.target_servers.grafana_servers,
        &credentials.grafana,
    );

    if let Some(source) = &credentials.source {
        let target = &mut config.file_transfer.source_server;
        if source.ssh_password.is_some() {
            target.ssh_password = source.ssh_password.clone();
        }
        if source.ssh_key.is_some() {
            target.ssh_key = source.ssh_key.clone();
        }
    }
}

fn overlay_group(targets: &mut [ServerEntry], credentials: &[CredentialEntry]) {
    for credential in credentials {
        for target in targets.iter_mut() {
            if target.ip == credential.ip {
                if credential.ssh_password.is_some() {
                    target.ssh_password = credential.ssh_password.clone();
                }
                if credential.ssh_key.is_some() {
                    target.ssh_key = credential.ssh_key.clone();
                }
            }
        }
    }
}

//! End-to-end pipeline test against on-disk fixtures: configuration
//! loading with secrets merge, inventory expansion, offline package
//! provisioning, artifact rendering and plan construction. Everything
//! up to (but excluding) the SSH layer.

use std::path::Path;

use vantage_core::commands::{CheckCommand, CheckOptions, PlanCommand, PlanOptions};
use vantage_core::config::ConfigLoader;
use vantage_core::inventory::{Inventory, ServiceKind, TargetGroup};
use vantage_core::packages::{PackageProvisioner, PackageSet, ProvisionKind};
use vantage_core::plan::{self, Step};
use vantage_core::render::Staging;

fn write_config(dir: &Path, cluster_mode: u8) {
    let packages_dir = dir.join("pkgs");
    std::fs::create_dir_all(&packages_dir).unwrap();
    for archive in [
        "prometheus-3.0.1.linux-amd64.tar.gz",
        "node_exporter-1.8.2.linux-amd64.tar.gz",
        "grafana-v11.3.1.tar.gz",
    ] {
        std::fs::write(packages_dir.join(archive), b"tarball").unwrap();
    }

    let config = format!(
        r#"
deployment_base_dir: {base}
server_secrets_file: secrets.yml
prometheus_deployment:
  cluster_mode: {cluster_mode}
target_servers:
  prometheus_servers:
    master:
      - ip: 192.0.2.10
        ssh_user: root
    slave:
      - ip: 192.0.2.11
        ssh_user: ops
  node_exporter_servers:
    - ip: 192.0.2.10
      ssh_user: root
    - ip: 192.0.2.20
      ssh_user: ops
  grafana_servers:
    - ip: 192.0.2.30
      ssh_user: root
file_transfer:
  source_server:
    ip: 192.0.2.5
    ssh_user: root
  remote_path: /opt/installation_packages
prometheus_config:
  global:
    scrape_interval: 15s
  scrape_configs:
    - job_name: node
      static_configs:
        - targets: ["192.0.2.10:9100", "192.0.2.20:9100"]
grafana_config:
  app_mode: production
  server:
    http_port: 3000
packages:
  prometheus: {pkgs}/prometheus-3.0.1.linux-amd64.tar.gz
  node_exporter: {pkgs}/node_exporter-1.8.2.linux-amd64.tar.gz
  grafana: {pkgs}/grafana-v11.3.1.tar.gz
http_proxy:
  host: ""
  port: 0
  verify_ssl: true
remote_packages:
  prometheus: https://downloads.example.com/prometheus.tar.gz
  node_exporter: https://downloads.example.com/node_exporter.tar.gz
  grafana: https://downloads.example.com/grafana.tar.gz
"#,
        base = dir.join("staging").display(),
        pkgs = packages_dir.display(),
        cluster_mode = cluster_mode,
    );
    std::fs::write(dir.join("config.yml"), config).unwrap();

    let secrets = r#"
server_credentials:
  prometheus:
    master:
      - ip: 192.0.2.10
        ssh_password: master-pass
    slave:
      - ip: 192.0.2.11
        ssh_password: slave-pass
  node_exporter:
    - ip: 192.0.2.10
      ssh_password: master-pass
    - ip: 192.0.2.20
      ssh_password: node-pass
  grafana:
    - ip: 192.0.2.30
      ssh_password: grafana-pass
  source:
    ssh_password: source-pass
"#;
    std::fs::write(dir.join("secrets.yml"), secrets).unwrap();
}

#[test]
fn full_pipeline_from_fixtures() {
    let temp = tempfile::TempDir::new().unwrap();
    write_config(temp.path(), 1);

    // Load + merge + validate
    let config = ConfigLoader::new(temp.path().join("config.yml"))
        .load()
        .expect("fixture config should load");
    assert_eq!(
        config.target_servers.prometheus_servers.slave[0]
            .ssh_password
            .as_deref(),
        Some("slave-pass")
    );

    // Inventory: cluster mode includes the slave
    let inventory = Inventory::from_config(&config);
    assert_eq!(inventory.len(), 5);
    assert_eq!(inventory.group_len(TargetGroup::PrometheusSlave), 1);

    // Offline provisioning: archives exist, nothing downloads
    let packages = PackageSet::from_config(&config);
    let provisioner = PackageProvisioner::new(
        temp.path().join("downloads"),
        config.http_proxy.clone(),
    );
    let actions = provisioner.prepare(&packages, false).unwrap();
    assert!(actions.iter().all(|a| a.kind == ProvisionKind::UseLocal));

    // Staging + rendered artifacts
    let staging = Staging::prepare(&config.deployment_base_dir).unwrap();
    staging.render_artifacts(&config, &inventory).unwrap();

    let prometheus_yml =
        std::fs::read_to_string(staging.config_path("prometheus.yml")).unwrap();
    assert!(prometheus_yml.contains("job_name: node"));

    let grafana_ini = std::fs::read_to_string(staging.config_path("grafana.ini")).unwrap();
    assert!(grafana_ini.contains("app_mode = production"));
    assert!(grafana_ini.contains("[server]"));

    let hosts = std::fs::read_to_string(staging.config_path("hosts")).unwrap();
    assert!(hosts.contains("[prometheus_slave]"));
    assert!(!hosts.contains("slave-pass"));

    // Plans: deploy order, versioned symlink targets from archive stems
    let plans = plan::build_plans(&packages, &staging).unwrap();
    assert_eq!(plans[0].service, ServiceKind::NodeExporter);
    assert_eq!(plans[1].service, ServiceKind::Prometheus);
    assert_eq!(plans[2].service, ServiceKind::Grafana);

    let Step::Symlink { target, .. } = &plans[1].steps[1] else {
        panic!("expected symlink step");
    };
    assert_eq!(
        target.to_str().unwrap(),
        "/usr/local/prometheus-3.0.1.linux-amd64"
    );
}

#[test]
fn check_command_summarizes_single_mode() {
    let temp = tempfile::TempDir::new().unwrap();
    write_config(temp.path(), 0);

    let report = CheckCommand::new()
        .execute(&CheckOptions::new(temp.path().join("config.yml")))
        .unwrap();

    // Single mode: the slave group disappears from the summary
    assert!(
        report
            .groups
            .iter()
            .all(|g| g.group != TargetGroup::PrometheusSlave)
    );
    assert!(report.packages.iter().all(|p| p.available));
    assert!(report.proxy.direct);
}

#[test]
fn plan_command_respects_group_limit() {
    let temp = tempfile::TempDir::new().unwrap();
    write_config(temp.path(), 1);

    let options = PlanOptions::new(
        temp.path().join("config.yml"),
        temp.path().join("downloads"),
    )
    .with_limit(TargetGroup::Grafana);
    let report = PlanCommand::new().execute(&options).unwrap();

    assert_eq!(report.services.len(), 1);
    assert_eq!(report.services[0].service, ServiceKind::Grafana);
    assert_eq!(report.services[0].hosts, vec!["192.0.2.30".to_string()]);

    // Provisioning and staging still cover every package
    assert_eq!(report.provisioning.len(), 3);
    assert_eq!(report.staging.len(), 3);
}

#[test]
fn plan_command_leaves_filesystem_untouched() {
    let temp = tempfile::TempDir::new().unwrap();
    write_config(temp.path(), 1);

    let options = PlanOptions::new(
        temp.path().join("config.yml"),
        temp.path().join("downloads"),
    );
    PlanCommand::new().execute(&options).unwrap();

    assert!(!temp.path().join("staging").exists());
    assert!(!temp.path().join("downloads").exists());
}

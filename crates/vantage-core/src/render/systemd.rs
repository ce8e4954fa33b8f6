//! systemd unit files for the deployed services

use crate::inventory::ServiceKind;

const PROMETHEUS_UNIT: &str = "\
[Unit]
Description=Prometheus
Wants=network-online.target
After=network-online.target

[Service]
User=root
ExecStart=/usr/local/prometheus/prometheus --config.file=/usr/local/prometheus/prometheus.yml
ExecReload=/bin/kill -HUP $MAINPID
TimeoutStopSec=20s
Restart=always

[Install]
WantedBy=multi-user.target
";

const NODE_EXPORTER_UNIT: &str = "\
[Unit]
Description=Node Exporter
Wants=network-online.target
After=network-online.target

[Service]
User=root
ExecStart=/usr/local/node_exporter/node_exporter
ExecReload=/bin/kill -HUP $MAINPID
TimeoutStopSec=20s
Restart=always

[Install]
WantedBy=multi-user.target
";

const GRAFANA_UNIT: &str = "\
[Unit]
Description=Grafana
Documentation=http://docs.grafana.org
Wants=network-online.target
After=network-online.target

[Service]
User=root
WorkingDirectory=/usr/local/grafana
ExecStart=/usr/local/grafana/bin/grafana-server --config=/usr/local/grafana/conf/grafana.ini
Restart=always

[Install]
WantedBy=multi-user.target
";

/// Unit file content for a service
pub fn unit_for(service: ServiceKind) -> &'static str {
    match service {
        ServiceKind::Prometheus => PROMETHEUS_UNIT,
        ServiceKind::NodeExporter => NODE_EXPORTER_UNIT,
        ServiceKind::Grafana => GRAFANA_UNIT,
    }
}

/// File name of the unit, e.g. `prometheus.service`
pub fn unit_file_name(service: ServiceKind) -> String {
    format!("{}.service", service.unit_name())
}

/// Installed path of the unit under /etc/systemd/system
pub fn unit_install_path(service: ServiceKind) -> String {
    format!("/etc/systemd/system/{}", unit_file_name(service))
}

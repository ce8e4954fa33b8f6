//! prometheus.yml rendering
//!
//! The `prometheus_config` block is arbitrary YAML owned by the
//! operator; it is dumped verbatim, not interpreted.

use anyhow::Context;

/// Render the scrape configuration as a YAML document.
pub fn render_scrape_config(value: &serde_yaml::Value) -> anyhow::Result<String> {
    anyhow::ensure!(
        value.is_mapping(),
        "prometheus_config must be a YAML mapping"
    );
    serde_yaml::to_string(value).context("Failed to render prometheus.yml")
}

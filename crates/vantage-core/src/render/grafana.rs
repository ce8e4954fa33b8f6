//! grafana.ini rendering
//!
//! The `grafana_config` block is a mapping of scalars and one-level
//! sections. Scalar keys land before the first section header, nested
//! mappings become `[section]` blocks, matching what grafana-server
//! actually reads.

use anyhow::bail;
use serde_yaml::Value;

/// Render the dashboard settings as an INI document.
pub fn render_ini(value: &Value) -> anyhow::Result<String> {
    let Value::Mapping(mapping) = value else {
        bail!("grafana_config must be a YAML mapping");
    };

    let mut top = String::new();
    let mut sections = String::new();

    for (key, entry) in mapping {
        let key = scalar_to_string(key)?;
        match entry {
            Value::Mapping(section) => {
                sections.push_str(&format!("[{}]\n", key));
                for (name, setting) in section {
                    let name = scalar_to_string(name)?;
                    match setting {
                        Value::Mapping(_) | Value::Sequence(_) => bail!(
                            "grafana_config.{}.{} must be a scalar value",
                            key,
                            name
                        ),
                        other => sections
                            .push_str(&format!("{} = {}\n", name, scalar_to_string(other)?)),
                    }
                }
                sections.push('\n');
            }
            Value::Sequence(_) => bail!("grafana_config.{} must be a scalar or a section", key),
            other => top.push_str(&format!("{} = {}\n", key, scalar_to_string(other)?)),
        }
    }

    let mut out = top;
    if !out.is_empty() && !sections.is_empty() {
        out.push('\n');
    }
    out.push_str(sections.trim_end_matches('\n'));
    if !out.is_empty() {
        out.push('\n');
    }
    Ok(out)
}

fn scalar_to_string(value: &Value) -> anyhow::Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => bail!("Expected a scalar value in grafana_config, got: {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(yaml: &str) -> String {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        render_ini(&value).unwrap()
    }

    #[test]
    fn flat_keys_come_before_sections() {
        let ini = render(
            r#"
app_mode: production
server:
  http_port: 3000
  domain: grafana.example.com
"#,
        );

        let flat_pos = ini.find("app_mode = production").unwrap();
        let section_pos = ini.find("[server]").unwrap();
        assert!(flat_pos < section_pos);
        assert!(ini.contains("http_port = 3000"));
        assert!(ini.contains("domain = grafana.example.com"));
    }

    #[test]
    fn booleans_and_numbers_render_as_scalars() {
        let ini = render(
            r#"
log:
  level: info
users:
  allow_sign_up: false
  auto_assign_org_id: 1
"#,
        );

        assert!(ini.contains("allow_sign_up = false"));
        assert!(ini.contains("auto_assign_org_id = 1"));
    }

    #[test]
    fn sections_are_separated() {
        let ini = render("server:\n  http_port: 3000\nsecurity:\n  admin_user: admin\n");
        assert!(ini.contains("[server]\nhttp_port = 3000\n\n[security]\n"));
    }

    #[test]
    fn deeper_nesting_is_rejected() {
        let value: Value =
            serde_yaml::from_str("server:\n  tls:\n    enabled: true\n").unwrap();
        assert!(render_ini(&value).is_err());
    }

    #[test]
    fn non_mapping_config_is_rejected() {
        let value = Value::Sequence(vec![]);
        assert!(render_ini(&value).is_err());
    }
}

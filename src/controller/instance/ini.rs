//! grafana.ini rendering
//!
//! Output is deterministic (sections and keys sorted) so the config hash only
//! changes when the configuration does.

use std::collections::BTreeMap;
use std::fmt::Write;

pub type IniConfig = BTreeMap<String, BTreeMap<String, String>>;

/// Settings the deployment's volume layout relies on; user values win
fn defaults() -> IniConfig {
    let mut config = IniConfig::new();
    let paths = config.entry("paths".to_string()).or_default();
    paths.insert("data".to_string(), "/var/lib/grafana".to_string());
    paths.insert("logs".to_string(), "/var/log/grafana".to_string());
    paths.insert("plugins".to_string(), "/var/lib/grafana/plugins".to_string());
    paths.insert(
        "provisioning".to_string(),
        "/etc/grafana/provisioning".to_string(),
    );
    config
        .entry("server".to_string())
        .or_default()
        .insert(
            "http_port".to_string(),
            crate::constants::GRAFANA_HTTP_PORT.to_string(),
        );
    config
}

pub fn with_defaults(user: &IniConfig) -> IniConfig {
    let mut merged = defaults();
    for (section, values) in user {
        let target = merged.entry(section.clone()).or_default();
        for (key, value) in values {
            target.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Keys of the empty-named section are written before any `[section]` header
pub fn render_ini(config: &IniConfig) -> String {
    let mut out = String::new();
    if let Some(global) = config.get("") {
        for (key, value) in global {
            let _ = writeln!(out, "{key} = {value}");
        }
        out.push('\n');
    }
    for (section, values) in config.iter().filter(|(name, _)| !name.is_empty()) {
        let _ = writeln!(out, "[{section}]");
        for (key, value) in values {
            let _ = writeln!(out, "{key} = {value}");
        }
        out.push('\n');
    }
    out
}

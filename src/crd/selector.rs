//! # Instance Selection Types
//!
//! Equality label selectors used by artifacts to target instances, and the
//! key under which per-instance state is recorded in artifact status.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Label selector matching instances whose labels contain every pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl InstanceSelector {
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        self.match_labels.iter().all(|(key, value)| {
            labels
                .and_then(|labels| labels.get(key))
                .is_some_and(|actual| actual == value)
        })
    }

    /// Render as a Kubernetes label selector string (`a=b,c=d`)
    pub fn to_label_selector(&self) -> String {
        self.match_labels
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Identity of a Grafana instance: `namespace/name`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceKey {
    pub namespace: String,
    pub name: String,
}

impl InstanceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid instance key '{0}': expected <namespace>/<name>")]
pub struct InstanceKeyError(String);

impl FromStr for InstanceKey {
    type Err = InstanceKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(InstanceKey::new(namespace, name))
            }
            _ => Err(InstanceKeyError(s.to_string())),
        }
    }
}

impl Serialize for InstanceKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InstanceKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_selector_requires_every_label() {
        let selector = InstanceSelector {
            match_labels: labels(&[("dashboards", "grafana"), ("env", "dev")]),
        };
        assert!(selector.matches(Some(&labels(&[
            ("dashboards", "grafana"),
            ("env", "dev"),
            ("extra", "x"),
        ]))));
        assert!(!selector.matches(Some(&labels(&[("dashboards", "grafana")]))));
        assert!(!selector.matches(Some(&labels(&[("dashboards", "grafana"), ("env", "prod")]))));
        assert!(!selector.matches(None));
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = InstanceSelector::default();
        assert!(selector.matches(None));
        assert_eq!(selector.to_label_selector(), "");
    }

    #[test]
    fn test_label_selector_string_is_sorted() {
        let selector = InstanceSelector {
            match_labels: labels(&[("b", "2"), ("a", "1")]),
        };
        assert_eq!(selector.to_label_selector(), "a=1,b=2");
    }

    #[test]
    fn test_instance_key_wire_format() {
        let key = InstanceKey::new("monitoring", "grafana-a");
        assert_eq!(key.to_string(), "monitoring/grafana-a");
        assert_eq!("monitoring/grafana-a".parse::<InstanceKey>().unwrap(), key);

        let map: BTreeMap<InstanceKey, u8> = [(key.clone(), 1)].into_iter().collect();
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"monitoring/grafana-a":1}"#);
        let back: BTreeMap<InstanceKey, u8> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_instance_key_rejects_malformed() {
        assert!("no-slash".parse::<InstanceKey>().is_err());
        assert!("/name".parse::<InstanceKey>().is_err());
        assert!("ns/".parse::<InstanceKey>().is_err());
        assert!("a/b/c".parse::<InstanceKey>().is_err());
    }
}

//! # Plugin Requirements
//!
//! Artifacts declare the Grafana plugins they need as `{name, version}` pairs
//! where `version` is a semver requirement. Each instance records every
//! requirement together with the artifact it came from; requirements for the
//! same plugin are consolidated into a single requirement: the conjunction of
//! everything requested, which must still be satisfiable by some version.
//!
//! Recording an artifact's requirements replaces whatever that artifact
//! recorded before, so re-pinning a plugin is never a conflict with itself.

use std::collections::BTreeMap;

use semver::{Comparator, Version, VersionReq};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A plugin an artifact needs installed in every instance it is pushed to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct GrafanaPlugin {
    /// Plugin id, e.g. `grafana-piechart-panel`
    pub name: String,
    /// Semver requirement, e.g. `>=1.0`, `^2.1` or `1.6.1` (exactly that version)
    pub version: String,
}

impl GrafanaPlugin {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// A requirement recorded on an instance
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct PluginRequirement {
    pub name: String,
    /// Normalized semver requirement
    pub version: String,
    /// Artifact that asked for it, as `Kind/namespace/name`
    #[serde(default)]
    pub from: String,
}

impl PluginRequirement {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            from: from.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin {name}: invalid version requirement '{version}': {source}")]
    InvalidVersion {
        name: String,
        version: String,
        #[source]
        source: semver::Error,
    },
    #[error("plugin {name}: requirement '{requested}' conflicts with '{existing}'")]
    Conflict {
        name: String,
        existing: String,
        requested: String,
    },
    #[error("plugin {name}: requirement '{version}' cannot be satisfied by any version")]
    Unsatisfiable { name: String, version: String },
}

/// Plugin requirements recorded on an instance, sorted by plugin then artifact
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(transparent)]
pub struct PluginList(pub Vec<PluginRequirement>);

impl PluginList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginRequirement> {
        self.0.iter()
    }

    /// Whether `from` has anything recorded
    pub fn has_requirements_from(&self, from: &str) -> bool {
        self.0.iter().any(|requirement| requirement.from == from)
    }

    /// Replace everything `from` recorded with `requested`.
    ///
    /// The result must still consolidate: a requirement disjoint from what
    /// other artifacts recorded is a [`PluginError::Conflict`]. Recording the
    /// same requests twice yields an identical list.
    pub fn record(
        &self,
        from: &str,
        requested: &[GrafanaPlugin],
    ) -> Result<PluginList, PluginError> {
        let mut entries = self.without(from).0;
        for plugin in requested {
            let requirement = parse_requirement(&plugin.name, &plugin.version)?;
            entries.push(PluginRequirement::new(
                plugin.name.clone(),
                requirement.to_string(),
                from,
            ));
        }

        // others first, so a conflict names the new request as the offender
        let others = self.0.iter().filter(|r| r.from != from);
        consolidate(
            others
                .map(|r| (r.name.as_str(), r.version.as_str()))
                .chain(requested.iter().map(|p| (p.name.as_str(), p.version.as_str()))),
        )?;

        entries.sort_by(|a, b| {
            (&a.name, &a.from, &a.version).cmp(&(&b.name, &b.from, &b.version))
        });
        entries.dedup();
        Ok(PluginList(entries))
    }

    /// Everything except what `from` recorded
    pub fn without(&self, from: &str) -> PluginList {
        PluginList(
            self.0
                .iter()
                .filter(|requirement| requirement.from != from)
                .cloned()
                .collect(),
        )
    }

    /// One name-sorted requirement per plugin
    pub fn consolidated(&self) -> Result<Vec<GrafanaPlugin>, PluginError> {
        let merged = consolidate(self.0.iter().map(|r| (r.name.as_str(), r.version.as_str())))?;
        Ok(merged
            .into_iter()
            .map(|(name, requirement)| GrafanaPlugin::new(name, requirement.to_string()))
            .collect())
    }

    /// Render the `GF_INSTALL_PLUGINS` value: `name version` pairs joined by commas,
    /// each pinned to the lowest version its consolidated requirement admits.
    pub fn install_string(&self) -> Result<String, PluginError> {
        let merged = consolidate(self.0.iter().map(|r| (r.name.as_str(), r.version.as_str())))?;
        let mut entries = Vec::with_capacity(merged.len());
        for (name, requirement) in merged {
            let version =
                lowest_satisfying(&requirement).ok_or_else(|| PluginError::Unsatisfiable {
                    name: name.clone(),
                    version: requirement.to_string(),
                })?;
            entries.push(format!("{name} {version}"));
        }
        Ok(entries.join(","))
    }
}

/// Intersect requirements per plugin name, failing on the first one that
/// leaves no satisfying version.
fn consolidate<'a>(
    requirements: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<BTreeMap<String, VersionReq>, PluginError> {
    let mut merged: BTreeMap<String, VersionReq> = BTreeMap::new();

    for (name, version) in requirements {
        let requirement = parse_requirement(name, version)?;
        let combined = match merged.get(name) {
            Some(existing) => {
                let combined = intersect(existing, &requirement);
                if lowest_satisfying(&combined).is_none() {
                    return Err(PluginError::Conflict {
                        name: name.to_string(),
                        existing: existing.to_string(),
                        requested: version.to_string(),
                    });
                }
                combined
            }
            None => {
                if lowest_satisfying(&requirement).is_none() {
                    return Err(PluginError::Unsatisfiable {
                        name: name.to_string(),
                        version: version.to_string(),
                    });
                }
                requirement
            }
        };
        merged.insert(name.to_string(), combined);
    }

    Ok(merged)
}

/// A bare version (`1.6.1`) means exactly that version, not a caret range.
fn parse_requirement(name: &str, version: &str) -> Result<VersionReq, PluginError> {
    let raw = version.trim();
    let parsed = match Version::parse(raw) {
        Ok(exact) => VersionReq::parse(&format!("={exact}")),
        Err(_) => VersionReq::parse(raw),
    };
    parsed.map_err(|source| PluginError::InvalidVersion {
        name: name.to_string(),
        version: version.to_string(),
        source,
    })
}

fn intersect(a: &VersionReq, b: &VersionReq) -> VersionReq {
    let mut comparators = a.comparators.clone();
    for comparator in &b.comparators {
        if !comparators.contains(comparator) {
            comparators.push(comparator.clone());
        }
    }
    VersionReq { comparators }
}

/// The admitted set of a conjunction is an interval whose lower end is the
/// largest comparator lower bound, so probing every comparator's bound and
/// its immediate successors finds the minimum when one exists.
fn lowest_satisfying(requirement: &VersionReq) -> Option<Version> {
    let mut candidates = vec![Version::new(0, 0, 0)];
    for comparator in &requirement.comparators {
        candidates.extend(bound_candidates(comparator));
    }
    candidates
        .into_iter()
        .filter(|candidate| requirement.matches(candidate))
        .min()
}

fn bound_candidates(comparator: &Comparator) -> Vec<Version> {
    let major = comparator.major;
    let minor = comparator.minor.unwrap_or(0);
    let patch = comparator.patch.unwrap_or(0);

    let mut candidates = vec![Version::new(major, minor, patch)];
    if !comparator.pre.is_empty() {
        let mut pre = Version::new(major, minor, patch);
        pre.pre = comparator.pre.clone();
        candidates.push(pre);
    }
    if let Some(next) = patch.checked_add(1) {
        candidates.push(Version::new(major, minor, next));
    }
    if let Some(next) = minor.checked_add(1) {
        candidates.push(Version::new(major, next, 0));
    }
    if let Some(next) = major.checked_add(1) {
        candidates.push(Version::new(next, 0, 0));
    }
    candidates
}

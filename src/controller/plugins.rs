//! Recording artifact plugin requirements on instances
//!
//! The inventory lives in the instance status, one entry per requirement and
//! artifact; the plugins stage of the instance pipeline consolidates it into
//! `GF_INSTALL_PLUGINS`.

use kube::{Resource, ResourceExt};
use tracing::info;

use crate::controller::store::ResourceStore;
use crate::controller::types::ReconcilerError;
use crate::crd::{Grafana, GrafanaPlugin, PluginList};

/// Identity an artifact's requirements are recorded under: `Kind/namespace/name`
pub fn requirement_source<K>(artifact: &K) -> String
where
    K: Resource<DynamicType = ()>,
{
    format!(
        "{}/{}/{}",
        K::kind(&()),
        artifact.namespace().unwrap_or_default(),
        artifact.name_any()
    )
}

/// Replace what `from` recorded on the instance with `requested`.
///
/// Writes only when the inventory changes; returns the instance as stored.
/// A requirement conflicting with another artifact's is an
/// [`ReconcilerError::Invalid`] error for this instance and leaves the stored
/// inventory untouched.
pub async fn reconcile_plugins(
    store: &dyn ResourceStore,
    instance: &Grafana,
    from: &str,
    requested: &[GrafanaPlugin],
) -> Result<Grafana, ReconcilerError> {
    let current = instance
        .status
        .as_ref()
        .map(|status| &status.plugins)
        .cloned()
        .unwrap_or_default();
    if requested.is_empty() && !current.has_requirements_from(from) {
        return Ok(instance.clone());
    }

    let recorded = current.record(from, requested)?;
    write_inventory(store, instance, current, recorded).await
}

/// Drop everything `from` recorded on the instance
pub async fn release_plugins(
    store: &dyn ResourceStore,
    instance: &Grafana,
    from: &str,
) -> Result<Grafana, ReconcilerError> {
    let current = instance
        .status
        .as_ref()
        .map(|status| &status.plugins)
        .cloned()
        .unwrap_or_default();
    let released = current.without(from);
    write_inventory(store, instance, current, released).await
}

async fn write_inventory(
    store: &dyn ResourceStore,
    instance: &Grafana,
    current: PluginList,
    next: PluginList,
) -> Result<Grafana, ReconcilerError> {
    if next == current {
        return Ok(instance.clone());
    }

    info!(
        instance = %instance.instance_key(),
        requirements = next.0.len(),
        "Plugin inventory changed"
    );
    let mut status = instance.status.clone().unwrap_or_default();
    status.plugins = next;
    Ok(store.update_instance_status(instance, &status).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{GrafanaDashboard, GrafanaPlaylist};

    #[test]
    fn test_requirement_source_names_kind_and_object() {
        let mut dashboard = GrafanaDashboard::new("overview", Default::default());
        dashboard.metadata.namespace = Some("monitoring".to_string());
        assert_eq!(
            requirement_source(&dashboard),
            "GrafanaDashboard/monitoring/overview"
        );

        let mut playlist = GrafanaPlaylist::new("overview", Default::default());
        playlist.metadata.namespace = Some("monitoring".to_string());
        assert_eq!(
            requirement_source(&playlist),
            "GrafanaPlaylist/monitoring/overview"
        );
    }
}

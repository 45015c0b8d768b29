//! Finalizer list helpers. Writes go through [`crate::controller::store::ResourceStore`].

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

pub fn has_finalizer(meta: &ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|list| list.iter().any(|f| f == finalizer))
}

/// Current finalizers plus `finalizer`
pub fn with_finalizer(meta: &ObjectMeta, finalizer: &str) -> Vec<String> {
    let mut list = meta.finalizers.clone().unwrap_or_default();
    if !list.iter().any(|f| f == finalizer) {
        list.push(finalizer.to_string());
    }
    list
}

/// Current finalizers minus `finalizer`, leaving other controllers' entries alone
pub fn without_finalizer(meta: &ObjectMeta, finalizer: &str) -> Vec<String> {
    meta.finalizers
        .clone()
        .unwrap_or_default()
        .into_iter()
        .filter(|f| f != finalizer)
        .collect()
}

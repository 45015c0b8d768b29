//! # Error Policy
//!
//! What the controllers do with a failed reconcile and with errors surfaced
//! by the controller streams.
//!
//! Retries are fixed-delay: desired state that can't succeed until the user
//! edits it waits `POLL_AGAIN`, everything else `RETRY_SOON`.

use std::sync::Arc;
use std::time::Duration;

use kube::{Resource, ResourceExt};
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use tracing::{debug, error, info, warn};

use crate::config::OperatorConfig;
use crate::controller::types::{Context, ReconcilerError};
use crate::observability::metrics;

/// Requeue delay for a failed reconcile; `None` when it should not be retried
pub fn requeue_delay(error: &ReconcilerError, config: &OperatorConfig) -> Option<Duration> {
    match error {
        ReconcilerError::Cancelled => None,
        ReconcilerError::Invalid(_) => Some(config.poll_again()),
        _ => Some(config.retry_soon()),
    }
}

pub fn handle_reconciliation_error<K>(
    obj: Arc<K>,
    error: &ReconcilerError,
    ctx: Arc<Context>,
    controller: &str,
) -> Action
where
    K: Resource,
{
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    match error {
        ReconcilerError::Cancelled => {
            debug!(controller, resource.name = %name, resource.namespace = %namespace, "Reconcile cancelled by shutdown");
        }
        ReconcilerError::Store(e) if e.is_conflict() => {
            info!(
                controller,
                resource.name = %name,
                resource.namespace = %namespace,
                "Write based on a stale read, retrying from a fresh one"
            );
        }
        _ => {
            error!(
                controller,
                resource.name = %name,
                resource.namespace = %namespace,
                error.kind = error.kind(),
                error = %error,
                "Reconciliation error"
            );
            metrics::increment_reconciliation_errors(controller);
        }
    }

    match requeue_delay(error, &ctx.config) {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    }
}

/// Log one item of a controller's output stream
pub fn log_controller_result<K>(
    controller: &str,
    result: Result<(ObjectRef<K>, Action), controller::Error<ReconcilerError, watcher::Error>>,
) where
    K: Resource<DynamicType = ()>,
{
    match result {
        Ok((object, action)) => {
            debug!(
                controller,
                resource.name = %object.name,
                resource.namespace = object.namespace.as_deref().unwrap_or_default(),
                action = ?action,
                "Reconciled"
            );
        }
        // already logged by the error policy
        Err(controller::Error::ReconcilerFailed(_, object)) => {
            debug!(controller, resource.name = %object.name, "Reconcile failed");
        }
        Err(controller::Error::ObjectNotFound(object)) => {
            debug!(
                controller,
                resource.name = %object.name,
                "Object deleted before it could be reconciled"
            );
        }
        Err(e) => {
            warn!(controller, error = %e, "Controller stream error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_waits_longer_than_transient() {
        let config = OperatorConfig {
            retry_soon_secs: 5,
            poll_again_secs: 10,
            ..Default::default()
        };
        let transient = ReconcilerError::Store(crate::controller::store::StoreError::Conflict {
            kind: "GrafanaDashboard".to_string(),
            key: "ns/d".to_string(),
        });
        let invalid = ReconcilerError::Invalid("plugin conflict".to_string());

        assert_eq!(
            requeue_delay(&transient, &config),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            requeue_delay(&invalid, &config),
            Some(Duration::from_secs(10))
        );
        assert_eq!(requeue_delay(&ReconcilerError::Cancelled, &config), None);
    }
}

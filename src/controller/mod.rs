//! # Controller
//!
//! Reconcilers for the three custom resources and the pieces they share.
//!
//! - `instance`: stage pipeline provisioning `Grafana` instances
//! - `dashboard` / `playlist`: artifact reconcilers pushing to ready instances
//! - `store`: Kubernetes persistence behind traits
//! - `selector`, `hash`, `content`, `plugins`, `finalizer`: shared helpers
//! - `types`: reconcile context and error type

pub mod content;
pub mod dashboard;
pub mod finalizer;
pub mod hash;
pub mod instance;
pub mod playlist;
pub mod plugins;
pub mod selector;
pub mod store;
pub mod types;

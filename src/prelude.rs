//! # Prelude
//!
//! Commonly used types, importable with `use grafana_operator::prelude::*;`

pub use crate::crd::*;

pub use crate::controller::store::{ClusterResources, ResourceStore, StoreError};
pub use crate::controller::types::{Context, ReconcilerError};

pub use crate::controller::instance::{StageHandler, StageOutcome, StagePipeline};

pub use crate::grafana_api::{
    DashboardCatalog, GrafanaApi, GrafanaApiError, GrafanaClientFactory,
};

pub use crate::config::OperatorConfig;

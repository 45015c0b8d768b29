//! Grafana Operator Library
//!
//! Custom resource types, reconcilers and runtime wiring for the operator.
//! Unit tests live beside the code; reconcile scenarios run against in-memory
//! fakes under `tests/`.
//!
//! ## Quick Start
//!
//! ```rust
//! use grafana_operator::prelude::*;
//! ```

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod grafana_api;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod server;

//! # Observability
//!
//! Prometheus metrics for the operator. Logging is plain `tracing`, set up in
//! [`crate::runtime::initialization`].

pub mod metrics;

//! # Configuration
//!
//! Operator settings loaded from the environment at startup.

mod controller;

pub use controller::{LogFormat, OperatorConfig};

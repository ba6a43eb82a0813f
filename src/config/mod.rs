//! Advisor Configuration Module
//!
//! Service, model, rule and adapter settings loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `MITTI_CONFIG` environment variable (path to TOML file)
//! 2. `advisor_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! `MITTI_SERVER_ADDR` and `MITTI_MODEL_DIR` override the loaded values.
//!
//! There is no process-wide copy: `main` loads one `AdvisorConfig` and hands
//! each component the section it needs.

mod advisor_config;
pub mod defaults;
pub mod validation;

pub use advisor_config::*;

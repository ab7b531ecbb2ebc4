//! Engine Configuration Module
//!
//! Setpoints and scoring constants loaded from TOML, replacing hardcoded
//! thresholds with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `MYCO_CONFIG` environment variable (path to TOML file)
//! 2. `telemetry.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! There is no process-wide config singleton. Load once and hand the value
//! to the engine, which owns it from then on:
//!
//! ```ignore
//! let engine = TelemetryEngine::new(EngineConfig::load())?;
//! ```

mod engine_config;
pub mod defaults;
pub mod validation;

pub use engine_config::*;

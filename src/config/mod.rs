//! Gap-Filling Configuration Module
//!
//! Provides per-run settings loaded from TOML files, replacing every policy
//! constant of the engine with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. Explicit path given on the command line
//! 2. `MULTIGAP_CONFIG` environment variable (path to TOML file)
//! 3. `multigap.toml` in the current working directory
//! 4. Built-in defaults (see [`defaults`])
//!
//! Settings are passed by reference into every stage; the engine never keeps
//! process-wide state.

mod settings;
pub mod defaults;
pub mod validation;

pub use settings::*;

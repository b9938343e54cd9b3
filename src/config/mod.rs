//! Service Configuration Module
//!
//! Loads the deployment configuration from TOML.
//!
//! ## Loading Order
//!
//! 1. `DIAGNOS_CONFIG` environment variable (path to TOML file)
//! 2. `diagnos.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! `DIAGNOS_SERVER_ADDR` and `DIAGNOS_MODEL_PATH` override the loaded values.
//! Secrets (the narrative API key) are read from the environment only,
//! optionally seeded from a `.env` file at startup.
//!
//! ```ignore
//! let config = ServiceConfig::load();
//! config.validate()?;
//! ```

mod service_config;
pub mod defaults;
pub mod validation;

pub use service_config::*;

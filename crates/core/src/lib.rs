//! Core functionality shared by the process attestor crates.
//!
//! This crate provides the configuration snapshot store, the configuration
//! error taxonomy and the logging setup used across the workspace.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, ConfigSnapshot, ConfigStore, DigestPolicy, ExternalEndpoints};
pub use error::{ConfigError, ConfigResult};

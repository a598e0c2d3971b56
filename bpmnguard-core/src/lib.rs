//! Core shared library for the bpmnguard workspace.
//!
//! This crate exposes the primitives every other crate depends on:
//! common errors, configuration loading, logging setup and small JSON
//! helpers.

pub mod config;
pub mod errors;
pub mod logging;
pub mod serde_utils;

pub use config::{CoreConfig, Environment};
pub use errors::{ConfigError, CoreError, Result as CoreResult};

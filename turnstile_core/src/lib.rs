//!
//! Turnstile core
//!
//! Configuration model, changed-file resolution, and logging for the
//! Turnstile permission-assignment pipeline step.
#![deny(missing_docs)]

pub use changes::resolve_targets;
pub use config::{ConfigError, PermissionConfig, PermissionLevel};

pub mod changes;
pub mod config;
pub mod logging;

//! Configuration Module
//!
//! Configuration loading for the dashboard service.

mod settings;

pub use settings::{ConfigError, DashboardConfig, ServerSettings, SourceSettings};

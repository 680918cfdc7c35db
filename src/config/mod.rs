//! Configuration module for the vitals application.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Database settings (URL, pool size, acquire timeout)

mod app;
mod validation;

pub use app::{AppConfig, DatabaseConfig, ServerConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

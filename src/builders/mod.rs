//! Builders
//!
//! Fluent builders for gateway configuration.

mod config;

pub use config::{gateway_config, GatewayConfigBuilder};

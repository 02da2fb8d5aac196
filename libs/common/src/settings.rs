//! Listener settings for the HTTP services

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Address a service binds to
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Load from `SERVER_HOST` / `SERVER_PORT`, falling back to
    /// `0.0.0.0:{default_port}`
    pub fn load(default_port: u16) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", i64::from(default_port))?
            .add_source(Environment::with_prefix("SERVER"))
            .build()?
            .try_deserialize()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Book Config - Centralized configuration management
// ============================================================================
//
// Configuration for the admission producer and the book consumer.
// Loaded from environment variables (and an optional .env file) with
// defaults matching a local single-broker setup.
//
// ============================================================================

mod constants;
mod database;
mod kafka;
mod logging;
mod worker;

pub use database::DbConfig;
pub use kafka::KafkaConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use worker::WorkerConfig;

use anyhow::{Context, Result};

/// Main configuration structure for the book pipeline binaries
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,

    // Sub-configurations
    pub logging: LoggingConfig,
    pub kafka: KafkaConfig,
    pub db: DbConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            logging: LoggingConfig::from_env()?,
            kafka: KafkaConfig::from_env(),
            db: DbConfig::from_env(),
            worker: WorkerConfig::from_env(),
        })
    }

    /// Database URL with the password masked, for logging
    pub fn database_url_safe(&self) -> String {
        mask_credentials(&self.database_url)
    }
}

/// Replace the `user:password@` part of a URL with `***@`
pub fn mask_credentials(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        let protocol_end = url.find("://").map(|p| p + 3).unwrap_or(0);
        if protocol_end <= at_pos {
            return format!("{}***{}", &url[..protocol_end], &url[at_pos..]);
        }
    }
    url.to_string()
}

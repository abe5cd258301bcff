//! Process configuration from environment variables.
//!
//! Loaded once at startup; fails fast if a required variable is missing.
//! The store URL is wrapped in `SecretString` so it never lands in logs.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::{Error, Result};

const DEFAULT_JOBS_FILE: &str = "jobs.toml";

#[derive(Debug)]
pub struct Config {
    /// Postgres URL for the lock store.
    pub database_url: SecretString,
    /// TOML file with `[[job]]` definitions.
    pub jobs_file: PathBuf,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            jobs_file: std::env::var("JOBS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_JOBS_FILE)),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok().filter(|s| !s.is_empty()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

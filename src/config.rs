use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub alerts: AlertsConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    /// Logical name of the alert collection shared with the external notifier.
    pub collection: String,
    /// How often (seconds) a live subscription re-reads the collection to pick up
    /// writes made outside this process.
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Display name of the signed-in user; used to derive the default notify target.
    pub display_name: Option<String>,
    /// How often (seconds) the headless dashboard re-renders freshness labels.
    pub refresh_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/alerts.db".to_string()),
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
            },
            alerts: AlertsConfig {
                collection: env::var("ALERTS_COLLECTION")
                    .ok()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| "test-alerts".to_string()),
                poll_interval_seconds: parse_var("ALERTS_POLL_INTERVAL_SECONDS", 5)?,
            },
            dashboard: DashboardConfig {
                display_name: env::var("DASHBOARD_DISPLAY_NAME")
                    .ok()
                    .filter(|v| !v.trim().is_empty()),
                refresh_seconds: parse_var("DASHBOARD_REFRESH_SECONDS", 60)?,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: DatabaseConfig {
                url: "sqlite://data/alerts.db".to_string(),
                max_connections: 5,
            },
            alerts: AlertsConfig {
                collection: "test-alerts".to_string(),
                poll_interval_seconds: 5,
            },
            dashboard: DashboardConfig {
                display_name: None,
                refresh_seconds: 60,
            },
        }
    }
}

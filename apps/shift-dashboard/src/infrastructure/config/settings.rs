//! Dashboard Configuration Settings
//!
//! Configuration types for the dashboard service, loaded from environment
//! variables.

use std::time::Duration;

use chrono::NaiveDate;

/// Record source connection settings.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Maximum pool connections.
    pub max_connections: u32,
    /// Branch (site) scope for every source query.
    pub branch_code: String,
}

/// Server and refresh settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// HTTP port for the query endpoint and the WebSocket channel.
    pub http_port: u16,
    /// Interval between scheduled refreshes.
    pub refresh_interval: Duration,
    /// Broadcast channel capacity.
    pub reports_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: 3000,
            refresh_interval: Duration::from_secs(120),
            reports_capacity: 64,
        }
    }
}

/// Complete dashboard configuration.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Record source settings.
    pub source: SourceSettings,
    /// Server and refresh settings.
    pub server: ServerSettings,
    /// Fixed business date override. `None` means "today", resolved at
    /// each refresh.
    pub business_date: Option<NaiveDate>,
}

impl DashboardConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `DASHBOARD_DB_URL` is missing or empty, or if
    /// `DASHBOARD_BUSINESS_DATE` is present but not an ISO date.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DASHBOARD_DB_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DASHBOARD_DB_URL".to_string()))?;

        if database_url.is_empty() {
            return Err(ConfigError::EmptyValue("DASHBOARD_DB_URL".to_string()));
        }

        let business_date = match std::env::var("DASHBOARD_BUSINESS_DATE") {
            Ok(raw) if !raw.is_empty() => Some(
                raw.parse::<NaiveDate>()
                    .map_err(|_| ConfigError::InvalidValue("DASHBOARD_BUSINESS_DATE".to_string(), raw))?,
            ),
            _ => None,
        };

        let source = SourceSettings {
            database_url,
            max_connections: parse_env_u32("DASHBOARD_DB_MAX_CONNECTIONS", 5),
            branch_code: std::env::var("DASHBOARD_BRANCH_CODE")
                .unwrap_or_else(|_| "1".to_string()),
        };

        let server = ServerSettings {
            http_port: parse_env_u16("DASHBOARD_HTTP_PORT", ServerSettings::default().http_port),
            refresh_interval: parse_env_duration_secs(
                "DASHBOARD_REFRESH_INTERVAL_SECS",
                ServerSettings::default().refresh_interval,
            ),
            reports_capacity: parse_env_usize(
                "DASHBOARD_REPORTS_CAPACITY",
                ServerSettings::default().reports_capacity,
            ),
        };

        Ok(Self {
            source,
            server,
            business_date,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {0} has invalid value: {1}")]
    InvalidValue(String, String),
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_settings_defaults() {
        let settings = ServerSettings::default();
        assert_eq!(settings.http_port, 3000);
        assert_eq!(settings.refresh_interval, Duration::from_secs(120));
        assert_eq!(settings.reports_capacity, 64);
    }

    #[test]
    fn parse_helpers_fall_back_on_garbage() {
        // Unset keys fall back to the default.
        assert_eq!(parse_env_u16("DASHBOARD_TEST_UNSET_PORT", 1234), 1234);
        assert_eq!(
            parse_env_duration_secs("DASHBOARD_TEST_UNSET_SECS", Duration::from_secs(9)),
            Duration::from_secs(9)
        );
    }
}

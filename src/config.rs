use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::models::incident::GeoPoint;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub builder_timeout: Duration,
    /// A batch becomes a route only when its severity sum is strictly above this.
    pub route_severity_threshold: u32,
    pub depot: GeoPoint,
    pub truck_classes: Vec<String>,
    /// Empty means any non-empty bearer token is accepted.
    pub api_tokens: Vec<String>,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            builder_timeout: Duration::from_millis(10_000),
            route_severity_threshold: 20,
            depot: GeoPoint {
                lat: -0.9344,
                lon: -78.6156,
            },
            truck_classes: vec![
                "lateral".to_string(),
                "posterior".to_string(),
                "compactor".to_string(),
            ],
            api_tokens: Vec::new(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let builder_timeout_ms =
            parse_or_default("BUILDER_TIMEOUT_MS", defaults.builder_timeout.as_millis() as u64)?;
        if builder_timeout_ms == 0 {
            return Err(AppError::Internal(
                "invalid BUILDER_TIMEOUT_MS: must be > 0".to_string(),
            ));
        }

        let truck_classes = list_or_default("TRUCK_CLASSES", defaults.truck_classes);
        if truck_classes.is_empty() {
            return Err(AppError::Internal(
                "invalid TRUCK_CLASSES: at least one class is required".to_string(),
            ));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            builder_timeout: Duration::from_millis(builder_timeout_ms),
            route_severity_threshold: parse_or_default(
                "ROUTE_SEVERITY_THRESHOLD",
                defaults.route_severity_threshold,
            )?,
            depot: GeoPoint {
                lat: parse_or_default("DEPOT_LAT", defaults.depot.lat)?,
                lon: parse_or_default("DEPOT_LON", defaults.depot.lon)?,
            },
            truck_classes,
            api_tokens: list_or_default("API_TOKENS", defaults.api_tokens),
            cors_allowed_origins: list_or_default(
                "CORS_ALLOWED_ORIGINS",
                defaults.cors_allowed_origins,
            ),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

fn list_or_default(key: &str, default: Vec<String>) -> Vec<String> {
    match env::var(key) {
        Ok(raw) => split_list(&raw),
        Err(_) => default,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{split_list, Config};

    #[test]
    fn split_list_drops_blank_items() {
        assert_eq!(
            split_list(" lateral, ,posterior,"),
            vec!["lateral".to_string(), "posterior".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn defaults_match_service_area() {
        let config = Config::default();
        assert_eq!(config.route_severity_threshold, 20);
        assert!(config.truck_classes.iter().any(|class| class == "posterior"));
        assert!(config.api_tokens.is_empty());
    }
}

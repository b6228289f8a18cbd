// Process configuration, read from `.env` and the environment

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::geo::IP2LOCATION_URL;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Clone)]
pub struct Config {
    pub ip2location_api_key: Option<String>,
    pub ip2location_url: String,
    pub geo_timeout_ms: u64,
    pub airports_path: PathBuf,
    pub flights_path: PathBuf,
    pub bind_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ip2location_api_key: None,
            ip2location_url: IP2LOCATION_URL.to_string(),
            geo_timeout_ms: 5000,
            airports_path: PathBuf::from("data/airports.json"),
            flights_path: PathBuf::from("data/flights.json"),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "ip2location_api_key",
                &self.ip2location_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("ip2location_url", &self.ip2location_url)
            .field("geo_timeout_ms", &self.geo_timeout_ms)
            .field("airports_path", &self.airports_path)
            .field("flights_path", &self.flights_path)
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // a missing .env file is fine
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    // Empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.ip2location_api_key = get("IP2LOCATION_API_KEY");

        if let Some(url) = get("IP2LOCATION_URL") {
            config.ip2location_url = url;
        }
        if let Some(value) = get("GEO_TIMEOUT_MS") {
            config.geo_timeout_ms = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: "GEO_TIMEOUT_MS",
                    value,
                })?;
        }
        if let Some(path) = get("AIRPORTS_PATH") {
            config.airports_path = PathBuf::from(path);
        }
        if let Some(path) = get("FLIGHTS_PATH") {
            config.flights_path = PathBuf::from(path);
        }
        if let Some(value) = get("BIND_ADDR") {
            config.bind_addr = value
                .trim()
                .parse::<SocketAddr>()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "BIND_ADDR",
                    value,
                })?;
        }

        Ok(config)
    }

    pub fn geo_timeout(&self) -> Duration {
        Duration::from_millis(self.geo_timeout_ms)
    }
}

// Caller address -> approximate location. An external IP lookup provider is
// consulted when one is configured; otherwise (or when it fails) the fixed
// default location is returned.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::airports::parse_number;

pub const DEFAULT_CITY: &str = "London";
pub const DEFAULT_REGION: &str = "England";
pub const DEFAULT_COUNTRY: &str = "United Kingdom";
pub const DEFAULT_LATITUDE: f64 = 51.5074;
pub const DEFAULT_LONGITUDE: f64 = -0.1278;

pub const IP2LOCATION_URL: &str = "https://api.ip2location.io/";

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("API error: {status_code} - {message}")]
    ApiResponseError { status_code: u16, message: String },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserLocation {
    pub city: String,
    pub region: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
    pub ip: String,
    pub ip_version: u8,
}

impl UserLocation {
    // The location used whenever the provider is absent or unusable
    pub fn fallback(address: &str) -> Self {
        Self {
            city: DEFAULT_CITY.to_string(),
            region: DEFAULT_REGION.to_string(),
            country: DEFAULT_COUNTRY.to_string(),
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
            ip: address.to_string(),
            ip_version: infer_ip_version(address),
        }
    }

    fn apply(&mut self, record: ProviderRecord) {
        if let Some(city) = record.city {
            self.city = city;
        }
        if let Some(region) = record.region {
            self.region = region;
        }
        if let Some(country) = record.country {
            self.country = country;
        }
        if let Some(latitude) = record.latitude {
            self.latitude = latitude;
        }
        if let Some(longitude) = record.longitude {
            self.longitude = longitude;
        }
        if let Some(ip) = record.ip {
            self.ip = ip;
        }
        if let Some(ip_version) = record.ip_version {
            self.ip_version = ip_version;
        }
    }
}

/// Not a parser: anything containing a colon is treated as IPv6.
pub fn infer_ip_version(address: &str) -> u8 {
    if address.contains(':') {
        6
    } else {
        4
    }
}

/// Fields a provider actually returned. `None` means "not supplied" and
/// leaves the corresponding default in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderRecord {
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub ip: Option<String>,
    pub ip_version: Option<u8>,
}

#[async_trait]
pub trait LocationProvider: Send + Sync + 'static {
    async fn lookup(&self, address: &str) -> Result<ProviderRecord, GeoError>;
}

// Result of asking the provider, kept explicit so the fallback is a branch
#[derive(Debug)]
pub enum LocationLookup {
    NotConfigured,
    Failed(GeoError),
    Found(ProviderRecord),
}

#[derive(Clone)]
pub struct GeoResolver {
    provider: Option<Arc<dyn LocationProvider>>,
    timeout: Duration,
}

impl GeoResolver {
    pub fn new(provider: Option<Arc<dyn LocationProvider>>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn without_provider() -> Self {
        Self::new(None, Duration::from_secs(5))
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    // At most one provider call, bounded by the resolver timeout. No retry.
    pub async fn lookup(&self, address: &str) -> LocationLookup {
        let Some(provider) = &self.provider else {
            return LocationLookup::NotConfigured;
        };

        match tokio::time::timeout(self.timeout, provider.lookup(address)).await {
            Ok(Ok(record)) => LocationLookup::Found(record),
            Ok(Err(e)) => LocationLookup::Failed(e),
            Err(_) => {
                let elapsed_ms = self.timeout.as_millis() as u64;
                LocationLookup::Failed(GeoError::Timeout(elapsed_ms))
            }
        }
    }

    /// Always returns a fully populated location.
    pub async fn resolve(&self, address: &str) -> UserLocation {
        let mut location = UserLocation::fallback(address);

        match self.lookup(address).await {
            LocationLookup::NotConfigured => {
                debug!(address, "no location provider configured, using default location");
            }
            LocationLookup::Failed(e) => {
                warn!(address, error = %e, "location lookup failed, using default location");
            }
            LocationLookup::Found(record) => location.apply(record),
        }

        location
    }
}

impl std::fmt::Debug for GeoResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoResolver")
            .field("provider", &self.provider.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

// Wire format of api.ip2location.io
#[derive(Debug, Default, Deserialize)]
struct Ip2LocationPayload {
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    city_name: Option<String>,
    #[serde(default)]
    region_name: Option<String>,
    #[serde(default)]
    country_name: Option<String>,
    #[serde(default)]
    latitude: Option<Value>,
    #[serde(default)]
    longitude: Option<Value>,
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

fn supplied(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

// A field that is present must be a usable number, otherwise the whole
// payload is rejected
fn supplied_number(field: &str, value: Option<Value>) -> Result<Option<f64>, GeoError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(v) => parse_number(&v)
            .map(Some)
            .ok_or_else(|| GeoError::MalformedPayload(format!("{field} is not a number: {v}"))),
    }
}

impl Ip2LocationPayload {
    fn into_record(self) -> Result<ProviderRecord, GeoError> {
        if let Some(error) = self.error {
            return Err(GeoError::MalformedPayload(format!("provider error: {error}")));
        }

        let ip_version = match supplied_number("version", self.version)? {
            None => None,
            Some(v) if v == 4.0 || v == 6.0 => Some(v as u8),
            Some(v) => {
                return Err(GeoError::MalformedPayload(format!(
                    "unknown address version {v}"
                )))
            }
        };

        Ok(ProviderRecord {
            city: supplied(self.city_name),
            region: supplied(self.region_name),
            country: supplied(self.country_name),
            latitude: supplied_number("latitude", self.latitude)?,
            longitude: supplied_number("longitude", self.longitude)?,
            ip: supplied(self.ip),
            ip_version,
        })
    }
}

pub struct Ip2LocationProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
}

impl Ip2LocationProvider {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, GeoError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GeoError::NetworkError(e.to_string()))?;

        Ok(Self::with_client(client, base_url, api_key, timeout))
    }

    // `timeout` should match the one the client was built with
    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> GeoError {
        if e.is_timeout() {
            GeoError::Timeout(self.timeout_ms)
        } else {
            // the request URL carries the API key
            GeoError::NetworkError(e.without_url().to_string())
        }
    }
}

#[async_trait]
impl LocationProvider for Ip2LocationProvider {
    async fn lookup(&self, address: &str) -> Result<ProviderRecord, GeoError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("ip", address),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GeoError::ApiResponseError {
                status_code: status.as_u16(),
                message,
            });
        }

        let payload: Ip2LocationPayload = response
            .json()
            .await
            .map_err(|e| GeoError::MalformedPayload(e.without_url().to_string()))?;

        payload.into_record()
    }
}

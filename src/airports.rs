// Airport dataset: country-indexed buckets built once at startup and the
// nearest-airport search that runs against them on every request

use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

// Dataset shipped with the repository
pub const SAMPLE_AIRPORTS_PATH: &str = "data/airports.json";

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParseError(#[from] serde_json::Error),
}

// One record as stored in the dataset file. Coordinates may be numbers or
// numeric strings, and the IATA code lives under one of two field names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAirport {
    #[serde(default)]
    pub airport: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub iata_code: Option<String>,
    #[serde(default)]
    pub iata: Option<String>,
    #[serde(default)]
    pub latitude: Option<Value>,
    #[serde(default)]
    pub longitude: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Airport {
    pub airport: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub iata: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearestAirport {
    #[serde(flatten)]
    pub airport: Airport,
    pub distance_km: f64,
}

impl RawAirport {
    // Returns None when either coordinate is missing or not a finite number
    fn into_airport(self) -> Option<Airport> {
        let lat = self.latitude.as_ref().and_then(parse_number)?;
        let lon = self.longitude.as_ref().and_then(parse_number)?;

        let iata = non_empty(self.iata_code).or_else(|| non_empty(self.iata));

        Some(Airport {
            airport: self.airport,
            city: self.city,
            country: self.country,
            iata,
            lat,
            lon,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

// Accepts a JSON number or a numeric string; rejects NaN and infinities
pub(crate) fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    n.is_finite().then_some(n)
}

/// Lower-cases and trims a country name, then folds known aliases so that
/// provider spellings and dataset spellings land on the same key.
pub fn normalize_country(name: &str) -> String {
    let key = name.trim().to_lowercase();

    let canonical = match key.as_str() {
        "united states of america" | "usa" | "us" => "united states",
        "united kingdom of great britain and northern ireland" | "uk" | "great britain" | "gb" => {
            "united kingdom"
        }
        "uae" => "united arab emirates",
        "republic of ireland" => "ireland",
        "korea, republic of" | "republic of korea" => "south korea",
        "czechia" => "czech republic",
        _ => return key,
    };

    canonical.to_string()
}

/// Great-circle distance in kilometres between two lat/lon points.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Immutable mapping from normalized country name to that country's airports,
/// in dataset order. There is no way to mutate it once built.
#[derive(Debug, Default)]
pub struct CountryIndex {
    buckets: HashMap<String, Box<[Airport]>>,
}

impl CountryIndex {
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = RawAirport>,
    {
        let mut grouped: HashMap<String, Vec<Airport>> = HashMap::new();
        let mut dropped = 0usize;

        for raw in records {
            let Some(airport) = raw.into_airport() else {
                dropped += 1;
                continue;
            };

            let key = normalize_country(airport.country.as_deref().unwrap_or_default());
            if key.is_empty() {
                dropped += 1;
                continue;
            }

            grouped.entry(key).or_default().push(airport);
        }

        let buckets: HashMap<String, Box<[Airport]>> = grouped
            .into_iter()
            .map(|(country, airports)| (country, airports.into_boxed_slice()))
            .collect();

        debug!(dropped, "airport records rejected while building index");

        Self { buckets }
    }

    pub fn lookup(&self, country: &str) -> Option<&[Airport]> {
        self.buckets
            .get(&normalize_country(country))
            .map(|bucket| &bucket[..])
    }

    /// Closest airport to (lat, lon) within `country`, or None when the
    /// country has no indexed airports. Equal distances keep the airport
    /// that appears first in the dataset.
    pub fn nearest(&self, lat: f64, lon: f64, country: &str) -> Option<NearestAirport> {
        let bucket = self.lookup(country)?;

        let mut best: Option<(&Airport, f64)> = None;
        for airport in bucket {
            let d = haversine_km(lat, lon, airport.lat, airport.lon);
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((airport, d)),
            }
        }

        best.map(|(airport, d)| NearestAirport {
            airport: airport.clone(),
            distance_km: round_2dp(d),
        })
    }

    pub fn country_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn airport_count(&self) -> usize {
        self.buckets.values().map(|bucket| bucket.len()).sum()
    }
}

/// Reads the airport dataset (a JSON array of records) from disk.
pub fn load_airports(path: impl AsRef<Path>) -> Result<Vec<RawAirport>, DatasetError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let records: Vec<RawAirport> = serde_json::from_str(&content)?;

    info!(path = %path.display(), records = records.len(), "loaded airport dataset");

    Ok(records)
}

// Fare catalog backed by a pricing snapshot on disk. The snapshot is
// re-read for every request and never cached in process.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::airports::parse_number;

// Snapshot shipped with the repository
pub const SAMPLE_FLIGHTS_PATH: &str = "data/flights.json";

#[derive(Error, Debug)]
pub enum FareError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParseError(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    #[serde(default)]
    data: Value,
}

/// Point-in-time fare rows keyed by `"{ORIGIN}-{DESTINATION}"`, in the order
/// they appear in the file.
#[derive(Debug, Clone, Default)]
pub struct FareSnapshot {
    rows: Map<String, Value>,
    last_modified: Option<DateTime<Utc>>,
}

// A row as stored in the snapshot. Descriptive fields of the wrong JSON
// type read as absent so they never decide selectability.
#[derive(Debug, Default, Deserialize)]
struct FareRow {
    #[serde(default, deserialize_with = "string_only")]
    origin: Option<String>,
    #[serde(default, deserialize_with = "string_only")]
    destination: Option<String>,
    #[serde(default, deserialize_with = "string_only")]
    origin_name: Option<String>,
    #[serde(default, deserialize_with = "string_only")]
    origin_city: Option<String>,
    #[serde(default, deserialize_with = "string_only")]
    origin_country: Option<String>,
    #[serde(default, deserialize_with = "string_only")]
    destination_name: Option<String>,
    #[serde(default, deserialize_with = "string_only")]
    destination_city: Option<String>,
    #[serde(default, deserialize_with = "string_only")]
    destination_country: Option<String>,
    #[serde(default)]
    price: Option<Value>,
    #[serde(default, deserialize_with = "string_only")]
    currency: Option<String>,
    #[serde(default, deserialize_with = "string_only")]
    display_price: Option<String>,
    #[serde(default, deserialize_with = "string_only")]
    date: Option<String>,
    // Any `error` key marks the row, even `null`
    #[serde(default, rename = "error", deserialize_with = "key_present")]
    has_error: bool,
}

fn string_only<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn key_present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Value::deserialize(deserializer).map(|_| true)
}

/// A selectable fare: always has a numeric price and a currency, never an
/// error marker.
#[derive(Debug, Clone, PartialEq)]
pub struct FareRecord {
    pub origin: String,
    pub destination: String,
    pub origin_name: Option<String>,
    pub origin_city: Option<String>,
    pub origin_country: Option<String>,
    pub destination_name: Option<String>,
    pub destination_city: Option<String>,
    pub destination_country: Option<String>,
    pub price: f64,
    pub currency: String,
    pub display_price: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveFare {
    pub origin_name: Option<String>,
    pub origin_city: Option<String>,
    pub origin_country: Option<String>,
    pub origin_iata_code: String,
    pub destination_name: Option<String>,
    pub destination_city: Option<String>,
    pub destination_country: Option<String>,
    pub destination_iata_code: String,
    pub price: f64,
    pub display_price: String,
    pub currency: String,
    pub flight_date: String,
    pub prices_updated: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl FareRow {
    fn into_record(self, key: &str) -> Option<FareRecord> {
        if self.has_error {
            return None;
        }
        let price = self.price.as_ref().and_then(parse_number)?;
        let currency = non_empty(self.currency)?;

        let (key_origin, key_destination) = key.split_once('-').unwrap_or((key, ""));

        Some(FareRecord {
            origin: non_empty(self.origin).unwrap_or_else(|| key_origin.to_string()),
            destination: non_empty(self.destination)
                .unwrap_or_else(|| key_destination.to_string()),
            origin_name: self.origin_name,
            origin_city: self.origin_city,
            origin_country: self.origin_country,
            destination_name: self.destination_name,
            destination_city: self.destination_city,
            destination_country: self.destination_country,
            price,
            currency,
            display_price: non_empty(self.display_price),
            date: non_empty(self.date),
        })
    }
}

impl FareSnapshot {
    pub fn from_json(
        content: &str,
        last_modified: Option<DateTime<Utc>>,
    ) -> Result<Self, FareError> {
        let file: SnapshotFile = serde_json::from_str(content)?;

        let rows = match file.data {
            Value::Object(rows) => rows,
            _ => Map::new(),
        };

        Ok(Self {
            rows,
            last_modified,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First usable row, in snapshot order, whose key starts with
    /// `"{ORIGIN}-"`. This is not a price comparison: when an origin has
    /// several destinations the result depends on row order alone.
    pub fn select_for_origin(&self, origin: &str) -> Option<FareRecord> {
        let origin = origin.trim().to_uppercase();
        if origin.is_empty() {
            return None;
        }
        let prefix = format!("{origin}-");

        self.rows
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .find_map(|(key, row)| {
                if !row.is_object() {
                    return None;
                }
                let row: FareRow = serde_json::from_value(row.clone()).ok()?;
                row.into_record(key)
            })
    }

    // Snapshot freshness; the current time when the file time is unknown
    pub fn prices_updated(&self) -> String {
        self.last_modified
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl FareRecord {
    pub fn to_live_fare(&self, prices_updated: &str) -> LiveFare {
        let display_price = self
            .display_price
            .clone()
            .unwrap_or_else(|| format!("{}{}", self.currency, self.price));

        let flight_date = self
            .date
            .clone()
            .unwrap_or_else(|| Utc::now().date_naive().format("%Y-%m-%d").to_string());

        LiveFare {
            origin_name: self.origin_name.clone(),
            origin_city: self.origin_city.clone(),
            origin_country: self.origin_country.clone(),
            origin_iata_code: self.origin.clone(),
            destination_name: self.destination_name.clone(),
            destination_city: self.destination_city.clone(),
            destination_country: self.destination_country.clone(),
            destination_iata_code: self.destination.clone(),
            price: self.price,
            display_price,
            currency: self.currency.clone(),
            flight_date,
            prices_updated: prices_updated.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FareCatalog {
    path: PathBuf,
}

impl FareCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_snapshot(&self) -> Result<FareSnapshot, FareError> {
        let content = std::fs::read_to_string(&self.path)?;
        let last_modified = std::fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        FareSnapshot::from_json(&content, last_modified)
    }

    /// A missing snapshot means "no pricing available", not an error. A
    /// snapshot that cannot be read or parsed is logged and treated the same.
    pub fn load(&self) -> Option<FareSnapshot> {
        match self.read_snapshot() {
            Ok(snapshot) => Some(snapshot),
            Err(FareError::IoError(e)) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no fare snapshot present");
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unusable fare snapshot");
                None
            }
        }
    }

    pub fn fare_for_origin(&self, origin: &str) -> Option<LiveFare> {
        let snapshot = self.load()?;
        let record = snapshot.select_for_origin(origin)?;

        Some(record.to_live_fare(&snapshot.prices_updated()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn snapshot(content: &str) -> FareSnapshot {
        FareSnapshot::from_json(content, None).unwrap()
    }

    #[test]
    fn test_select_matches_origin_case_insensitively() {
        let snapshot = snapshot(r#"{"data": {"AAA-ZZZ": {"price": 100, "currency": "USD"}}}"#);

        let record = snapshot.select_for_origin("aaa").unwrap();
        assert_eq!(record.origin, "AAA");
        assert_eq!(record.destination, "ZZZ");
        assert_eq!(record.price, 100.0);
        assert_eq!(record.currency, "USD");

        assert_eq!(snapshot.select_for_origin(" AaA "), Some(record));
        assert!(snapshot.select_for_origin("BBB").is_none());
        assert!(snapshot.select_for_origin("").is_none());
    }

    #[test]
    fn test_unusable_rows_are_skipped() {
        let snapshot = snapshot(
            r#"{"data": {
                "LHR-AAA": {"currency": "GBP"},
                "LHR-BBB": {"price": 40, "currency": "GBP", "error": "no results"},
                "LHR-CCC": {"price": 41, "currency": null},
                "LHR-CCD": {"price": 42, "currency": "GBP", "error": null},
                "LHR-DDD": "not a row",
                "LHR-EEE": {"price": "soon", "currency": "GBP"},
                "LHR-FFF": {"price": "55.5", "currency": "GBP"},
                "LHR-GGG": {"price": 10, "currency": "GBP"}
            }}"#,
        );

        let record = snapshot.select_for_origin("LHR").unwrap();
        assert_eq!(record.destination, "FFF");
        assert_eq!(record.price, 55.5);
    }

    #[test]
    fn test_mistyped_descriptive_fields_do_not_block_selection() {
        let snapshot = snapshot(
            r#"{"data": {
                "AAA-ZZZ": {"price": 100, "currency": "USD", "display_price": 100,
                            "date": 20251114, "origin_name": 7, "destination_city": ["x"]}
            }}"#,
        );

        let record = snapshot.select_for_origin("AAA").unwrap();
        assert_eq!(record.destination, "ZZZ");
        assert_eq!(record.display_price, None);
        assert_eq!(record.date, None);
        assert_eq!(record.origin_name, None);
        assert_eq!(record.destination_city, None);

        let fare = record.to_live_fare("2025-01-01T00:00:00Z");
        assert_eq!(fare.display_price, "USD100");

        // A non-string currency still leaves the row unselectable
        let numeric_currency = FareSnapshot::from_json(
            r#"{"data": {"AAA-ZZZ": {"price": 100, "currency": 840}}}"#,
            None,
        )
        .unwrap();
        assert!(numeric_currency.select_for_origin("AAA").is_none());
    }

    #[test]
    fn test_selection_follows_snapshot_order() {
        let snapshot = snapshot(
            r#"{"data": {
                "DUB-STN": {"price": 90, "currency": "EUR"},
                "DUB-AMS": {"price": 20, "currency": "EUR"}
            }}"#,
        );

        let first = snapshot.select_for_origin("DUB").unwrap();
        assert_eq!(first.destination, "STN");

        for _ in 0..10 {
            assert_eq!(snapshot.select_for_origin("dub").as_ref(), Some(&first));
        }
    }

    #[test]
    fn test_origin_prefix_is_exact() {
        let snapshot = snapshot(
            r#"{"data": {
                "AAAB-XXX": {"price": 1, "currency": "USD"},
                "XAAA-YYY": {"price": 2, "currency": "USD"}
            }}"#,
        );

        assert!(snapshot.select_for_origin("AAA").is_none());
        assert_eq!(snapshot.select_for_origin("AAAB").unwrap().price, 1.0);
    }

    #[test]
    fn test_snapshot_without_data_has_no_rows() {
        assert!(snapshot(r#"{}"#).is_empty());
        assert!(snapshot(r#"{"data": []}"#).is_empty());
        assert!(snapshot(r#"{"data": {}}"#).select_for_origin("AAA").is_none());
        assert!(FareSnapshot::from_json("[1, 2]", None).is_err());
        assert!(FareSnapshot::from_json("{not json", None).is_err());
    }

    #[test]
    fn test_live_fare_defaults() {
        let snapshot = snapshot(r#"{"data": {"BLR-DEL": {"price": 3499.5, "currency": "INR"}}}"#);
        let record = snapshot.select_for_origin("BLR").unwrap();

        let fare = record.to_live_fare("2025-01-01T00:00:00.000000Z");
        assert_eq!(fare.origin_iata_code, "BLR");
        assert_eq!(fare.destination_iata_code, "DEL");
        assert_eq!(fare.display_price, "INR3499.5");
        assert_eq!(fare.flight_date, Utc::now().date_naive().format("%Y-%m-%d").to_string());
        assert_eq!(fare.prices_updated, "2025-01-01T00:00:00.000000Z");
        assert_eq!(fare.origin_name, None);

        let whole = FareRecord {
            price: 100.0,
            ..record
        };
        assert_eq!(whole.to_live_fare("t").display_price, "INR100");
    }

    #[test]
    fn test_live_fare_uses_row_fields() {
        let snapshot = snapshot(
            r#"{"data": {"LHR-JFK": {
                "origin": "LHR", "destination": "JFK",
                "origin_name": "Heathrow", "origin_city": "London",
                "origin_country": "United Kingdom",
                "destination_name": "John F. Kennedy", "destination_city": "New York",
                "price": 312, "currency": "GBP", "display_price": "£312",
                "date": "2025-09-14"
            }}}"#,
        );

        let fare = snapshot
            .select_for_origin("lhr")
            .unwrap()
            .to_live_fare("stamp");
        assert_eq!(fare.origin_name.as_deref(), Some("Heathrow"));
        assert_eq!(fare.destination_city.as_deref(), Some("New York"));
        assert_eq!(fare.display_price, "£312");
        assert_eq!(fare.flight_date, "2025-09-14");
        assert_eq!(fare.price, 312.0);
    }

    #[test]
    fn test_prices_updated_format() {
        let stamp = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let snapshot = FareSnapshot::from_json(r#"{"data": {}}"#, Some(stamp)).unwrap();

        assert_eq!(snapshot.prices_updated(), "2025-03-04T05:06:07.000000Z");
        assert!(FareSnapshot::default().prices_updated().ends_with('Z'));
    }

    #[test]
    fn test_catalog_load() {
        let dir = tempfile::tempdir().unwrap();

        let missing = FareCatalog::new(dir.path().join("flights.json"));
        assert!(missing.load().is_none());
        assert!(missing.fare_for_origin("AAA").is_none());

        let broken_path = dir.path().join("broken.json");
        std::fs::write(&broken_path, "{\"data\": ").unwrap();
        assert!(FareCatalog::new(&broken_path).load().is_none());

        let path = dir.path().join("good.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(br#"{"data": {"AAA-ZZZ": {"price": 100, "currency": "USD"}}}"#)
            .unwrap();
        drop(file);

        let catalog = FareCatalog::new(&path);
        let snapshot = catalog.load().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.last_modified.is_some());

        let fare = catalog.fare_for_origin("aaa").unwrap();
        assert_eq!(fare.display_price, "USD100");
        assert!(fare.prices_updated.ends_with('Z'));
        assert!(catalog.fare_for_origin("BBB").is_none());
    }

    #[test]
    fn test_load_sample_snapshot() {
        let snapshot = FareCatalog::new(SAMPLE_FLIGHTS_PATH).load().unwrap();

        assert!(!snapshot.is_empty());
        assert_eq!(snapshot.select_for_origin("LHR").unwrap().destination, "JFK");
        assert_eq!(snapshot.select_for_origin("FRA").unwrap().destination, "MAD");
        assert!(snapshot.select_for_origin("KEF").is_none());
    }
}

// Nearest flight service: caller address -> nearest airport in their country
// -> a fare from the current pricing snapshot

pub mod airports;
pub mod config;
pub mod fares;
pub mod geo;
pub mod response;
pub mod server;
pub mod service;

// Re-export key types for convenience
pub use airports::{Airport, CountryIndex, DatasetError, NearestAirport, RawAirport};
pub use config::{Config, ConfigError};
pub use fares::{FareCatalog, FareError, FareRecord, FareSnapshot, LiveFare};
pub use geo::{
    GeoError, GeoResolver, Ip2LocationProvider, LocationLookup, LocationProvider, UserLocation,
};
pub use response::{compose, NearestFlightResponse};
pub use service::NearestFlightService;

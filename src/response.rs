// Final payload for a nearest-flight query. The only place where missing
// upstream data becomes a human-readable message.

use serde::Serialize;

use crate::{airports::NearestAirport, fares::LiveFare, geo::UserLocation};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearestFlightResponse {
    pub user: UserLocation,
    pub nearest_airport: Option<NearestAirport>,
    pub flight: Option<LiveFare>,
    pub message: Option<String>,
}

fn no_flights_from(country: &str) -> String {
    format!("No flights available from {country}")
}

pub fn compose(
    user: UserLocation,
    nearest_airport: Option<NearestAirport>,
    flight: Option<LiveFare>,
) -> NearestFlightResponse {
    let Some(airport) = nearest_airport else {
        let message = no_flights_from(&user.country);
        return NearestFlightResponse {
            user,
            nearest_airport: None,
            flight: None,
            message: Some(message),
        };
    };

    let message = match flight {
        Some(_) => None,
        None => {
            let country = airport.airport.country.as_deref().unwrap_or(&user.country);
            Some(no_flights_from(country))
        }
    };

    NearestFlightResponse {
        user,
        nearest_airport: Some(airport),
        flight,
        message,
    }
}

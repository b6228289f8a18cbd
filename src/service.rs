// Request pipeline: address -> location -> nearest airport -> fare -> response

use std::sync::Arc;

use tracing::info;

use crate::{
    airports::CountryIndex,
    fares::FareCatalog,
    geo::GeoResolver,
    response::{compose, NearestFlightResponse},
};

#[derive(Debug, Clone)]
pub struct NearestFlightService {
    index: Arc<CountryIndex>,
    resolver: GeoResolver,
    catalog: FareCatalog,
}

impl NearestFlightService {
    pub fn new(index: Arc<CountryIndex>, resolver: GeoResolver, catalog: FareCatalog) -> Self {
        Self {
            index,
            resolver,
            catalog,
        }
    }

    pub async fn nearest_flight(&self, address: &str) -> NearestFlightResponse {
        let user = self.resolver.resolve(address).await;

        let nearest = self
            .index
            .nearest(user.latitude, user.longitude, &user.country);

        let flight = nearest
            .as_ref()
            .and_then(|n| n.airport.iata.as_deref())
            .and_then(|origin| self.catalog.fare_for_origin(origin));

        info!(
            address,
            country = %user.country,
            airport = nearest.as_ref().and_then(|n| n.airport.iata.as_deref()),
            has_flight = flight.is_some(),
            "nearest flight resolved"
        );

        compose(user, nearest, flight)
    }
}

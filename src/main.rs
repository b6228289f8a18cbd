use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nearest_flight::{
    airports::{load_airports, CountryIndex},
    server, Config, FareCatalog, GeoResolver, Ip2LocationProvider, LocationProvider,
    NearestFlightService,
};

fn build_resolver(config: &Config) -> anyhow::Result<GeoResolver> {
    let provider: Option<Arc<dyn LocationProvider>> = match &config.ip2location_api_key {
        Some(key) => {
            let provider: Arc<dyn LocationProvider> = Arc::new(
                Ip2LocationProvider::new(&config.ip2location_url, key, config.geo_timeout())
                    .context("building IP2Location client")?,
            );
            Some(provider)
        }
        None => None,
    };

    Ok(GeoResolver::new(provider, config.geo_timeout()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nearest_flight=info")),
        )
        .init();

    let config = Config::from_env().context("reading configuration")?;

    // Startup faults abort here rather than degrading each request
    let records = load_airports(&config.airports_path).with_context(|| {
        format!(
            "loading airport dataset from {}",
            config.airports_path.display()
        )
    })?;
    let index = Arc::new(CountryIndex::build(records));
    info!(
        countries = index.country_count(),
        airports = index.airport_count(),
        "airport index built"
    );

    let resolver = build_resolver(&config)?;
    if !resolver.has_provider() {
        info!("IP2LOCATION_API_KEY not set, every caller resolves to the default location");
    }

    let catalog = FareCatalog::new(&config.flights_path);
    info!(path = %catalog.path().display(), "fares are read from the snapshot on each request");

    let service = Arc::new(NearestFlightService::new(index, resolver, catalog));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    server::serve(listener, service).await?;

    Ok(())
}

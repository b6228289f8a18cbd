// HTTP surface: landing page, health check and the nearest-flight query

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use axum::{
    extract::{ConnectInfo, Query, State},
    response::Html,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::info;

use crate::{response::NearestFlightResponse, service::NearestFlightService};

// Sample locations selectable from the query string, each backed by an
// address known to resolve there
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TestLocation {
    #[serde(rename = "Bali")]
    Bali,
    #[serde(rename = "Denmark")]
    Denmark,
    #[serde(rename = "Germany")]
    Germany,
    #[serde(rename = "Iceland - no flight")]
    Iceland,
    #[serde(rename = "India")]
    India,
    #[serde(rename = "Ireland")]
    Ireland,
    #[serde(rename = "Japan")]
    Japan,
    #[serde(rename = "Spain")]
    Spain,
    #[serde(rename = "Switzerland")]
    Switzerland,
    #[serde(rename = "United Kingdom")]
    UnitedKingdom,
    #[serde(rename = "United States")]
    UnitedStates,
}

impl TestLocation {
    pub fn sample_ip(self) -> &'static str {
        match self {
            TestLocation::Bali => "202.180.53.34",
            TestLocation::Denmark => "93.176.79.132",
            TestLocation::Germany => "93.213.161.160",
            TestLocation::Iceland => "147.28.31.255",
            TestLocation::India => "223.191.3.77",
            TestLocation::Ireland => "86.47.0.1",
            TestLocation::Japan => "152.69.193.86",
            TestLocation::Spain => "81.45.0.1",
            TestLocation::Switzerland => "194.230.159.87",
            TestLocation::UnitedKingdom => "81.2.69.160",
            TestLocation::UnitedStates => "52.162.161.148",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NearestFlightParams {
    pub ip: Option<IpAddr>,
    pub location: Option<TestLocation>,
}

impl NearestFlightParams {
    // Literal address, then named test location, then the peer address
    pub fn caller_address(&self, peer: SocketAddr) -> String {
        if let Some(ip) = self.ip {
            ip.to_string()
        } else if let Some(location) = self.location {
            location.sample_ip().to_string()
        } else {
            peer.ip().to_string()
        }
    }
}

const HOME_PAGE: &str = r#"<h1>Nearest Flight API</h1>
<ul>
  <li><a href="/api/nearest-flight?ip=223.191.3.77">IN test</a></li>
  <li><a href="/api/nearest-flight?ip=81.2.69.160">UK test</a></li>
  <li><a href="/api/nearest-flight?ip=52.162.161.148">US test</a></li>
</ul>
"#;

async fn home() -> Html<&'static str> {
    Html(HOME_PAGE)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn nearest_flight(
    State(service): State<Arc<NearestFlightService>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<NearestFlightParams>,
) -> Json<NearestFlightResponse> {
    let address = params.caller_address(peer);
    Json(service.nearest_flight(&address).await)
}

// The nearest-flight handler extracts `ConnectInfo`, so this router is only
// usable through `serve`
pub(crate) fn router(service: Arc<NearestFlightService>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/api/nearest-flight", get(nearest_flight))
        .with_state(service)
}

pub async fn serve(
    listener: TcpListener,
    service: Arc<NearestFlightService>,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(
        listener,
        router(service).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::{instrument, warn};

use crate::{error::ApiError, geocode::client::Coordinates, state::AppState};

pub fn geocode_routes() -> Router<AppState> {
    Router::new().route("/geocode", get(probe))
}

#[derive(Debug, Deserialize)]
pub struct GeocodeQuery {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
}

/// Direct geocoding probe. Does not touch the store.
#[instrument(skip(state))]
pub async fn probe(
    State(state): State<AppState>,
    Query(q): Query<GeocodeQuery>,
) -> Result<Json<Coordinates>, ApiError> {
    let resolved = state
        .geocoder
        .resolve(&q.street, &q.city, &q.state, &q.zip)
        .await
        .map_err(|e| {
            warn!(error = %e, "geocoding lookup failed");
            ApiError::BadGateway("geocoding service unavailable".into())
        })?;

    match resolved {
        Some(coords) => Ok(Json(coords)),
        None => Err(ApiError::NotFound("could not geocode address".into())),
    }
}

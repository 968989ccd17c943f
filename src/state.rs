use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::AppConfig;
use crate::geocode::client::Geocoder;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    /// Constructed once and shared; this is what makes the geocoding
    /// rate limit process-wide.
    pub geocoder: Arc<Geocoder>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;
        let geocoder = Arc::new(Geocoder::new(&config.geocoder)?);
        Ok(Self {
            db,
            config,
            geocoder,
        })
    }
}

use serde::Deserialize;
use time::OffsetDateTime;

#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    pub title: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub category: String,
}

/// Coordinates are taken from the body verbatim; updates never re-geocode,
/// which allows manual correction of a bad resolution.
#[derive(Debug, Deserialize)]
pub struct UpdateRecordRequest {
    pub title: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub category: String,
    pub latitude: f64,
    pub longitude: f64,
}

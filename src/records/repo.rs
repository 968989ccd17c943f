use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::geocode::client::Coordinates;
use crate::records::dto::{CreateRecordRequest, UpdateRecordRequest};

/// A location-tagged event record. `created_by` is a weak reference: the
/// owning user may be deleted, leaving the record orphaned. `version` is the
/// optimistic-concurrency token and stays internal.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventRecord {
    pub id: Uuid,
    pub title: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    #[serde(rename = "date", with = "time::serde::rfc3339")]
    pub event_date: OffsetDateTime,
    pub category: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_by: Option<Uuid>,
    #[serde(skip_serializing, default)]
    pub version: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

const RECORD_COLUMNS: &str = "id, title, street, city, state, zip_code, event_date, \
     category, latitude, longitude, created_by, version, created_at";

impl EventRecord {
    pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<EventRecord>> {
        let rows = sqlx::query_as::<_, EventRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM records ORDER BY event_date DESC"
        ))
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<EventRecord>> {
        let row = sqlx::query_as::<_, EventRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn exists(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let found: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM records WHERE id = $1)")
            .bind(id)
            .fetch_one(db)
            .await?;
        Ok(found)
    }

    pub async fn insert(
        db: &PgPool,
        body: &CreateRecordRequest,
        coords: Coordinates,
        created_by: Uuid,
    ) -> anyhow::Result<EventRecord> {
        let record = sqlx::query_as::<_, EventRecord>(&format!(
            r#"
            INSERT INTO records
                (title, street, city, state, zip_code, event_date, category,
                 latitude, longitude, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(&body.title)
        .bind(&body.street)
        .bind(&body.city)
        .bind(&body.state)
        .bind(&body.zip_code)
        .bind(body.date)
        .bind(&body.category)
        .bind(coords.latitude)
        .bind(coords.longitude)
        .bind(created_by)
        .fetch_one(db)
        .await?;
        Ok(record)
    }

    /// Applies the update only if `expected_version` still matches, bumping
    /// the version. Returns `false` when the row was changed or removed in
    /// the meantime; the caller decides between conflict and not-found.
    /// `created_by` is deliberately never touched.
    pub async fn update(
        db: &PgPool,
        id: Uuid,
        expected_version: i32,
        body: &UpdateRecordRequest,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE records
            SET title = $3, street = $4, city = $5, state = $6, zip_code = $7,
                event_date = $8, category = $9, latitude = $10, longitude = $11,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(&body.title)
        .bind(&body.street)
        .bind(&body.city)
        .bind(&body.state)
        .bind(&body.zip_code)
        .bind(body.date)
        .bind(&body.category)
        .bind(body.latitude)
        .bind(body.longitude)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Permanent delete. Returns `false` when the row was already gone.
    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM records WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

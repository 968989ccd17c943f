use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{jwt::AuthUser, repo::User},
    error::ApiError,
    records::{
        dto::{CreateRecordRequest, UpdateRecordRequest},
        repo::EventRecord,
    },
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/records", get(list_records))
        .route("/records/:id", get(get_record))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/records", post(create_record))
        .route(
            "/records/:id",
            axum::routing::put(update_record).delete(delete_record),
        )
}

/// Only the creator may mutate a record. Orphaned records (`created_by` is
/// `None`) are owned by nobody and cannot be mutated.
pub(crate) fn is_owner(record: &EventRecord, principal: Uuid) -> bool {
    record.created_by == Some(principal)
}

/// Outcome of an optimistic write that affected zero rows: the record either
/// vanished after we loaded it, or a concurrent writer bumped the version
/// first and the caller should reload and retry.
fn write_conflict_outcome(still_exists: bool) -> ApiError {
    if still_exists {
        ApiError::Conflict("record was modified concurrently, reload and retry".into())
    } else {
        ApiError::NotFound("record not found".into())
    }
}

/// Shared head of the mutation protocol: load the target, then apply the
/// ownership guard against the authenticated principal.
async fn load_owned(
    state: &AppState,
    id: Uuid,
    principal: Uuid,
) -> Result<EventRecord, ApiError> {
    let record = EventRecord::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("record not found".into()))?;

    if !is_owner(&record, principal) {
        warn!(record_id = %id, %principal, "mutation denied: not the creator");
        return Err(ApiError::Forbidden(
            "only the creator may modify this record".into(),
        ));
    }
    Ok(record)
}

#[instrument(skip(state))]
pub async fn list_records(
    State(state): State<AppState>,
) -> Result<Json<Vec<EventRecord>>, ApiError> {
    let records = EventRecord::list_all(&state.db).await?;
    Ok(Json(records))
}

#[instrument(skip(state))]
pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EventRecord>, ApiError> {
    let record = EventRecord::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("record not found".into()))?;
    Ok(Json(record))
}

#[instrument(skip(state, body))]
pub async fn create_record(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateRecordRequest>,
) -> Result<(StatusCode, HeaderMap, Json<EventRecord>), ApiError> {
    // the token's name claim carries the email; resolve it to a stored user
    let user = User::find_by_email(&state.db, &auth.email)
        .await?
        .ok_or_else(|| {
            warn!(email = %auth.email, "token principal has no user record");
            ApiError::Unauthorized("user not found".into())
        })?;

    let coords = state
        .geocoder
        .resolve(&body.street, &body.city, &body.state, &body.zip_code)
        .await
        .map_err(|e| {
            warn!(error = %e, "geocoding lookup failed");
            ApiError::BadGateway("geocoding service unavailable".into())
        })?
        .ok_or_else(|| {
            warn!(street = %body.street, city = %body.city, "address did not resolve");
            ApiError::Validation("could not resolve coordinates for the provided address".into())
        })?;

    let record = EventRecord::insert(&state.db, &body, coords, user.id).await?;
    info!(record_id = %record.id, user_id = %user.id, "record created");

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/records/{}", record.id).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(record)))
}

#[instrument(skip(state, body))]
pub async fn update_record(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateRecordRequest>,
) -> Result<StatusCode, ApiError> {
    let existing = load_owned(&state, id, auth.id).await?;

    if EventRecord::update(&state.db, id, existing.version, &body).await? {
        info!(record_id = %id, user_id = %auth.id, "record updated");
        return Ok(StatusCode::NO_CONTENT);
    }

    // the row changed after we loaded it: deleted, or updated by a
    // concurrent writer
    let still_exists = EventRecord::exists(&state.db, id).await?;
    if still_exists {
        warn!(record_id = %id, "concurrent modification lost the race");
    }
    Err(write_conflict_outcome(still_exists))
}

#[instrument(skip(state))]
pub async fn delete_record(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    load_owned(&state, id, auth.id).await?;

    if EventRecord::delete(&state.db, id).await? {
        info!(record_id = %id, user_id = %auth.id, "record deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("record not found".into()))
    }
}

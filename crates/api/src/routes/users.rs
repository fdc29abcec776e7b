//! User and settings handlers.
//!
//! There is no authentication: any caller may read or modify any user.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use serde_json::{Map, Value};
use tracing::instrument;

use bookshelf_core::{User, UserDraft, UserFilter, UserId, UserPatch};

use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;
use crate::version;

/// Build the users router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user).patch(update_user))
        .route("/users/{id}/settings", get(get_settings).post(merge_settings))
}

/// List users matching every `key=value` pair of the query string.
///
/// # Errors
///
/// Returns 500 if the store cannot be read.
#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    ApiQuery(pairs): ApiQuery<Vec<(String, String)>>,
) -> Result<Json<Vec<User>>> {
    let filter = UserFilter::new(pairs);
    Ok(Json(state.store().list_users(&filter).await?))
}

/// Register a user, assigning `u-<ms>` when no id is supplied.
///
/// # Errors
///
/// Returns 409 if the id is already taken.
#[instrument(skip(state, draft))]
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(draft): ApiJson<UserDraft>,
) -> Result<(StatusCode, Json<User>)> {
    let user = draft.into_user(|| UserId::new(format!("u-{}", version::unique_millis())));
    let user = state.store().create_user(user).await?;
    tracing::info!(user_id = %user.id, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// # Errors
///
/// Returns 404 if the user does not exist.
#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<User>> {
    Ok(Json(state.store().get_user(&id).await?))
}

/// Merge arbitrary fields into a user. `id` cannot be changed.
///
/// # Errors
///
/// Returns 400 for an empty patch or a field of the wrong type and 404 if
/// the user does not exist.
#[instrument(skip(state, patch))]
pub async fn update_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(patch): ApiJson<UserPatch>,
) -> Result<Json<User>> {
    if patch.is_empty() {
        return Err(AppError::BadRequest("no fields to update".to_string()));
    }
    Ok(Json(state.store().update_user(&id, &patch).await?))
}

/// # Errors
///
/// Returns 404 if the user does not exist.
#[instrument(skip(state))]
pub async fn get_settings(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<Map<String, Value>>> {
    Ok(Json(state.store().get_user(&id).await?.settings))
}

/// Shallow-merge the body into the user's settings.
///
/// # Errors
///
/// Returns 400 if the body is not a JSON object and 404 if the user does not
/// exist.
#[instrument(skip(state, patch))]
pub async fn merge_settings(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(patch): ApiJson<Map<String, Value>>,
) -> Result<Json<Map<String, Value>>> {
    Ok(Json(state.store().merge_user_settings(&id, patch).await?))
}

//! Handler functions. Each shapes a JSON response from a Persistence Port read or
//! delegates to the Reconciler/Scheduler/Tag Deleter; no business logic lives here.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use super::state::ServerState;
use super::types::{ApiError, LastSyncResponse, ListRepositoriesQuery, UpdateIntervalRequest};
use crate::persistence::{ImageStore, RepositoryStore, TagStore};

/// `POST /sync` — triggers `PerformSync`.
pub async fn perform_sync(State(state): State<ServerState>) -> Result<StatusCode, ApiError> {
    state.scheduler.perform_sync().await?;
    Ok(StatusCode::ACCEPTED)
}

/// `GET /sync/last` — reads the last recorded sync time.
pub async fn get_last_sync_time(
    State(state): State<ServerState>,
) -> Result<Json<LastSyncResponse>, ApiError> {
    let last_sync_time = state.scheduler.last_sync_time().await?;
    Ok(Json(LastSyncResponse { last_sync_time }))
}

/// `PUT /sync/interval` — live-reconfigures the scheduler's period.
pub async fn update_sync_interval(
    State(state): State<ServerState>,
    Json(body): Json<UpdateIntervalRequest>,
) -> Result<StatusCode, ApiError> {
    state.scheduler.update_sync_interval(body.minutes).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /repositories/{ns}/{image}/tags/{tag}` — deletes a tag locally and
/// best-effort on the registry.
pub async fn delete_tag(
    State(state): State<ServerState>,
    Path((namespace, image, tag)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    state.deleter.delete_tag(&namespace, &image, &tag).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /repositories?page=&limit=&search=` — read-only pass-through listing.
pub async fn list_repositories(
    State(state): State<ServerState>,
    Query(query): Query<ListRepositoriesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let repositories = state
        .repositories
        .list(query.page, query.limit, query.search.as_deref())
        .await?;
    Ok(Json(repositories))
}

/// `GET /repositories/{ns}` — images owned by one repository.
pub async fn list_images(
    State(state): State<ServerState>,
    Path(namespace): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let images = state.images.list(&namespace).await?;
    Ok(Json(images))
}

/// `GET /repositories/{ns}/{image}` — a single image by name.
pub async fn get_image(
    State(state): State<ServerState>,
    Path((namespace, image)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    match state.images.get(&namespace, &image).await? {
        Some(image) => Ok(Json(image).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

/// `GET /repositories/{ns}/{image}/tags/{tag}` — a tag with eagerly-loaded metadata and
/// layers.
pub async fn get_tag(
    State(state): State<ServerState>,
    Path((namespace, image, tag)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    match state.tags.get(&namespace, &image, &tag).await? {
        Some(tag) => Ok(Json(tag).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

//! Router assembly.

use axum::routing::{delete, get, post, put};
use axum::Router;

use super::handlers;
use super::state::ServerState;

/// Builds the full Axum router over `state`.
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/sync", post(handlers::perform_sync))
        .route("/sync/last", get(handlers::get_last_sync_time))
        .route("/sync/interval", put(handlers::update_sync_interval))
        .route(
            "/repositories/{namespace}/{image}/tags/{tag}",
            delete(handlers::delete_tag).get(handlers::get_tag),
        )
        .route("/repositories", get(handlers::list_repositories))
        .route("/repositories/{namespace}", get(handlers::list_images))
        .route("/repositories/{namespace}/{image}", get(handlers::get_image))
        .with_state(state)
}

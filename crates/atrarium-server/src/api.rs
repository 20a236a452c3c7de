//! The HTTP read surface: health check and feed skeleton reads.
//!
//! This is deliberately thin — the dashboard and CRUD surfaces live
//! elsewhere. Feed rendering services call the skeleton route and hydrate
//! the returned URIs themselves.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use atrarium_group::{ErrorKind, FeedSkeleton, GroupError};
use atrarium_types::GroupId;

use crate::host::GroupHost;

/// Health check handler.
///
/// Returns `200 OK` with server status and version. Used by monitoring
/// and CI to verify the server is running.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct FeedParams {
    limit: Option<u32>,
    cursor: Option<String>,
}

/// Maps a [`GroupError`] to the closest HTTP status, logging only
/// internal failures.
fn group_err_to_status(e: &GroupError) -> StatusCode {
    match e.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Permission => StatusCode::FORBIDDEN,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Internal => {
            tracing::error!(error = %e, "group operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// GET /api/groups/{id}/feed
async fn feed_skeleton_handler(
    State(host): State<Arc<GroupHost>>,
    Path(group_id): Path<String>,
    Query(params): Query<FeedParams>,
) -> Result<Json<FeedSkeleton>, (StatusCode, Json<Value>)> {
    let group_id = GroupId::new(group_id)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))))?;

    let actor = host.actor(&group_id);
    let result = {
        let actor = actor.lock().await;
        // Distinguish an unknown group from one that merely has no posts.
        actor.get_config().and_then(|_| {
            actor.get_feed_skeleton(params.limit, params.cursor.as_deref())
        })
    };

    result.map(Json).map_err(|e| {
        let status = group_err_to_status(&e);
        (status, Json(json!({ "error": e.to_string() })))
    })
}

/// Builds the application router.
pub fn app(host: Arc<GroupHost>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/groups/{id}/feed", get(feed_skeleton_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(host)
}

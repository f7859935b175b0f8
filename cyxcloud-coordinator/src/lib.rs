//! HTTP edge for the coordinator: wires the Metadata Store, Node Registry,
//! Liveness Tracker, Placement Planner, Re-replication Loop and Integrity
//! Reconciler behind an axum router.

pub mod error;
pub mod handlers;
pub mod state;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the router: one route per handler, a trace layer, and permissive
/// CORS for node agents calling in from outside the cluster's own network.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/register", post(handlers::register))
        .route("/unregister", post(handlers::unregister))
        .route("/heartbeat", post(handlers::heartbeat))
        .route("/upload", post(handlers::upload))
        .route("/metadata", get(handlers::get_metadata))
        .route("/delete", delete(handlers::delete))
        .route("/files", get(handlers::list_files))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

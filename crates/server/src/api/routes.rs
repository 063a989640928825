use axum::{
    middleware,
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{admin, handlers, middleware::auth_middleware, middleware::metrics_middleware, workers};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Unauthenticated: probes and scraping
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics));

    let protected_routes = Router::new()
        .route("/config", get(handlers::get_config))
        // Worker review
        .route("/workers/{worker}", get(workers::get_worker))
        .route("/workers/{worker}/files", get(workers::list_files))
        .route("/workers/{worker}/files/{batch}", get(workers::download_file))
        .route(
            "/workers/{worker}/files/{batch}/select",
            post(workers::select_file),
        )
        .route("/workers/{worker}/current", get(workers::get_current))
        .route("/workers/{worker}/current/cells", patch(workers::edit_cell))
        .route("/workers/{worker}/current/rows", put(workers::replace_rows))
        .route("/workers/{worker}/current/save", post(workers::save))
        .route("/workers/{worker}/current/accept", post(workers::accept))
        .route("/workers/{worker}/current/reject", post(workers::reject))
        .route("/workers/{worker}/next", post(workers::next_batch))
        // Admin
        .route("/admin/ledger", get(admin::get_ledger))
        .route(
            "/admin/workers/{worker}/allocate",
            post(admin::allocate_for_worker),
        )
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    let api_routes = public_routes.merge(protected_routes).with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}

//! # Cocoa Trace Server
//!
//! Thin HTTP surface over the traceability [`Ledger`](cocoa_trace::Ledger).
//! All routes live under [`routes::API_BASE`] except `/health`.
//!
//! Errors are returned as `{"error": <kind>, "message": <text>}` with
//! 422 for validation failures, 409 for a delivery that already has a block,
//! 404 for unknown tokens and 500 otherwise.

pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use cocoa_trace::store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ErrorBody};
pub use routes::{router, API_BASE};
pub use state::AppState;

/// The full application: routes plus request tracing and permissive CORS.
pub fn app<S: Store + 'static>(state: AppState<S>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

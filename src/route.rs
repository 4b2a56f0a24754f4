//! Route definitions for the URL shortener API

use axum::routing::{delete, get, post};
use axum::{middleware, Router};

use crate::handler::{
    create_short_url, delete_short_url, get_qr_code, health, list_links, ranking_urls, ranking_users, redirect_url,
};
use crate::middleware::auth_middleware;
use crate::state::AppState;

/// Creates and configures the Axum application router with all routes
///
/// # Route Definitions
///
/// - `GET /health` - Liveness check
/// - `GET /{id}` - Redirects to the original URL (public endpoint)
/// - `GET /{id}/qr` - QR code of the short URL (public endpoint)
/// - `POST /api/link` - Creates a new short URL
/// - `GET /api/link` - Lists the links of one submitter
/// - `GET /api/link/urls` - Links ranked by clicks
/// - `GET /api/link/users` - Submitters ranked by clicks
/// - `DELETE /api/link/{id}` - Deletes a short URL
pub fn create_app(state: AppState) -> Router {
    // API routes that require authorization check
    let api_routes = Router::new()
        .route("/link", post(create_short_url).get(list_links))
        .route("/link/urls", get(ranking_urls))
        .route("/link/users", get(ranking_users))
        .route("/link/{id}", delete(delete_short_url))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/{id}", get(redirect_url))
        .route("/{id}/qr", get(get_qr_code))
        .nest("/api", api_routes)
        .with_state(state)
}

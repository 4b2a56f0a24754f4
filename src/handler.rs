//! HTTP request handlers for the URL shortener API
//!
//! Handlers only read enrichment state; none of them triggers a probe, a QR
//! generation or a ranking run.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use crate::creation::create_short_link;
use crate::error::{AppError, Result};
use crate::middleware::ClientIp;
use crate::model::{
    ClickEvent, CreateProperties, CreateRequest, CreateResponse, LinkProperties, ListParams, ListResponse,
    Reachability, Safety,
};
use crate::state::AppState;

/// Creates a new short URL
///
/// # Request Body
///
/// ```json
/// { "url": "http://example.com/", "sponsor": null, "qr": true }
/// ```
///
/// # Response
///
/// - **201 Created** - `Location` points at the short URL
/// - **400 Bad Request** - URL is not a valid http(s) URL
/// - **403 Forbidden** - URL was already classified unsafe
pub async fn create_short_url(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(payload): Json<CreateRequest>,
) -> Result<Response> {
    let props = CreateProperties {
        ip,
        sponsor: payload.sponsor.filter(|s| !s.is_empty()),
        qr: payload.qr,
    };
    let link = create_short_link(&state, &payload.url, props).await?;

    let short_url = state.short_url(&link.hash);
    let response = CreateResponse {
        url: short_url.clone(),
        properties: LinkProperties {
            qr: payload.qr.then(|| format!("{}/qr", short_url)),
        },
    };

    Ok((StatusCode::CREATED, [(header::LOCATION, short_url)], Json(response)).into_response())
}

/// Redirects a short URL to its original destination
///
/// # Response
///
/// - **3xx** (307 unless the link says otherwise) - target is safe and reachable
/// - **400 Bad Request** + `Retry-After` - safety or reachability not known yet,
///   or the target is currently unreachable
/// - **403 Forbidden** - target classified unsafe
/// - **404 Not Found** - Short URL does not exist
///
/// Only successful redirects are logged as clicks.
pub async fn redirect_url(
    Path(id): Path<String>,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
) -> Result<Response> {
    let link = state
        .registry
        .find_by_key(&id)?
        .ok_or_else(|| AppError::NotFound(id.clone()))?;

    match link.safety {
        Safety::Unsafe => return Err(AppError::Unsafe(link.target)),
        Safety::Unknown => {
            return Err(AppError::NotYetAvailable {
                hash: id,
                what: "safety",
            })
        }
        Safety::Safe => {}
    }

    if state.reachability.is_reachable(&link.target) != Reachability::Reachable {
        return Err(AppError::NotYetAvailable {
            hash: id,
            what: "reachability",
        });
    }

    let click = ClickEvent {
        hash: link.hash.clone(),
        ip,
        created_at: Utc::now(),
    };
    if let Err(e) = state.registry.record_click(&click) {
        warn!("failed to record click on {}: {}", link.hash, e);
    }

    let status = StatusCode::from_u16(link.mode)
        .ok()
        .filter(|s| s.is_redirection())
        .unwrap_or(StatusCode::TEMPORARY_REDIRECT);
    Ok((status, [(header::LOCATION, link.target)]).into_response())
}

/// Returns the QR code of a short URL as a PNG image
///
/// # Response
///
/// - **200 OK** - `image/png`
/// - **400 Bad Request** + `Retry-After` - no QR requested, or not generated yet
/// - **404 Not Found** - Short URL does not exist
pub async fn get_qr_code(Path(id): Path<String>, State(state): State<AppState>) -> Result<Response> {
    let image: Bytes = state.qr.get_qr(&id)?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "image/png")], image).into_response())
}

/// Links ranked by clicks, from the latest ranking snapshot
pub async fn ranking_urls(State(state): State<AppState>) -> impl IntoResponse {
    Json(ListResponse {
        list: state.ranking.ranking(),
    })
}

/// Submitters ranked by clicks, from the latest ranking snapshot
pub async fn ranking_users(State(state): State<AppState>) -> impl IntoResponse {
    Json(ListResponse {
        list: state.ranking.users(),
    })
}

/// Lists the links of one submitter with pagination
///
/// # Example Request
///
/// `GET /api/link?ip=10.0.0.1&page=2&limit=20`
pub async fn list_links(State(state): State<AppState>, Query(params): Query<ListParams>) -> Result<Response> {
    // Ensure page is at least 1
    let page = params.page.unwrap_or(1).max(1);

    // Limit to maximum of 100 items per page
    let limit = params.limit.unwrap_or(10).min(100);

    let offset = (page - 1) * limit;
    let results = state.registry.list_by_owner(&params.ip, offset, limit)?;

    Ok(Json(json!({
        "page": page,
        "limit": limit,
        "total_fetched": results.len(),
        "data": results
    }))
    .into_response())
}

/// Deletes a short URL
///
/// Queued QR jobs for it are dropped by the worker and it leaves the
/// rankings on the next recomputation.
pub async fn delete_short_url(Path(id): Path<String>, State(state): State<AppState>) -> Result<Response> {
    match state.registry.delete(&id)? {
        Some(_) => Ok((
            StatusCode::OK,
            Json(json!({
                "message": "Short link deleted successfully",
                "deleted_id": id
            })),
        )
            .into_response()),
        None => Err(AppError::NotFound(id)),
    }
}

pub async fn health() -> &'static str {
    "ok"
}

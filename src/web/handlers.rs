use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ApiError, AppState};
use crate::proxy::MANIFEST_CONTENT_TYPE;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    url: Option<String>,
}

impl PageQuery {
    /// The requested page URL, verbatim. Anything non-blank is handed to
    /// the resolver; a value that is not a fetchable page fails there.
    fn page_url(self) -> Result<String, ApiError> {
        match self.url {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(ApiError::MissingUrl),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub page_url: String,
    pub manifest_url: String,
    pub tier: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub cached: usize,
}

/// `GET /stream?url=`
pub async fn stream(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Response, ApiError> {
    let page_url = query.page_url()?;
    let (resolution, upstream) = state.resolver.stream(&page_url).await?;

    debug!(
        tier = resolution.tier,
        manifest_url = %resolution.manifest_url,
        content_length = ?upstream.content_length(),
        "Relaying manifest"
    );
    let body = Body::from_stream(upstream.into_bytes_stream());
    Ok(([(CONTENT_TYPE, MANIFEST_CONTENT_TYPE)], body).into_response())
}

/// `GET /resolve?url=`
pub async fn resolve(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let page_url = query.page_url()?;
    let resolution = state.resolver.resolve(&page_url).await?;
    Ok(Json(ResolveResponse {
        page_url,
        manifest_url: resolution.manifest_url,
        tier: resolution.tier.to_string(),
    }))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        cached: state.resolver.cache().len(),
    })
}

//! Health handlers.
//!
//! - GET /healthz (alias /cicd) -> writes a probe row to the metadata store;
//!   200 with `Cache-Control: no-cache` when the write succeeds, 503 otherwise.

use crate::{
    errors::AppError,
    handlers::{reject_body, reject_query},
    services::AppState,
};
use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

/// `GET /healthz`
pub async fn healthz(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Response, AppError> {
    info!("Health check request received");
    reject_query(query.as_deref())?;
    reject_body(&body)?;

    if state.health.probe().await {
        info!("Health check succeeded: metadata store accepted the probe");
        Ok((
            StatusCode::OK,
            [(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"))],
        )
            .into_response())
    } else {
        error!("Health check failed: metadata store is unavailable");
        Ok(StatusCode::SERVICE_UNAVAILABLE.into_response())
    }
}

/// Every method other than GET on the health endpoints.
pub async fn health_method_not_allowed(
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> AppError {
    warn!(%method, "Method not allowed on health endpoint");
    if let Err(err) = reject_query(query.as_deref()).and_then(|_| reject_body(&body)) {
        return err;
    }
    AppError::method_not_allowed(format!("{} is not allowed", method))
}

//! HTTP handlers. Every endpoint rejects query strings; health endpoints
//! also reject request bodies.

pub mod file_handlers;
pub mod health_handlers;

use crate::errors::AppError;
use tracing::warn;

/// 400 when the request carries any query parameters.
pub(crate) fn reject_query(query: Option<&str>) -> Result<(), AppError> {
    if query.is_some_and(|q| !q.is_empty()) {
        warn!("request rejected: unexpected query parameters");
        return Err(AppError::bad_request("query parameters are not allowed"));
    }
    Ok(())
}

/// 400 when the request carries a body.
pub(crate) fn reject_body(body: &[u8]) -> Result<(), AppError> {
    if !body.is_empty() {
        warn!("request rejected: unexpected request body");
        return Err(AppError::bad_request("request body is not allowed"));
    }
    Ok(())
}

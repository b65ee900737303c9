//! HTTP handlers for file operations.
//! Validates the request shape and delegates everything else to
//! `FileRegistry`.

use crate::{
    errors::AppError,
    handlers::reject_query,
    models::file::FileRecord,
    services::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, RawQuery, State},
    http::{Method, StatusCode},
};
use tracing::{error, info, warn};

/// Name of the single multipart part carrying the upload.
pub const UPLOAD_FIELD: &str = "profilePic";

/// `POST /v1/file`: multipart upload with exactly one `profilePic` part.
pub async fn upload_file(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileRecord>), AppError> {
    reject_query(query.as_deref())?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(err.status(), err.body_text()))?
    {
        if upload.is_some() {
            warn!("File upload rejected: more than one part");
            return Err(AppError::bad_request("exactly one file part is accepted"));
        }
        if field.name() != Some(UPLOAD_FIELD) {
            warn!(part = ?field.name(), "File upload rejected: unexpected part name");
            return Err(AppError::bad_request(format!(
                "expected a single `{}` part",
                UPLOAD_FIELD
            )));
        }
        let file_name = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|err| AppError::new(err.status(), err.body_text()))?;
        upload = Some((file_name, data));
    }

    let Some((file_name, data)) = upload else {
        warn!("File upload rejected: no file part");
        return Err(AppError::bad_request(format!(
            "missing `{}` part",
            UPLOAD_FIELD
        )));
    };

    info!(file_name = ?file_name, "File upload initiated");
    let record = state.files.create(file_name, data).await.map_err(|err| {
        error!(error = %err, "Failed to upload file");
        AppError::bad_request(format!("upload failed: {}", err))
    })?;

    info!(id = %record.id, "File uploaded successfully");
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /v1/file/list`: every key in the object store.
pub async fn list_files(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<String>>, AppError> {
    reject_query(query.as_deref())?;
    let keys = state.files.list().await.map_err(|err| {
        error!(error = %err, "Error listing objects");
        AppError::from(err)
    })?;
    Ok(Json(keys))
}

/// `GET /v1/file/{id}`
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Json<FileRecord>, AppError> {
    reject_query(query.as_deref())?;
    info!(id = %id, "File retrieval requested");

    match state.files.fetch(&id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(AppError::not_found(format!("file `{}` not found", id))),
    }
}

/// `DELETE /v1/file/{id}`: 204 when removed, 404 when there was no record.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<StatusCode, AppError> {
    reject_query(query.as_deref())?;
    info!(id = %id, "File deletion requested");

    if state.files.delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("file `{}` not found", id)))
    }
}

/// `GET` or `DELETE /v1/file` without an id.
pub async fn missing_file_id(method: Method) -> AppError {
    warn!(%method, "Request to /v1/file without a file id");
    AppError::bad_request("a file id is required")
}

/// Unsupported methods on the file endpoints.
pub async fn method_not_allowed(method: Method, RawQuery(query): RawQuery) -> AppError {
    warn!(%method, "Method not allowed on file endpoint");
    if let Err(err) = reject_query(query.as_deref()) {
        return err;
    }
    AppError::method_not_allowed(format!("{} is not allowed", method))
}

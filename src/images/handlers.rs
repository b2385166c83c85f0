use std::io;

use axum::{
    body::Body,
    extract::{
        multipart::{Field, MultipartError},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::TryStreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, info, instrument};

use super::{
    dto::{DeleteResponse, UploadResponse},
    repo::{self, Image},
    services::{self, BulkUpload},
};
use crate::{
    db::Page,
    error::{AppError, Result},
    state::AppState,
};

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/images", get(list_images))
        .route("/images/", get(list_images))
        .route("/users/:user_id/images", get(list_user_images))
        .route("/users/:user_id/images/", get(list_user_images))
        .route(
            "/users/:user_id/images/:image",
            get(read_image).delete(delete_image),
        )
        .route("/users/:user_id/images/:image/file", get(read_image_file))
}

/// Upload routes. Bodies stream to disk, so the default body cap is lifted unless configured.
pub fn write_routes(max_upload_bytes: Option<usize>) -> Router<AppState> {
    let limit = match max_upload_bytes {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };
    Router::new()
        .route("/users/:user_id/images/uploadfiles", post(upload_images))
        .route("/users/:user_id/images/uploadfiles/", post(upload_images))
        .route("/users/:user_id/images/:image", post(upload_image))
        .layer(limit)
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn list_images(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Image>>> {
    Ok(Json(repo::list_images(&state.db, page).await?))
}

#[instrument(skip(state))]
pub async fn list_user_images(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Image>>> {
    Ok(Json(
        repo::list_images_for_user(&state.db, user_id, page).await?,
    ))
}

#[instrument(skip(state))]
pub async fn read_image(
    State(state): State<AppState>,
    Path((user_id, image_id)): Path<(i64, i64)>,
) -> Result<Json<Image>> {
    Ok(Json(services::get_image(&state, user_id, image_id).await?))
}

#[instrument(skip(state))]
pub async fn read_image_file(
    State(state): State<AppState>,
    Path((user_id, image_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse> {
    let (image, file) = services::open_image_file(&state, user_id, image_id).await?;
    let mime = mime_guess::from_path(&image.path).first_or_octet_stream();
    let body = Body::from_stream(ReaderStream::new(file));
    Ok(([(header::CONTENT_TYPE, mime.to_string())], body))
}

/// POST /users/:user_id/images/:name (multipart, field `file`)
#[instrument(skip(state, mp))]
pub async fn upload_image(
    State(state): State<AppState>,
    Path((user_id, name)): Path<(i64, String)>,
    mut mp: Multipart,
) -> Result<Json<UploadResponse>> {
    while let Some(field) = mp.next_field().await.map_err(bad_multipart)? {
        let is_file = field.name() == Some("file") || field.file_name().is_some();
        if !is_file {
            debug!(field = ?field.name(), "skipping non-file field");
            continue;
        }
        // the stored name comes from the stream itself; the path label is only the record name
        let file_name = field
            .file_name()
            .map(str::to_owned)
            .unwrap_or_else(|| name.clone());

        let reader = field_reader(field);
        tokio::pin!(reader);
        let stored = services::upload(&state, user_id, &name, &file_name, &mut reader).await?;
        info!(user_id, path = %stored.path.display(), filename = %stored.file_name, "upload complete");
        return Ok(Json(UploadResponse {
            filename: stored.file_name,
        }));
    }
    Err(AppError::BadRequest("file is required".into()))
}

/// POST /users/:user_id/images/uploadfiles (multipart, many `files`)
///
/// Responds with the last stored file name only.
#[instrument(skip(state, mp))]
pub async fn upload_images(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    mut mp: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut bulk = BulkUpload::begin(&state, user_id).await?;
    while let Some(field) = mp.next_field().await.map_err(bad_multipart)? {
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            debug!(field = ?field.name(), "skipping non-file field");
            continue;
        };
        let reader = field_reader(field);
        tokio::pin!(reader);
        bulk.add(&file_name, &mut reader).await?;
    }

    let last = bulk
        .finish()?
        .pop()
        .ok_or_else(|| AppError::BadRequest("At least one file is required".into()))?;
    info!(user_id, filename = %last.file_name, "bulk upload complete");
    Ok(Json(UploadResponse {
        filename: last.file_name,
    }))
}

#[instrument(skip(state))]
pub async fn delete_image(
    State(state): State<AppState>,
    Path((user_id, image_id)): Path<(i64, i64)>,
) -> Result<Json<DeleteResponse>> {
    services::delete_image(&state, user_id, image_id).await?;
    Ok(Json(DeleteResponse {
        msg: "image deleted".into(),
    }))
}

fn field_reader<'a>(field: Field<'a>) -> impl AsyncRead + Send + 'a {
    StreamReader::new(field.map_err(io::Error::other))
}

fn bad_multipart(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge("Upload exceeds the configured size limit".into());
    }
    AppError::BadRequest(format!("Invalid multipart body: {e}"))
}

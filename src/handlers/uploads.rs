use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};

use crate::{error::AppError, upload::UploadManager};

/// Serves a previously uploaded image by its stored name.
pub async fn serve_upload(
    State(uploads): State<UploadManager>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let bytes = uploads.read(&filename).await?;
    let content_type = mime_guess::from_path(&filename).first_or_octet_stream();

    Ok(([(header::CONTENT_TYPE, content_type.to_string())], bytes))
}

use axum::{
    Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::{AppError, PAYLOAD_TOO_LARGE_MESSAGE},
    models::post::{
        CreatePostRequest, DeletePostParams, PostListParams, PostResponse, REQUIRED_FIELDS_MESSAGE,
    },
    store::PostStore,
    upload::{UploadManager, UploadedFile},
};

/// List posts (newest first), optionally filtered by category and color.
pub async fn list_posts(
    State(posts): State<PostStore>,
    State(uploads): State<UploadManager>,
    Query(params): Query<PostListParams>,
) -> Result<impl IntoResponse, AppError> {
    let items: Vec<PostResponse> = posts
        .list(&params)
        .await?
        .into_iter()
        .map(|post| PostResponse::from_post(post, &uploads))
        .collect();

    Ok(Json(items))
}

/// Create a new post from a multipart form.
/// `title` and `content` are required; `image` is optional.
pub async fn create_post(
    State(posts): State<PostStore>,
    State(uploads): State<UploadManager>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let mut multipart = multipart.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let mut title = None;
    let mut content = None;
    let mut category = None;
    let mut color = None;
    let mut location = None;
    let mut author_id = None;
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => title = Some(read_text(field).await?),
            "content" => content = Some(read_text(field).await?),
            "category" => category = Some(read_text(field).await?),
            "color" => color = Some(read_text(field).await?),
            "location" => location = Some(read_text(field).await?),
            "authorId" => author_id = Some(read_text(field).await?),
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                image = Some(UploadedFile { file_name, bytes });
            }
            _ => {} // Ignore unknown fields.
        }
    }

    // 1. Presence here, blankness after trimming is checked by the store
    let (Some(title), Some(content)) = (title, content) else {
        return Err(AppError::BadRequest(REQUIRED_FIELDS_MESSAGE.to_string()));
    };

    let payload = CreatePostRequest::from_form(&title, &content, category, color, location, author_id);

    // 2. Store the image, if any
    let image_path = uploads.accept(image).await?;

    // 3. Insert post; a rejected insert must not leave the image behind
    let post = match posts.create(&payload, image_path.as_deref()).await {
        Ok(post) => post,
        Err(e) => {
            if let Some(stored) = image_path.as_deref() {
                uploads.remove(stored).await;
            }
            return Err(e);
        }
    };

    tracing::info!("Created post {}", post.id);

    Ok((
        StatusCode::CREATED,
        Json(PostResponse::from_post(post, &uploads)),
    ))
}

/// Delete a post.
/// Requires the `authorId` the post was created with.
pub async fn delete_post(
    State(posts): State<PostStore>,
    State(uploads): State<UploadManager>,
    Path(id): Path<String>,
    Query(params): Query<DeletePostParams>,
) -> Result<impl IntoResponse, AppError> {
    let id = id
        .parse::<i64>()
        .map_err(|_| AppError::NotFound("Post not found".to_string()))?;

    let author_id = params
        .author_id
        .filter(|a| !a.is_empty())
        .ok_or(AppError::MissingParameter("authorId required".to_string()))?;

    let removed = posts.delete(id, &author_id).await?;

    if let Some(stored) = removed.image_path.as_deref() {
        uploads.remove(stored).await;
    }

    tracing::info!("Deleted post {}", removed.id);

    Ok(Json(serde_json::json!({"ok": true})))
}

async fn read_text(field: Field<'_>) -> Result<String, AppError> {
    field.text().await.map_err(multipart_error)
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(PAYLOAD_TOO_LARGE_MESSAGE.to_string())
    } else {
        AppError::BadRequest(format!("Multipart error: {}", err.body_text()))
    }
}

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

use crate::upload::UploadManager;

/// Label used when the client omits `category` or `color`.
pub const CATCH_ALL: &str = "기타";

/// Error message for a missing or blank title/content.
pub const REQUIRED_FIELDS_MESSAGE: &str = "Title and content are required";

/// Filter value meaning "no constraint on this field".
pub const FILTER_ALL: &str = "all";

/// Represents the 'posts' table in the database.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub category: String,
    pub color: String,
    pub location: Option<String>,

    /// Stored name under the upload directory, not a URL.
    pub image_path: Option<String>,
    pub author_id: Option<String>,

    /// Local time, "YYYY-MM-DD HH:MM".
    pub created_at: String,
}

/// Client-facing representation of a post.
#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub category: String,
    pub color: String,
    pub location: Option<String>,
    /// Absolute URL of the attached image.
    pub image: Option<String>,
    pub date: String,
    #[serde(rename = "authorId")]
    pub author_id: Option<String>,
}

impl PostResponse {
    /// Shapes a stored row for clients, resolving the image name into a URL.
    pub fn from_post(post: Post, uploads: &UploadManager) -> Self {
        let image = uploads.resolve(post.image_path.as_deref());
        Self {
            id: post.id,
            title: post.title,
            content: post.content,
            category: post.category,
            color: post.color,
            location: post.location,
            image,
            date: post.created_at,
            author_id: post.author_id,
        }
    }
}

/// Fields of a post about to be inserted.
/// Title and content are expected to be trimmed already.
#[derive(Debug, Clone, Validate)]
pub struct CreatePostRequest {
    #[validate(custom(function = not_blank))]
    pub title: String,

    #[validate(custom(function = not_blank))]
    pub content: String,

    pub category: String,
    pub color: String,
    pub location: String,
    pub author_id: Option<String>,
}

impl CreatePostRequest {
    /// Builds a request from raw form values, trimming the text fields and
    /// substituting defaults for omitted optional fields.
    pub fn from_form(
        title: &str,
        content: &str,
        category: Option<String>,
        color: Option<String>,
        location: Option<String>,
        author_id: Option<String>,
    ) -> Self {
        Self {
            title: title.trim().to_string(),
            content: content.trim().to_string(),
            category: category.unwrap_or_else(|| CATCH_ALL.to_string()),
            color: color.unwrap_or_else(|| CATCH_ALL.to_string()),
            location: location.unwrap_or_default(),
            author_id,
        }
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Query parameters for listing posts.
#[derive(Debug, Default, Deserialize)]
pub struct PostListParams {
    pub category: Option<String>,
    pub color: Option<String>,
}

impl PostListParams {
    pub fn category(&self) -> Option<&str> {
        active_filter(self.category.as_deref())
    }

    pub fn color(&self) -> Option<&str> {
        active_filter(self.color.as_deref())
    }
}

/// Absent, empty and "all" all impose no constraint.
fn active_filter(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty() && *v != FILTER_ALL)
}

/// Query parameters for deleting a post.
#[derive(Debug, Deserialize)]
pub struct DeletePostParams {
    #[serde(rename = "authorId")]
    pub author_id: Option<String>,
}

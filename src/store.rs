// src/store.rs

use std::str::FromStr;
use std::time::Duration;

use chrono::Local;
use sqlx::{
    QueryBuilder, Sqlite, SqlitePool,
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use validator::Validate;

use crate::{
    error::AppError,
    models::post::{CreatePostRequest, Post, PostListParams, REQUIRED_FIELDS_MESSAGE},
};

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Minute resolution, server local time.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

const POST_COLUMNS: &str =
    "id, title, content, category, color, location, image_path, author_id, created_at";

/// Opens the SQLite database (creating the file if needed) and applies migrations.
pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .connect_with(options)
        .await?;

    MIGRATOR.run(&pool).await?;

    Ok(pool)
}

/// Durable table of posts.
#[derive(Clone)]
pub struct PostStore {
    pool: SqlitePool,
}

impl PostStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Lists posts newest first, narrowed by the active filters.
    pub async fn list(&self, params: &PostListParams) -> Result<Vec<Post>, AppError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {POST_COLUMNS} FROM posts"));

        let mut has_condition = false;
        for (column, value) in [("category", params.category()), ("color", params.color())] {
            if let Some(value) = value {
                query.push(if has_condition { " AND " } else { " WHERE " });
                query.push(column).push(" = ").push_bind(value);
                has_condition = true;
            }
        }

        query.push(" ORDER BY id DESC");

        let posts = query
            .build_query_as::<Post>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list posts: {:?}", e);
                AppError::InternalServerError(e.to_string())
            })?;

        Ok(posts)
    }

    /// Inserts a post. The store assigns the id and the timestamp.
    pub async fn create(
        &self,
        payload: &CreatePostRequest,
        image_path: Option<&str>,
    ) -> Result<Post, AppError> {
        if payload.validate().is_err() {
            return Err(AppError::BadRequest(REQUIRED_FIELDS_MESSAGE.to_string()));
        }

        let created_at = Local::now().format(DATE_FORMAT).to_string();

        let post = sqlx::query_as::<_, Post>(&format!(
            r#"
            INSERT INTO posts (title, content, category, color, location, image_path, author_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(&payload.title)
        .bind(&payload.content)
        .bind(&payload.category)
        .bind(&payload.color)
        .bind(&payload.location)
        .bind(image_path)
        .bind(payload.author_id.as_deref())
        .bind(&created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create post: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(post)
    }

    /// Deletes a post owned by `requester` and returns the removed row so the
    /// caller can clean up its image.
    pub async fn delete(&self, id: i64, requester: &str) -> Result<Post, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. Fetch post to check ownership
        let post = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))?;

        // 2. Check permission
        if !is_author(&post, requester) {
            return Err(AppError::Forbidden(
                "You are not allowed to delete this post".to_string(),
            ));
        }

        // 3. Hard delete
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to delete post: {:?}", e);
                AppError::InternalServerError(e.to_string())
            })?;

        tx.commit().await?;

        Ok(post)
    }
}

/// An empty requester never matches, nor does a post without an author.
fn is_author(post: &Post, requester: &str) -> bool {
    match post.author_id.as_deref() {
        Some(author) => !requester.is_empty() && author == requester,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (PostStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.db").display());
        let pool = connect(&url).await.unwrap();
        (PostStore::new(pool), dir)
    }

    fn request(title: &str, category: &str, color: &str, author: Option<&str>) -> CreatePostRequest {
        CreatePostRequest::from_form(
            title,
            "some content",
            Some(category.to_string()),
            Some(color.to_string()),
            None,
            author.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn create_assigns_id_and_timestamp() {
        let (store, _dir) = test_store().await;

        let post = store
            .create(&request("Lost wallet", "전자기기", "검정", Some("a1")), None)
            .await
            .unwrap();

        assert!(post.id > 0);
        assert_eq!(post.title, "Lost wallet");
        assert_eq!(post.location.as_deref(), Some(""));
        assert!(post.image_path.is_none());
        assert!(chrono::NaiveDateTime::parse_from_str(&post.created_at, DATE_FORMAT).is_ok());
    }

    #[tokio::test]
    async fn create_rejects_blank_fields() {
        let (store, _dir) = test_store().await;

        let err = store
            .create(&request("   ", "기타", "기타", None), None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(ref msg) if msg == REQUIRED_FIELDS_MESSAGE));
        assert!(store.list(&PostListParams::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_filters_combine() {
        let (store, _dir) = test_store().await;
        store.create(&request("one", "가방", "검정", None), None).await.unwrap();
        store.create(&request("two", "가방", "빨강", None), None).await.unwrap();
        store.create(&request("three", "지갑", "검정", None), None).await.unwrap();

        let all = store.list(&PostListParams::default()).await.unwrap();
        let titles: Vec<_> = all.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["three", "two", "one"]);
        assert!(all.windows(2).all(|w| w[0].id > w[1].id));

        let explicit_all = store
            .list(&PostListParams {
                category: Some("all".into()),
                color: Some("all".into()),
            })
            .await
            .unwrap();
        assert_eq!(explicit_all, all);

        let bags = store
            .list(&PostListParams {
                category: Some("가방".into()),
                color: None,
            })
            .await
            .unwrap();
        assert_eq!(bags.len(), 2);

        let black_bags = store
            .list(&PostListParams {
                category: Some("가방".into()),
                color: Some("검정".into()),
            })
            .await
            .unwrap();
        assert_eq!(black_bags.len(), 1);
        assert_eq!(black_bags[0].title, "one");
    }

    #[tokio::test]
    async fn delete_checks_author() {
        let (store, _dir) = test_store().await;
        let owned = store.create(&request("mine", "기타", "기타", Some("me")), None).await.unwrap();
        let anonymous = store.create(&request("anon", "기타", "기타", None), None).await.unwrap();

        let err = store.delete(owned.id, "someone-else").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = store.delete(owned.id, "").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = store.delete(anonymous.id, "me").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        assert_eq!(store.list(&PostListParams::default()).await.unwrap().len(), 2);

        let removed = store.delete(owned.id, "me").await.unwrap();
        assert_eq!(removed.id, owned.id);

        let err = store.delete(owned.id, "me").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}

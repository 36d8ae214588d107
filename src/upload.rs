// src/upload.rs

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use chrono::Utc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;
use uuid::Uuid;

use crate::error::AppError;

/// Image extensions accepted for upload, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

const MAX_STEM_LEN: usize = 64;

/// An `image` part read from a multipart form.
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Persists attached images and maps stored names to public URLs.
#[derive(Debug, Clone)]
pub struct UploadManager {
    dir: PathBuf,
    public_base: Url,
}

impl UploadManager {
    /// `public_url` is the externally visible root of the service; files are
    /// served below `<public_url>/uploads/`.
    pub fn new(dir: impl Into<PathBuf>, public_url: &Url) -> Result<Self, AppError> {
        let mut root = public_url.clone();
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        let public_base = root
            .join("uploads/")
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        Ok(Self {
            dir: dir.into(),
            public_base,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the upload directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Validates and stores an uploaded image, returning its stored name.
    /// No file (or a file part with an empty filename) yields `None`.
    pub async fn accept(&self, file: Option<UploadedFile>) -> Result<Option<String>, AppError> {
        let Some(file) = file.filter(|f| !f.file_name.is_empty()) else {
            return Ok(None);
        };

        let stored_name = stored_name_for(&file.file_name)?;
        let path = self.dir.join(&stored_name);

        let out = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        write_or_discard(out, &path, &file.bytes).await?;

        tracing::info!("Stored upload {} ({} bytes)", stored_name, file.bytes.len());

        Ok(Some(stored_name))
    }

    /// Best-effort removal. Failures are logged, never returned.
    pub async fn remove(&self, stored_name: &str) {
        if validate_flat_filename(stored_name).is_none() {
            tracing::warn!("Refusing to remove suspicious upload name {:?}", stored_name);
            return;
        }

        match tokio::fs::remove_file(self.dir.join(stored_name)).await {
            Ok(()) => tracing::info!("Removed upload {}", stored_name),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("Upload {} already gone", stored_name)
            }
            Err(e) => tracing::warn!("Failed to remove upload {}: {}", stored_name, e),
        }
    }

    /// Absolute URL for a stored file.
    pub fn resolve(&self, stored_name: Option<&str>) -> Option<String> {
        let name = stored_name?;
        self.public_base.join(name).ok().map(String::from)
    }

    /// Reads a stored file. Anything that does not resolve strictly inside the
    /// upload directory is reported as not found.
    pub async fn read(&self, filename: &str) -> Result<Vec<u8>, AppError> {
        let not_found = || AppError::NotFound("File not found".to_string());

        let name = validate_flat_filename(filename).ok_or_else(not_found)?;

        let root = match tokio::fs::canonicalize(&self.dir).await {
            Ok(root) => root,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        let path = match tokio::fs::canonicalize(root.join(name)).await {
            Ok(path) => path,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        if path.parent() != Some(root.as_path()) {
            return Err(not_found());
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
                Err(not_found())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Writes `bytes` to `out`; on failure the partial file at `path` is removed
/// before the error is returned.
async fn write_or_discard<W>(mut out: W, path: &Path, bytes: &[u8]) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
{
    let written: std::io::Result<()> = async {
        out.write_all(bytes).await?;
        out.flush().await
    }
    .await;
    drop(out);

    if let Err(e) = written {
        if let Err(remove_err) = tokio::fs::remove_file(path).await {
            tracing::warn!("Failed to discard partial upload {}: {}", path.display(), remove_err);
        }
        return Err(e.into());
    }

    Ok(())
}

/// Returns the lower-cased extension if it is on the allow-list.
pub fn allowed_extension(file_name: &str) -> Option<String> {
    let base = base_name(file_name);
    let (_, ext) = base.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Builds a collision-resistant on-disk name for an uploaded file.
fn stored_name_for(file_name: &str) -> Result<String, AppError> {
    let ext = allowed_extension(file_name).ok_or_else(|| {
        AppError::UnsupportedMediaType("Unsupported file type".to_string())
    })?;

    let base = base_name(file_name);
    let stem = base.rsplit_once('.').map_or(base, |(stem, _)| stem);

    let timestamp = Utc::now().format("%Y%m%d%H%M%S%6f");
    let token = Uuid::new_v4().simple().to_string();

    Ok(format!(
        "{}_{}_{}.{}",
        timestamp,
        &token[..8],
        sanitize_stem(stem),
        ext
    ))
}

/// Drops any directory components, whichever separator the client used.
fn base_name(file_name: &str) -> &str {
    file_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name)
}

/// Keeps ASCII alphanumerics, `-` and `_`; whitespace runs become `_`.
fn sanitize_stem(stem: &str) -> String {
    let mut out = String::new();
    for word in stem.split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
            .collect();
        if cleaned.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('_');
        }
        out.push_str(&cleaned);
    }

    let trimmed: String = out
        .trim_matches(|c| c == '_' || c == '-')
        .chars()
        .take(MAX_STEM_LEN)
        .collect();

    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed
    }
}

/// Accepts only a single, visible path component without control characters.
fn validate_flat_filename(filename: &str) -> Option<&str> {
    if filename.is_empty()
        || filename.starts_with('.')
        || filename.contains(['/', '\\', '\0'])
        || filename.chars().any(|c| c.is_control())
    {
        return None;
    }
    Some(filename)
}

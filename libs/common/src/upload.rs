//! Media upload collaborator
//!
//! Incoming files are staged on local disk, handed to a [`MediaUploader`]
//! by path, and removed again once the [`StagedFile`] is dropped.

use async_trait::async_trait;
use aws_sdk_s3::{Client, primitives::ByteStream};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    /// Public URL of the stored object
    pub url: String,
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to read staged file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Media host rejected upload: {0}")]
    Remote(String),
}

/// Pushes a local file to the media host
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, local_path: &Path) -> Result<UploadedMedia, UploadError>;
}

/// Media configuration
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Bucket receiving uploads
    pub bucket_name: String,
    /// Base URL the bucket is publicly served from
    pub public_base_url: String,
    /// Key prefix for uploaded objects
    pub key_prefix: String,
    /// Local directory for staged uploads
    pub upload_dir: PathBuf,
}

impl MediaConfig {
    /// Create a new MediaConfig from environment variables
    ///
    /// # Environment Variables
    /// - `MEDIA_BUCKET_NAME`: Bucket name (default: "media-bucket")
    /// - `MEDIA_PUBLIC_URL`: Public base URL (default: derived from the bucket name)
    /// - `MEDIA_KEY_PREFIX`: Object key prefix (default: "uploads")
    /// - `UPLOAD_DIR`: Staging directory (default: "./public/temp")
    pub fn from_env() -> Self {
        let bucket_name =
            std::env::var("MEDIA_BUCKET_NAME").unwrap_or_else(|_| "media-bucket".to_string());
        let public_base_url = std::env::var("MEDIA_PUBLIC_URL")
            .unwrap_or_else(|_| format!("https://{}.s3.amazonaws.com", bucket_name));
        let key_prefix =
            std::env::var("MEDIA_KEY_PREFIX").unwrap_or_else(|_| "uploads".to_string());
        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./public/temp"));

        Self {
            bucket_name,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            key_prefix,
            upload_dir,
        }
    }
}

/// Uploads to an S3 bucket served at a public URL
#[derive(Clone)]
pub struct S3Uploader {
    client: Client,
    bucket_name: String,
    public_base_url: String,
    key_prefix: String,
}

impl S3Uploader {
    pub fn new(client: Client, config: &MediaConfig) -> Self {
        Self {
            client,
            bucket_name: config.bucket_name.clone(),
            public_base_url: config.public_base_url.clone(),
            key_prefix: config.key_prefix.clone(),
        }
    }

    fn object_key(&self, local_path: &Path) -> String {
        let file_name = local_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        format!("{}/{}", self.key_prefix, file_name)
    }
}

#[async_trait]
impl MediaUploader for S3Uploader {
    async fn upload(&self, local_path: &Path) -> Result<UploadedMedia, UploadError> {
        let key = self.object_key(local_path);
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| UploadError::Remote(e.to_string()))?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .body(body);
        if let Some(content_type) = content_type_for(local_path) {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .map_err(|e| UploadError::Remote(e.to_string()))?;

        info!("Uploaded {} to bucket {}", key, self.bucket_name);

        Ok(UploadedMedia {
            url: format!("{}/{}", self.public_base_url, key),
        })
    }
}

fn content_type_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// A file written to the staging directory, removed on drop
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    /// Write `bytes` under `dir` with a fresh name keeping the original extension
    pub async fn write(
        dir: &Path,
        original_name: Option<&str>,
        bytes: &[u8],
    ) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let extension = original_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()));
        let file_name = match extension {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };

        let path = dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove staged file {}: {}", self.path.display(), e);
            }
        }
    }
}

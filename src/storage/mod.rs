mod disk;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use self::disk::DiskImageStore;

/// Directory (relative to the uploads root) that holds post images.
/// Stored image references all start with this segment.
pub const IMAGES_DIR: &str = "images";

const SUPPORTED_TYPES: &[&str] = &["image/png", "image/jpeg"];

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid image path: {0}")]
    InvalidPath(String),
}

/// An uploaded image file, held in memory until it is saved.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl ImageUpload {
    /// Mime type declared by the client, falling back to the file extension.
    pub fn mime_type(&self) -> String {
        match &self.content_type {
            Some(ct) if !ct.is_empty() => ct.to_ascii_lowercase(),
            _ => mime_guess::from_path(&self.file_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        }
    }

    /// Only png and jpeg images are accepted.
    pub fn is_supported(&self) -> bool {
        let mime = self.mime_type();
        SUPPORTED_TYPES.contains(&mime.as_str())
    }
}

/// Storage for uploaded post images, addressed by relative path.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persist the upload and return its reference
    async fn save(&self, upload: &ImageUpload) -> Result<String, ImageStoreError>;

    async fn exists(&self, path: &str) -> Result<bool, ImageStoreError>;

    async fn delete(&self, path: &str) -> Result<(), ImageStoreError>;
}

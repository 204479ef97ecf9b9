use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::{ImageStore, ImageStoreError, ImageUpload, IMAGES_DIR};

const MAX_NAME_LEN: usize = 64;

/// Image store on the local filesystem, rooted at the uploads directory.
#[derive(Debug, Clone)]
pub struct DiskImageStore {
    root: PathBuf,
}

impl DiskImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    /// Map a stored reference to a file under the images directory,
    /// rejecting anything that could escape it.
    fn resolve(&self, path: &str) -> Result<PathBuf, ImageStoreError> {
        let invalid = || ImageStoreError::InvalidPath(path.to_string());

        let relative = Path::new(path);
        let mut components = relative.components();
        match components.next() {
            Some(Component::Normal(first)) if first == IMAGES_DIR => {}
            _ => return Err(invalid()),
        }
        let rest: Vec<_> = components.collect();
        if rest.is_empty() || !rest.iter().all(|c| matches!(c, Component::Normal(_))) {
            return Err(invalid());
        }

        Ok(self.root.join(relative))
    }
}

/// Keep a recognisable, filesystem-safe tail of the client's file name.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    let start = cleaned.len().saturating_sub(MAX_NAME_LEN);
    let tail = &cleaned[start..];
    if tail.is_empty() {
        "upload".to_string()
    } else {
        tail.to_string()
    }
}

#[async_trait]
impl ImageStore for DiskImageStore {
    async fn save(&self, upload: &ImageUpload) -> Result<String, ImageStoreError> {
        let name = format!(
            "{}-{}",
            uuid::Uuid::now_v7(),
            sanitize_file_name(&upload.file_name)
        );
        let reference = format!("{IMAGES_DIR}/{name}");

        tokio::fs::create_dir_all(self.images_dir()).await?;
        tokio::fs::write(self.resolve(&reference)?, &upload.data).await?;

        tracing::debug!(path = %reference, bytes = upload.data.len(), "Saved image");
        Ok(reference)
    }

    async fn exists(&self, path: &str) -> Result<bool, ImageStoreError> {
        let file = self.resolve(path)?;
        Ok(tokio::fs::try_exists(file).await?)
    }

    async fn delete(&self, path: &str) -> Result<(), ImageStoreError> {
        let file = self.resolve(path)?;
        tokio::fs::remove_file(file).await?;
        tracing::debug!(%path, "Deleted image");
        Ok(())
    }
}

// Image storage boundary - posts only keep a reference, the bytes live
// behind this seam

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::PostId;

/// Stores a post's image payload and returns the reference persisted on
/// the post. The service itself never interprets the bytes.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn store(&self, post_id: PostId, bytes: &[u8]) -> AppResult<String>;
}

/// Filesystem-backed image store. One deterministic path per post, so a
/// re-attach overwrites the previous image.
pub struct LocalImageStore {
    root: PathBuf,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn store(&self, post_id: PostId, bytes: &[u8]) -> AppResult<String> {
        let dir = self.root.join("posts");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create media directory: {}", e)))?;

        let image_ref = format!("posts/{}.img", post_id);
        let path = self.root.join(&image_ref);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write image: {}", e)))?;

        debug!("Stored image for post {} at {}", post_id, path.display());
        Ok(image_ref)
    }
}

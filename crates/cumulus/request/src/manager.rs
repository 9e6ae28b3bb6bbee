//! Image manager: owner of image state transitions

use async_trait::async_trait;
use cumulus_pool::{ImagePool, PoolError, PoolResult};
use cumulus_types::{ImageId, ImageState, ObjectKind};
use std::sync::Arc;
use tracing::debug;

/// State transitions that are not plain attribute edits
#[async_trait]
pub trait ImageManager: Send + Sync {
    /// Make an image available (`enable`) or unavailable for new attachments
    async fn enable_image(&self, id: ImageId, enable: bool) -> PoolResult<()>;
}

/// [`ImageManager`] operating directly on an image pool
pub struct PoolImageManager {
    images: Arc<dyn ImagePool>,
}

impl PoolImageManager {
    pub fn new(images: Arc<dyn ImagePool>) -> Self {
        Self { images }
    }
}

#[async_trait]
impl ImageManager for PoolImageManager {
    async fn enable_image(&self, id: ImageId, enable: bool) -> PoolResult<()> {
        let mut image = self.images.get(id).await?.ok_or(PoolError::NotFound {
            kind: ObjectKind::Image,
            id: id.0,
        })?;

        let next = match (enable, image.state) {
            (true, ImageState::Ready) | (false, ImageState::Disabled) => return Ok(()),
            (true, ImageState::Disabled | ImageState::Error) => ImageState::Ready,
            (false, ImageState::Ready | ImageState::Error) => ImageState::Disabled,
            (_, state) => {
                return Err(PoolError::InvalidState(format!(
                    "Image cannot be in state {}.",
                    state
                )));
            }
        };

        debug!(image_id = %id, from = %image.state, to = %next, "Image state change");
        image.state = next;
        self.images.update(&mut image).await
    }
}

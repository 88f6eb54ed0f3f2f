// Post store - direct post creation, scheduling handoff, detail reads,
// image attach, and owner-scoped deletion

use std::sync::Arc;
use tracing::{info, instrument};

use crate::database::{current_time_millis, SocialDatabase};
use crate::error::{AppError, AppResult};
use crate::media::ImageStore;
use crate::models::{PostDetail, PostId, PostSummary, ProfileId};
use crate::publisher::{JobId, PublishRequest, ScheduledPublisher};

/// What a create request produced: an immediate post, or a schedule job
/// for the publisher to materialize later.
#[derive(Debug)]
pub enum CreatePostOutcome {
    Created(PostSummary),
    Scheduled { job_id: JobId, scheduled_time: i64 },
}

#[derive(Clone)]
pub struct PostStore {
    db: Arc<SocialDatabase>,
    publisher: Arc<ScheduledPublisher>,
    images: Arc<dyn ImageStore>,
}

impl PostStore {
    pub fn new(
        db: Arc<SocialDatabase>,
        publisher: Arc<ScheduledPublisher>,
        images: Arc<dyn ImageStore>,
    ) -> Self {
        Self {
            db,
            publisher,
            images,
        }
    }

    /// Create a post now, or enqueue it for deferred publication when
    /// `scheduled_time` lies in the future. Deferred creation requires a
    /// caller-supplied idempotency key.
    #[instrument(skip(self, content, idempotency_key))]
    pub async fn create_post(
        &self,
        actor: ProfileId,
        content: &str,
        scheduled_time: Option<i64>,
        idempotency_key: Option<String>,
    ) -> AppResult<CreatePostOutcome> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation(
                "Post content must not be empty".to_string(),
            ));
        }

        self.ensure_profile(actor).await?;

        let now = current_time_millis();
        if let Some(at) = scheduled_time {
            if at > now {
                let key = idempotency_key.ok_or_else(|| {
                    AppError::Validation(
                        "Scheduling a post requires an idempotency key".to_string(),
                    )
                })?;

                let job = self
                    .publisher
                    .enqueue(PublishRequest {
                        author_id: actor,
                        content: content.to_string(),
                        image_ref: None,
                        scheduled_time: at,
                        idempotency_key: key,
                    })
                    .await?;

                return Ok(CreatePostOutcome::Scheduled {
                    job_id: job.job_id,
                    scheduled_time: job.scheduled_time,
                });
            }
        }

        let post = self.db.insert_post(actor, content, None, now).await?;
        info!("Profile {} created post {}", actor, post.id);

        let row = self
            .db
            .post_row(post.id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Post {} vanished after insert", post.id)))?;

        Ok(CreatePostOutcome::Created(PostSummary::project(&row)))
    }

    /// Detail view with the full comment list, newest comment first.
    /// Restricted to the viewer's visibility set; a post outside it
    /// reads as missing.
    pub async fn get_post(&self, viewer: ProfileId, id: PostId) -> AppResult<PostDetail> {
        self.ensure_profile(viewer).await?;

        let row = self
            .db
            .post_row(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", id)))?;

        let author = row.post.author_id;
        if author != viewer && !self.db.edge_exists(viewer, author).await? {
            return Err(AppError::NotFound(format!("post {}", id)));
        }

        let comments = self.db.comments_for_post(id).await?;
        Ok(PostDetail::project(&row, comments))
    }

    /// Store an image payload for an owned post and rewrite the post's
    /// image reference.
    #[instrument(skip(self, bytes))]
    pub async fn attach_image(
        &self,
        actor: ProfileId,
        id: PostId,
        bytes: &[u8],
    ) -> AppResult<String> {
        let post = self
            .db
            .get_post(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", id)))?;

        if post.author_id != actor {
            return Err(AppError::PermissionDenied);
        }

        let image_ref = self.images.store(id, bytes).await?;
        self.db.update_post_image(id, &image_ref).await?;

        info!("Attached image to post {} ({})", id, image_ref);
        Ok(image_ref)
    }

    /// Delete an owned post; comments and like rows go with it.
    #[instrument(skip(self))]
    pub async fn delete_post(&self, actor: ProfileId, id: PostId) -> AppResult<()> {
        let post = self
            .db
            .get_post(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", id)))?;

        if post.author_id != actor {
            return Err(AppError::PermissionDenied);
        }

        self.db.delete_post_cascade(id).await?;
        info!("Profile {} deleted post {}", actor, id);
        Ok(())
    }

    async fn ensure_profile(&self, id: ProfileId) -> AppResult<()> {
        self.db
            .get_profile(id)
            .await?
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("profile {}", id)))
    }
}

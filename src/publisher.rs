// Scheduled publisher - materializes deferred posts exactly once per
// idempotency key, decoupled from request handling

use lru::LruCache;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::PublisherConfig;
use crate::database::{current_time_millis, is_unique_violation, SocialDatabase};
use crate::error::{AppError, AppResult};
use crate::models::{PostId, ProfileId};

/// Unique schedule-job identifier
pub type JobId = Uuid;

/// A request to publish a post at (or after) a future instant. The
/// idempotency key is caller-supplied and bounds the request to at most
/// one materialized post, however many times it is delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub author_id: ProfileId,
    pub content: String,
    pub image_ref: Option<String>,
    /// Unambiguous UTC instant in epoch milliseconds
    pub scheduled_time: i64,
    pub idempotency_key: String,
}

/// Lifecycle of a schedule job. Published and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Waiting for its scheduled time, or for a retry
    Pending,
    /// A post was materialized for this job
    Published,
    /// Retries exhausted; surfaced for operator visibility
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Published => "published",
            JobStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> JobStatus {
        match s {
            "published" => JobStatus::Published,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Pending,
        }
    }
}

/// A schedule job as persisted in the scheduled_posts table.
#[derive(Debug, Clone, Serialize)]
pub struct PublishJob {
    pub job_id: JobId,
    pub author_id: ProfileId,
    pub content: String,
    pub image_ref: Option<String>,
    pub scheduled_time: i64,
    pub idempotency_key: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub post_id: Option<PostId>,
    pub last_error: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct PublisherStats {
    pub enqueued: u64,
    pub published: u64,
    pub duplicate_deliveries: u64,
    pub retries: u64,
    pub failures: u64,
}

/// Worker that consumes due schedule jobs and writes posts into the
/// post store. Runs on its own tokio task; request handling never waits
/// on it. The idempotency-key check is the sole defense against
/// duplicate publication under at-least-once delivery, so the prior
/// effect is always checked before re-applying.
pub struct ScheduledPublisher {
    db: Arc<SocialDatabase>,
    config: PublisherConfig,
    /// Fast path for recently published keys; the job row stays
    /// authoritative.
    published_keys: Mutex<LruCache<String, PostId>>,
    stats: RwLock<PublisherStats>,
}

impl ScheduledPublisher {
    pub fn new(db: Arc<SocialDatabase>, config: PublisherConfig, cache_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            db,
            config,
            published_keys: Mutex::new(LruCache::new(capacity)),
            stats: RwLock::new(PublisherStats::default()),
        }
    }

    /// Start the background worker loop.
    pub fn start(self: Arc<Self>) {
        let poll_interval = self.config.poll_interval_ms;
        let max_attempts = self.config.max_attempts;
        let publisher = self;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(poll_interval));

            loop {
                interval.tick().await;

                match publisher.publish_due().await {
                    Ok(0) => {}
                    Ok(n) => debug!("Publisher tick materialized {} post(s)", n),
                    Err(e) => warn!("Publisher tick failed: {}", e),
                }
            }
        });

        info!(
            "Scheduled publisher started (poll interval {}ms, max attempts {})",
            poll_interval, max_attempts
        );
    }

    /// Record a schedule request. Re-submission with a known idempotency
    /// key returns the existing job instead of creating a second one.
    #[instrument(skip(self, request), fields(key = %request.idempotency_key))]
    pub async fn enqueue(&self, request: PublishRequest) -> AppResult<PublishJob> {
        if request.idempotency_key.trim().is_empty() {
            return Err(AppError::Validation(
                "Idempotency key must not be empty".to_string(),
            ));
        }

        let job_id = Uuid::new_v4();
        let now = current_time_millis();

        let result = sqlx::query(
            "INSERT INTO scheduled_posts
                (job_id, author_id, content, image_ref, scheduled_time,
                 idempotency_key, status, attempts, next_attempt_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(job_id.to_string())
        .bind(request.author_id)
        .bind(&request.content)
        .bind(&request.image_ref)
        .bind(request.scheduled_time)
        .bind(&request.idempotency_key)
        .bind(JobStatus::Pending.as_str())
        .bind(request.scheduled_time)
        .bind(now)
        .execute(&self.db.pool)
        .await;

        match result {
            Ok(_) => {
                self.stats.write().await.enqueued += 1;
                info!(
                    "Enqueued scheduled post {} for profile {} at {}",
                    job_id, request.author_id, request.scheduled_time
                );
                self.job_by_key(&request.idempotency_key).await
            }
            Err(e) if is_unique_violation(&e) => {
                debug!(
                    "Duplicate enqueue for key '{}', returning existing job",
                    request.idempotency_key
                );
                self.job_by_key(&request.idempotency_key).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Queue-delivery entry point: `(author, content, scheduled_time,
    /// key, image_ref) -> post_id`. Safe to invoke more than once with
    /// the same key; a delivery before the scheduled time is rejected so
    /// the queue redelivers later.
    pub async fn deliver(&self, request: PublishRequest) -> AppResult<PostId> {
        let job = self.enqueue(request).await?;

        if current_time_millis() < job.scheduled_time {
            return Err(AppError::Validation(format!(
                "Job {} is not due until {}",
                job.job_id, job.scheduled_time
            )));
        }

        match self.publish_job(job.job_id).await {
            Ok(post_id) => Ok(post_id),
            Err(e) => {
                if should_count_failure(&e) {
                    self.record_failure(job.job_id, &e).await?;
                }
                Err(e)
            }
        }
    }

    /// One worker pass: publish every pending job whose scheduled time
    /// and retry backoff have both elapsed.
    pub async fn publish_due(&self) -> AppResult<usize> {
        let now = current_time_millis();

        let rows = sqlx::query(
            "SELECT job_id FROM scheduled_posts
             WHERE status = 'pending' AND scheduled_time <= ? AND next_attempt_at <= ?
             ORDER BY scheduled_time",
        )
        .bind(now)
        .bind(now)
        .fetch_all(&self.db.pool)
        .await?;

        let mut published = 0;
        for row in rows {
            let job_id: String = row.get("job_id");
            let job_id = parse_job_id(&job_id)?;

            match self.publish_job(job_id).await {
                Ok(_) => published += 1,
                Err(e) => {
                    warn!("Publishing job {} failed: {}", job_id, e);
                    if should_count_failure(&e) {
                        self.record_failure(job_id, &e).await?;
                    }
                }
            }
        }

        Ok(published)
    }

    /// Materialize the post for one job, exactly once. The job row is
    /// re-read inside the transaction, so a redelivery that races the
    /// worker still observes the prior effect instead of repeating it.
    #[instrument(skip(self))]
    pub async fn publish_job(&self, job_id: JobId) -> AppResult<PostId> {
        let job = self.get_job(job_id).await?;

        // Fast path for keys published recently
        {
            let mut cache = self.published_keys.lock().await;
            if let Some(post_id) = cache.get(&job.idempotency_key).copied() {
                self.stats.write().await.duplicate_deliveries += 1;
                debug!(
                    "Job {} already published as post {} (cache)",
                    job_id, post_id
                );
                return Ok(post_id);
            }
        }

        // The author must still exist at materialization time
        self.db
            .get_profile(job.author_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("profile {}", job.author_id)))?;

        let mut tx = self.db.pool.begin().await?;

        let row = sqlx::query("SELECT status, post_id FROM scheduled_posts WHERE job_id = ?")
            .bind(job_id.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("schedule job {}", job_id)))?;

        let status = JobStatus::parse(row.get("status"));
        match status {
            JobStatus::Published => {
                let post_id: i64 = row.get::<Option<i64>, _>("post_id").ok_or_else(|| {
                    AppError::Internal(format!("Published job {} has no post id", job_id))
                })?;
                tx.commit().await?;

                self.remember_key(&job.idempotency_key, post_id).await;
                self.stats.write().await.duplicate_deliveries += 1;
                debug!("Job {} already published as post {}", job_id, post_id);
                return Ok(post_id);
            }
            JobStatus::Failed => {
                tx.commit().await?;
                return Err(AppError::Validation(format!(
                    "Schedule job {} already failed terminally",
                    job_id
                )));
            }
            JobStatus::Pending => {}
        }

        // The post's created_at is the author-supplied scheduled time,
        // not the worker's wall clock, and is immutable afterwards.
        let result = sqlx::query(
            "INSERT INTO posts (author_id, content, image_ref, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(job.author_id)
        .bind(&job.content)
        .bind(&job.image_ref)
        .bind(job.scheduled_time)
        .execute(&mut *tx)
        .await?;

        let post_id = result.last_insert_rowid();

        sqlx::query(
            "UPDATE scheduled_posts SET status = ?, post_id = ? WHERE job_id = ?",
        )
        .bind(JobStatus::Published.as_str())
        .bind(post_id)
        .bind(job_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.remember_key(&job.idempotency_key, post_id).await;
        self.stats.write().await.published += 1;
        info!(
            "Published scheduled post {} as post {} (profile {})",
            job_id, post_id, job.author_id
        );
        Ok(post_id)
    }

    pub async fn get_job(&self, job_id: JobId) -> AppResult<PublishJob> {
        let row = sqlx::query(JOB_SELECT)
            .bind(job_id.to_string())
            .fetch_optional(&self.db.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("schedule job {}", job_id)))?;

        row_to_job(&row)
    }

    pub async fn stats(&self) -> PublisherStats {
        *self.stats.read().await
    }

    async fn job_by_key(&self, key: &str) -> AppResult<PublishJob> {
        let row = sqlx::query(
            "SELECT job_id, author_id, content, image_ref, scheduled_time, idempotency_key,
                    status, attempts, post_id, last_error, created_at
             FROM scheduled_posts WHERE idempotency_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("schedule job for key '{}'", key)))?;

        row_to_job(&row)
    }

    async fn remember_key(&self, key: &str, post_id: PostId) {
        self.published_keys
            .lock()
            .await
            .put(key.to_string(), post_id);
    }

    /// Book a failed attempt: schedule a backoff retry, or mark the job
    /// terminally failed once attempts are exhausted.
    async fn record_failure(&self, job_id: JobId, err: &AppError) -> AppResult<()> {
        let job = self.get_job(job_id).await?;
        let attempts = job.attempts + 1;
        let message = err.to_string();

        if attempts >= self.config.max_attempts {
            sqlx::query(
                "UPDATE scheduled_posts SET status = ?, attempts = ?, last_error = ? WHERE job_id = ?",
            )
            .bind(JobStatus::Failed.as_str())
            .bind(attempts as i64)
            .bind(&message)
            .bind(job_id.to_string())
            .execute(&self.db.pool)
            .await?;

            self.stats.write().await.failures += 1;
            error!(
                "Schedule job {} failed terminally after {} attempts: {}",
                job_id, attempts, message
            );
        } else {
            let delay = self.backoff_delay_ms(attempts);
            let next_attempt_at = current_time_millis() + delay as i64;

            sqlx::query(
                "UPDATE scheduled_posts SET attempts = ?, last_error = ?, next_attempt_at = ? WHERE job_id = ?",
            )
            .bind(attempts as i64)
            .bind(&message)
            .bind(next_attempt_at)
            .bind(job_id.to_string())
            .execute(&self.db.pool)
            .await?;

            self.stats.write().await.retries += 1;
            warn!(
                "Schedule job {} attempt {} failed, retrying in {}ms: {}",
                job_id, attempts, delay, message
            );
        }

        Ok(())
    }

    /// Exponential backoff with jitter, capped at the configured maximum.
    fn backoff_delay_ms(&self, attempts: u32) -> u64 {
        let jitter = rand::rng().random_range(0..self.config.base_retry_delay_ms.max(1));
        base_backoff_ms(&self.config, attempts) + jitter
    }
}

fn base_backoff_ms(config: &PublisherConfig, attempts: u32) -> u64 {
    let exp = config
        .base_retry_delay_ms
        .saturating_mul(1u64 << attempts.saturating_sub(1).min(16));
    exp.min(config.max_retry_delay_ms)
}

/// A "not due" or terminal-state rejection is not a publish failure;
/// everything else counts against the retry budget.
fn should_count_failure(err: &AppError) -> bool {
    !matches!(err, AppError::Validation(_))
}

fn parse_job_id(s: &str) -> AppResult<JobId> {
    Uuid::parse_str(s)
        .map_err(|e| AppError::Internal(format!("Malformed job id '{}': {}", s, e)))
}

const JOB_SELECT: &str = "SELECT job_id, author_id, content, image_ref, scheduled_time,
        idempotency_key, status, attempts, post_id, last_error, created_at
     FROM scheduled_posts WHERE job_id = ?";

fn row_to_job(row: &SqliteRow) -> AppResult<PublishJob> {
    let job_id: String = row.get("job_id");
    let attempts: i64 = row.get("attempts");
    let status: String = row.get("status");

    Ok(PublishJob {
        job_id: parse_job_id(&job_id)?,
        author_id: row.get("author_id"),
        content: row.get("content"),
        image_ref: row.get("image_ref"),
        scheduled_time: row.get("scheduled_time"),
        idempotency_key: row.get("idempotency_key"),
        status: JobStatus::parse(&status),
        attempts: attempts as u32,
        post_id: row.get("post_id"),
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
    })
}

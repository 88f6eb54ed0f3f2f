// HTTP API - axum boundary over the social services
// Handlers resolve the acting profile, call one service, and marshal the
// result; no domain logic lives here

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{FeedFilter, PostId, ProfileId};
use crate::posts::CreatePostOutcome;
use crate::publisher::JobId;

#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// The acting profile, taken from the `x-profile-id` header. Credential
/// checking happens upstream of this service; the header carries the
/// already-resolved profile identity.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub ProfileId);

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let actor = parts
            .headers
            .get("x-profile-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<ProfileId>().ok())
            .map(Actor)
            .ok_or_else(|| {
                AppError::Validation("Missing or invalid x-profile-id header".to_string())
            });

        async move { actor }
    }
}

// --- Request/response types ----------------------------------------------

#[derive(Deserialize)]
struct CreateProfileRequest {
    account_id: i64,
    username: String,
    #[serde(default)]
    biography: String,
}

#[derive(Deserialize)]
struct UpdateProfileRequest {
    username: Option<String>,
    biography: Option<String>,
}

#[derive(Deserialize)]
struct ProfileQuery {
    username: Option<String>,
}

#[derive(Deserialize)]
struct CreatePostRequest {
    content: String,
    /// RFC3339 instant with an explicit offset
    scheduled_time: Option<String>,
    idempotency_key: Option<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum CreatePostResponse {
    Created {
        post: crate::models::PostSummary,
    },
    Scheduled {
        job_id: JobId,
        scheduled_time: i64,
    },
}

#[derive(Deserialize)]
struct CommentRequest {
    content: String,
}

#[derive(Deserialize)]
struct AttachImageRequest {
    /// Base64-encoded payload
    image: String,
}

// --- Profile handlers ----------------------------------------------------

async fn create_profile(
    State(state): State<AppState>,
    Json(request): Json<CreateProfileRequest>,
) -> AppResult<impl IntoResponse> {
    info!("Creating profile '{}'", request.username);

    let profile = state
        .profiles
        .create_profile(request.account_id, &request.username, &request.biography)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(profile))))
}

async fn list_profiles(
    State(state): State<AppState>,
    _actor: Actor,
    Query(query): Query<ProfileQuery>,
) -> AppResult<impl IntoResponse> {
    let profiles = state
        .profiles
        .list_profiles(query.username.as_deref())
        .await?;

    Ok(Json(ApiResponse::ok(profiles)))
}

async fn get_profile(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<ProfileId>,
) -> AppResult<impl IntoResponse> {
    let detail = state.profiles.get_detail(id).await?;
    Ok(Json(ApiResponse::ok(detail)))
}

async fn update_profile(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<ProfileId>,
    Json(request): Json<UpdateProfileRequest>,
) -> AppResult<impl IntoResponse> {
    let profile = state
        .profiles
        .update_profile(
            actor,
            id,
            request.username.as_deref(),
            request.biography.as_deref(),
        )
        .await?;

    Ok(Json(ApiResponse::ok(profile)))
}

async fn follow_profile(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<ProfileId>,
) -> AppResult<impl IntoResponse> {
    state.graph.follow(actor, id).await?;
    Ok(Json(ApiResponse::ok(json!({ "following": true }))))
}

async fn unfollow_profile(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<ProfileId>,
) -> AppResult<impl IntoResponse> {
    state.graph.unfollow(actor, id).await?;
    Ok(Json(ApiResponse::ok(json!({ "following": false }))))
}

// --- Post handlers -------------------------------------------------------

async fn create_post(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(request): Json<CreatePostRequest>,
) -> AppResult<impl IntoResponse> {
    let scheduled_time = request
        .scheduled_time
        .as_deref()
        .map(parse_scheduled_time)
        .transpose()?;

    let outcome = state
        .posts
        .create_post(
            actor,
            &request.content,
            scheduled_time,
            request.idempotency_key,
        )
        .await?;

    let (status, body) = match outcome {
        CreatePostOutcome::Created(post) => {
            (StatusCode::CREATED, CreatePostResponse::Created { post })
        }
        CreatePostOutcome::Scheduled {
            job_id,
            scheduled_time,
        } => (
            StatusCode::ACCEPTED,
            CreatePostResponse::Scheduled {
                job_id,
                scheduled_time,
            },
        ),
    };

    Ok((status, Json(ApiResponse::ok(body))))
}

async fn feed(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(filter): Query<FeedFilter>,
) -> AppResult<impl IntoResponse> {
    let posts = state.feed.feed(actor, &filter).await?;
    Ok(Json(ApiResponse::ok(posts)))
}

async fn liked_posts(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> AppResult<impl IntoResponse> {
    let posts = state.feed.liked_posts(actor).await?;
    Ok(Json(ApiResponse::ok(posts)))
}

async fn get_post(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<PostId>,
) -> AppResult<impl IntoResponse> {
    let detail = state.posts.get_post(actor, id).await?;
    Ok(Json(ApiResponse::ok(detail)))
}

async fn delete_post(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<PostId>,
) -> AppResult<impl IntoResponse> {
    state.posts.delete_post(actor, id).await?;
    Ok(Json(ApiResponse::ok(json!({ "deleted": true }))))
}

async fn toggle_like(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<PostId>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.engagement.toggle_like(actor, id).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

async fn add_comment(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<PostId>,
    Json(request): Json<CommentRequest>,
) -> AppResult<impl IntoResponse> {
    let comment = state
        .engagement
        .add_comment(actor, id, &request.content)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(comment))))
}

async fn attach_image(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<PostId>,
    Json(request): Json<AttachImageRequest>,
) -> AppResult<impl IntoResponse> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(request.image.as_bytes())
        .map_err(|e| AppError::Validation(format!("Image payload is not valid base64: {}", e)))?;

    let image_ref = state.posts.attach_image(actor, id, &bytes).await?;
    Ok(Json(ApiResponse::ok(json!({ "image_ref": image_ref }))))
}

/// Scheduled times must carry an explicit offset; there is no implicit
/// local-timezone default.
fn parse_scheduled_time(value: &str) -> AppResult<i64> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| {
            AppError::Validation(format!(
                "scheduled_time must be an RFC3339 instant with offset: {}",
                e
            ))
        })
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/profiles", post(create_profile).get(list_profiles))
        .route(
            "/api/v1/profiles/{id}",
            get(get_profile).put(update_profile),
        )
        .route("/api/v1/profiles/{id}/follow", post(follow_profile))
        .route("/api/v1/profiles/{id}/unfollow", post(unfollow_profile))
        .route("/api/v1/posts", post(create_post).get(feed))
        .route("/api/v1/posts/liked", get(liked_posts))
        .route("/api/v1/posts/{id}", get(get_post).delete(delete_post))
        .route("/api/v1/posts/{id}/like", post(toggle_like))
        .route("/api/v1/posts/{id}/comment", post(add_comment))
        .route("/api/v1/posts/{id}/image", post(attach_image))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    error::{ApiJson, ApiResponse, AppError},
    posts::{
        dto::{
            CommentView, CreateCommentRequest, CreatePostRequest, FeedParams, FeedResponse,
            PostView, VoteRequest,
        },
        services,
        votes::VoteOutcome,
    },
    state::AppState,
};

pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(feed).post(create_post))
        .route("/posts/me", get(my_posts))
        .route("/posts/:id/vote", post(vote))
        .route("/posts/:id/comments", get(list_comments).post(create_comment))
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

// Malformed ids can never name an existing post.
fn post_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    path.map(|Path(id)| id)
        .map_err(|_| AppError::not_found("Post not found"))
}

#[instrument(skip(state, payload, user), fields(user_id = %user.id))]
pub async fn vote(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    ApiJson(payload): ApiJson<VoteRequest>,
) -> ApiResult<VoteOutcome> {
    let id = post_id(path)?;
    let outcome = services::apply_vote(&state, user.id, id, payload.value).await?;
    Ok(ApiResponse::data(outcome))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn feed(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    query: Result<Query<FeedParams>, QueryRejection>,
) -> Result<Json<FeedResponse>, AppError> {
    let Query(params) = query.map_err(|e| AppError::validation(e.body_text()))?;
    Ok(Json(services::feed(&state, &user, params).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn my_posts(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<PostView>> {
    Ok(ApiResponse::data(services::my_posts(&state, &user).await?))
}

#[instrument(skip(state, payload, user), fields(user_id = %user.id))]
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(payload): ApiJson<CreatePostRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PostView>>), AppError> {
    let view = services::create_post(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, ApiResponse::data(view)))
}

#[instrument(skip(state, _user))]
pub async fn list_comments(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Vec<CommentView>> {
    let id = post_id(path)?;
    Ok(ApiResponse::data(services::list_comments(&state, id).await?))
}

#[instrument(skip(state, payload, user), fields(user_id = %user.id))]
pub async fn create_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    ApiJson(payload): ApiJson<CreateCommentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CommentView>>), AppError> {
    let id = post_id(path)?;
    let view = services::create_comment(&state, &user, id, payload).await?;
    Ok((StatusCode::CREATED, ApiResponse::data(view)))
}

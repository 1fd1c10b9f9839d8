use tracing::info;
use uuid::Uuid;

use crate::{
    auth::claims::SessionIdentity,
    error::AppError,
    posts::{
        dto::{
            Author, CommentView, CreateCommentRequest, CreatePostRequest, FeedParams, FeedResponse,
            FeedType, PostView,
        },
        repo_types::{FeedQuery, NewComment, NewPost},
        votes::{VoteApplied, VoteOutcome, VoteValue},
    },
    state::AppState,
};

pub const MAX_POST_CHARS: usize = 500;
pub const MAX_COMMENT_CHARS: usize = 280;
pub const MAX_PAGE_SIZE: i64 = 50;

pub async fn apply_vote(
    state: &AppState,
    user_id: Uuid,
    post_id: Uuid,
    value: i64,
) -> Result<VoteOutcome, AppError> {
    let value = VoteValue::try_from(value)?;
    let outcome = match state.votes.apply_vote(user_id, post_id, value).await? {
        VoteApplied::Applied(outcome) => outcome,
        VoteApplied::PostMissing => return Err(AppError::not_found("Post not found")),
        VoteApplied::VoterMissing => return Err(AppError::unauthorized("User not found")),
    };
    info!(%user_id, %post_id, user_vote = ?outcome.user_vote, "vote applied");
    Ok(outcome)
}

pub async fn feed(
    state: &AppState,
    who: &SessionIdentity,
    params: FeedParams,
) -> Result<FeedResponse, AppError> {
    let page = params.page.max(1);
    let limit = params.limit.clamp(1, MAX_PAGE_SIZE);
    let query = FeedQuery {
        school_id: who.school_id,
        hot_take: params.kind == FeedType::Hottake,
        limit,
        offset: (page - 1).saturating_mul(limit),
    };

    let (rows, total) = state.posts.list_feed(query).await?;
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let votes = state.posts.user_votes(who.id, &ids).await?;

    let data = rows
        .into_iter()
        .map(|row| {
            let vote = votes.get(&row.id).copied();
            PostView::from_row(row, vote)
        })
        .collect();
    let total_pages = (total + limit - 1) / limit;

    Ok(FeedResponse {
        success: true,
        data,
        page,
        total_pages,
        has_more: page < total_pages,
    })
}

pub async fn my_posts(state: &AppState, who: &SessionIdentity) -> Result<Vec<PostView>, AppError> {
    let rows = state.posts.list_by_user(who.id).await?;
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let votes = state.posts.user_votes(who.id, &ids).await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let vote = votes.get(&row.id).copied();
            // Owners see their own name even on anonymous posts.
            let author = Author {
                display_name: row.author_name.clone(),
            };
            PostView {
                author: Some(author),
                ..PostView::from_row(row, vote)
            }
        })
        .collect())
}

fn checked_content(raw: &str, max: usize, what: &str) -> Result<String, AppError> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(AppError::validation("Content is required"));
    }
    if raw.chars().count() > max {
        return Err(AppError::validation(format!("{what} too long (max {max} chars)")));
    }
    Ok(content.to_string())
}

pub async fn create_post(
    state: &AppState,
    who: &SessionIdentity,
    req: CreatePostRequest,
) -> Result<PostView, AppError> {
    let content = checked_content(&req.content, MAX_POST_CHARS, "Content")?;
    let row = state
        .posts
        .create_post(NewPost {
            user_id: who.id,
            school_id: who.school_id,
            content,
            image_url: req.image_url.filter(|u| !u.trim().is_empty()),
            is_anonymous: req.is_anonymous,
            is_hot_take: req.is_hot_take,
        })
        .await?;
    info!(user_id = %who.id, post_id = %row.id, hot_take = row.is_hot_take, "post created");
    Ok(PostView::from_row(row, None))
}

pub async fn list_comments(state: &AppState, post_id: Uuid) -> Result<Vec<CommentView>, AppError> {
    if !state.posts.post_exists(post_id).await? {
        return Err(AppError::not_found("Post not found"));
    }
    let rows = state.posts.list_comments(post_id).await?;
    Ok(rows.into_iter().map(CommentView::from).collect())
}

pub async fn create_comment(
    state: &AppState,
    who: &SessionIdentity,
    post_id: Uuid,
    req: CreateCommentRequest,
) -> Result<CommentView, AppError> {
    let content = checked_content(&req.content, MAX_COMMENT_CHARS, "Comment")?;
    if !state.posts.post_exists(post_id).await? {
        return Err(AppError::not_found("Post not found"));
    }
    let row = state
        .posts
        .create_comment(NewComment {
            post_id,
            user_id: who.id,
            content,
            is_anonymous: req.is_anonymous,
        })
        .await?;
    info!(user_id = %who.id, %post_id, comment_id = %row.id, "comment created");
    Ok(row.into())
}

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::posts::repo_types::{CommentRow, PostRow};
use crate::posts::votes::VoteValue;

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub value: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub is_hot_take: bool,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    #[default]
    Normal,
    Hottake,
}

#[derive(Debug, Deserialize)]
pub struct FeedParams {
    #[serde(default, rename = "type")]
    pub kind: FeedType,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}
fn default_page() -> i64 { 1 }
fn default_limit() -> i64 { 10 }

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub school_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
    pub is_anonymous: bool,
    pub is_hot_take: bool,
    pub upvotes: i32,
    pub downvotes: i32,
    pub comment_count: i64,
    pub user_vote: Option<VoteValue>,
    pub author: Option<Author>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PostView {
    /// Anonymous posts never expose their author.
    pub fn from_row(row: PostRow, user_vote: Option<VoteValue>) -> Self {
        let author = (!row.is_anonymous).then(|| Author {
            display_name: row.author_name,
        });
        Self {
            id: row.id,
            user_id: row.user_id,
            school_id: row.school_id,
            content: row.content,
            image_url: row.image_url,
            is_anonymous: row.is_anonymous,
            is_hot_take: row.is_hot_take,
            upvotes: row.upvotes,
            downvotes: row.downvotes,
            comment_count: row.comment_count,
            user_vote,
            author,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub is_anonymous: bool,
    pub author: Option<Author>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<CommentRow> for CommentView {
    fn from(row: CommentRow) -> Self {
        let author = (!row.is_anonymous).then(|| Author {
            display_name: row.author_name,
        });
        Self {
            id: row.id,
            post_id: row.post_id,
            user_id: row.user_id,
            content: row.content,
            is_anonymous: row.is_anonymous,
            author,
            created_at: row.created_at,
        }
    }
}

/// Paginated feed envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub success: bool,
    pub data: Vec<PostView>,
    pub page: i64,
    pub total_pages: i64,
    pub has_more: bool,
}

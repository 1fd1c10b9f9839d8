use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Post joined with its author's display name and comment count.
#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub school_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
    pub is_anonymous: bool,
    pub is_hot_take: bool,
    pub upvotes: i32,
    pub downvotes: i32,
    pub created_at: OffsetDateTime,
    pub author_name: String,
    pub comment_count: i64,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: Uuid,
    pub school_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
    pub is_anonymous: bool,
    pub is_hot_take: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct CommentRow {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub is_anonymous: bool,
    pub created_at: OffsetDateTime,
    pub author_name: String,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub is_anonymous: bool,
}

/// Feed filter: one school, one hot-take flag, newest first.
#[derive(Debug, Clone, Copy)]
pub struct FeedQuery {
    pub school_id: Uuid,
    pub hot_take: bool,
    pub limit: i64,
    pub offset: i64,
}

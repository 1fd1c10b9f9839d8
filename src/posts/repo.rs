use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use crate::db::PgStore;
use crate::posts::repo_types::{CommentRow, FeedQuery, NewComment, NewPost, PostRow};
use crate::posts::votes::VoteValue;

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, post: NewPost) -> anyhow::Result<PostRow>;

    async fn post_exists(&self, id: Uuid) -> anyhow::Result<bool>;

    /// One page of the feed plus the total number of matching posts.
    async fn list_feed(&self, q: FeedQuery) -> anyhow::Result<(Vec<PostRow>, i64)>;

    async fn list_by_user(&self, user_id: Uuid) -> anyhow::Result<Vec<PostRow>>;

    /// The caller's votes on the given posts.
    async fn user_votes(
        &self,
        user_id: Uuid,
        post_ids: &[Uuid],
    ) -> anyhow::Result<HashMap<Uuid, VoteValue>>;

    async fn list_comments(&self, post_id: Uuid) -> anyhow::Result<Vec<CommentRow>>;

    async fn create_comment(&self, comment: NewComment) -> anyhow::Result<CommentRow>;
}

const POST_SELECT: &str = r#"
    SELECT p.id, p.user_id, p.school_id, p.content, p.image_url, p.is_anonymous,
           p.is_hot_take, p.upvotes, p.downvotes, p.created_at,
           u.display_name AS author_name,
           (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count
      FROM posts p
      JOIN users u ON u.id = p.user_id
"#;

#[async_trait]
impl PostRepo for PgStore {
    async fn create_post(&self, post: NewPost) -> anyhow::Result<PostRow> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO posts (user_id, school_id, content, image_url, is_anonymous, is_hot_take)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(post.user_id)
        .bind(post.school_id)
        .bind(&post.content)
        .bind(&post.image_url)
        .bind(post.is_anonymous)
        .bind(post.is_hot_take)
        .fetch_one(&self.pool)
        .await
        .context("insert post")?;

        let row = sqlx::query_as::<_, PostRow>(&format!("{POST_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("reload post")?;
        Ok(row)
    }

    async fn post_exists(&self, id: Uuid) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)"#)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("check post exists")?;
        Ok(exists)
    }

    async fn list_feed(&self, q: FeedQuery) -> anyhow::Result<(Vec<PostRow>, i64)> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            "{POST_SELECT}
             WHERE p.school_id = $1 AND p.is_hot_take = $2
             ORDER BY p.created_at DESC
             LIMIT $3 OFFSET $4"
        ))
        .bind(q.school_id)
        .bind(q.hot_take)
        .bind(q.limit)
        .bind(q.offset)
        .fetch_all(&self.pool)
        .await
        .context("list feed")?;

        let total: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM posts WHERE school_id = $1 AND is_hot_take = $2"#,
        )
        .bind(q.school_id)
        .bind(q.hot_take)
        .fetch_one(&self.pool)
        .await
        .context("count feed")?;

        Ok((rows, total))
    }

    async fn list_by_user(&self, user_id: Uuid) -> anyhow::Result<Vec<PostRow>> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            "{POST_SELECT} WHERE p.user_id = $1 ORDER BY p.created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("list posts by user")?;
        Ok(rows)
    }

    async fn user_votes(
        &self,
        user_id: Uuid,
        post_ids: &[Uuid],
    ) -> anyhow::Result<HashMap<Uuid, VoteValue>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, i16)> = sqlx::query_as(
            r#"SELECT post_id, value FROM votes WHERE user_id = $1 AND post_id = ANY($2)"#,
        )
        .bind(user_id)
        .bind(post_ids)
        .fetch_all(&self.pool)
        .await
        .context("load user votes")?;

        Ok(rows
            .into_iter()
            .filter_map(|(post_id, v)| VoteValue::from_i16(v).map(|v| (post_id, v)))
            .collect())
    }

    async fn list_comments(&self, post_id: Uuid) -> anyhow::Result<Vec<CommentRow>> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT c.id, c.post_id, c.user_id, c.content, c.is_anonymous, c.created_at,
                   u.display_name AS author_name
              FROM comments c
              JOIN users u ON u.id = c.user_id
             WHERE c.post_id = $1
             ORDER BY c.created_at DESC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .context("list comments")?;
        Ok(rows)
    }

    async fn create_comment(&self, comment: NewComment) -> anyhow::Result<CommentRow> {
        let row = sqlx::query_as::<_, CommentRow>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (post_id, user_id, content, is_anonymous)
                VALUES ($1, $2, $3, $4)
                RETURNING id, post_id, user_id, content, is_anonymous, created_at
            )
            SELECT i.id, i.post_id, i.user_id, i.content, i.is_anonymous, i.created_at,
                   u.display_name AS author_name
              FROM inserted i
              JOIN users u ON u.id = i.user_id
            "#,
        )
        .bind(comment.post_id)
        .bind(comment.user_id)
        .bind(&comment.content)
        .bind(comment.is_anonymous)
        .fetch_one(&self.pool)
        .await
        .context("insert comment")?;
        Ok(row)
    }
}

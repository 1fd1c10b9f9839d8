//! In-memory repositories for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo::{CreateUser, UserRepo};
use crate::auth::repo_types::{NewUser, School, User};
use crate::posts::repo::PostRepo;
use crate::posts::repo_types::{CommentRow, FeedQuery, NewComment, NewPost, PostRow};
use crate::posts::votes::{VoteApplied, VoteLedger, VoteTally, VoteValue};

#[derive(Default)]
struct Tables {
    schools: Vec<School>,
    users: Vec<User>,
    posts: Vec<PostRow>,
    votes: HashMap<(Uuid, Uuid), VoteValue>,
    comments: Vec<CommentRow>,
}

impl Tables {
    fn author_name(&self, user_id: Uuid) -> String {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.display_name.clone())
            .unwrap_or_else(|| "Unknown".into())
    }

    fn with_comment_count(&self, post: &PostRow) -> PostRow {
        let mut row = post.clone();
        row.comment_count = self.comments.iter().filter(|c| c.post_id == post.id).count() as i64;
        row
    }
}

/// Single mutex over all tables; every call is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn seed_school(&self, domain: &str) -> School {
        let school = School {
            id: Uuid::new_v4(),
            domain: domain.into(),
            name: crate::auth::school::school_name(domain),
            created_at: OffsetDateTime::now_utc(),
        };
        self.tables.lock().unwrap().schools.push(school.clone());
        school
    }

    /// A verified user whose password hash is not a valid hash.
    pub fn seed_user(&self, email: &str, school_id: Uuid) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: "unusable".into(),
            display_name: email.split('@').next().unwrap_or_default().into(),
            school_id,
            is_verified: true,
            created_at: OffsetDateTime::now_utc(),
        };
        self.tables.lock().unwrap().users.push(user.clone());
        user
    }

    pub fn seed_post(&self, user_id: Uuid, school_id: Uuid, hot_take: bool) -> Uuid {
        let mut tables = self.tables.lock().unwrap();
        let author_name = tables.author_name(user_id);
        let post = PostRow {
            id: Uuid::new_v4(),
            user_id,
            school_id,
            content: "hello campus".into(),
            image_url: None,
            is_anonymous: false,
            is_hot_take: hot_take,
            upvotes: 0,
            downvotes: 0,
            created_at: OffsetDateTime::now_utc(),
            author_name,
            comment_count: 0,
        };
        let id = post.id;
        tables.posts.push(post);
        id
    }

    pub fn set_tally(&self, post_id: Uuid, tally: VoteTally) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(p) = tables.posts.iter_mut().find(|p| p.id == post_id) {
            p.upvotes = tally.upvotes;
            p.downvotes = tally.downvotes;
        }
    }

    pub fn tally(&self, post_id: Uuid) -> Option<VoteTally> {
        let tables = self.tables.lock().unwrap();
        tables.posts.iter().find(|p| p.id == post_id).map(|p| VoteTally {
            upvotes: p.upvotes,
            downvotes: p.downvotes,
        })
    }

    /// Removes the user and, like the cascade, their votes.
    pub fn delete_user(&self, user_id: Uuid) {
        let mut tables = self.tables.lock().unwrap();
        tables.users.retain(|u| u.id != user_id);
        tables.votes.retain(|(u, _), _| *u != user_id);
    }

    /// Counts of stored +1 and -1 votes on a post.
    pub fn vote_rows(&self, post_id: Uuid) -> (usize, usize) {
        let tables = self.tables.lock().unwrap();
        let on_post = tables.votes.iter().filter(|((_, p), _)| *p == post_id);
        on_post.fold((0, 0), |(up, down), (_, v)| match v {
            VoteValue::Up => (up + 1, down),
            VoteValue::Down => (up, down + 1),
        })
    }
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn create(&self, user: NewUser) -> anyhow::Result<CreateUser> {
        let mut tables = self.tables.lock().unwrap();
        if tables.users.iter().any(|u| u.email == user.email) {
            return Ok(CreateUser::EmailTaken);
        }
        let row = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            display_name: user.display_name,
            school_id: user.school_id,
            is_verified: true,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.users.push(row.clone());
        Ok(CreateUser::Created(row))
    }

    async fn find_school(&self, id: Uuid) -> anyhow::Result<Option<School>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.schools.iter().find(|s| s.id == id).cloned())
    }

    async fn find_or_create_school(&self, domain: &str, name: &str) -> anyhow::Result<School> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(s) = tables.schools.iter().find(|s| s.domain == domain) {
            return Ok(s.clone());
        }
        let school = School {
            id: Uuid::new_v4(),
            domain: domain.into(),
            name: name.into(),
            created_at: OffsetDateTime::now_utc(),
        };
        tables.schools.push(school.clone());
        Ok(school)
    }
}

#[async_trait]
impl PostRepo for MemoryStore {
    async fn create_post(&self, post: NewPost) -> anyhow::Result<PostRow> {
        let mut tables = self.tables.lock().unwrap();
        let row = PostRow {
            id: Uuid::new_v4(),
            user_id: post.user_id,
            school_id: post.school_id,
            content: post.content,
            image_url: post.image_url,
            is_anonymous: post.is_anonymous,
            is_hot_take: post.is_hot_take,
            upvotes: 0,
            downvotes: 0,
            created_at: OffsetDateTime::now_utc(),
            author_name: tables.author_name(post.user_id),
            comment_count: 0,
        };
        tables.posts.push(row.clone());
        Ok(row)
    }

    async fn post_exists(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.tables.lock().unwrap().posts.iter().any(|p| p.id == id))
    }

    async fn list_feed(&self, q: FeedQuery) -> anyhow::Result<(Vec<PostRow>, i64)> {
        let tables = self.tables.lock().unwrap();
        let mut matching: Vec<&PostRow> = tables
            .posts
            .iter()
            .filter(|p| p.school_id == q.school_id && p.is_hot_take == q.hot_take)
            .collect();
        // Insertion order breaks ties between equal timestamps.
        matching.reverse();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(q.offset as usize)
            .take(q.limit as usize)
            .map(|p| tables.with_comment_count(p))
            .collect();
        Ok((page, total))
    }

    async fn list_by_user(&self, user_id: Uuid) -> anyhow::Result<Vec<PostRow>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .posts
            .iter()
            .rev()
            .filter(|p| p.user_id == user_id)
            .map(|p| tables.with_comment_count(p))
            .collect())
    }

    async fn user_votes(
        &self,
        user_id: Uuid,
        post_ids: &[Uuid],
    ) -> anyhow::Result<HashMap<Uuid, VoteValue>> {
        let tables = self.tables.lock().unwrap();
        Ok(post_ids
            .iter()
            .filter_map(|p| tables.votes.get(&(user_id, *p)).map(|v| (*p, *v)))
            .collect())
    }

    async fn list_comments(&self, post_id: Uuid) -> anyhow::Result<Vec<CommentRow>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .comments
            .iter()
            .rev()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn create_comment(&self, comment: NewComment) -> anyhow::Result<CommentRow> {
        let mut tables = self.tables.lock().unwrap();
        let row = CommentRow {
            id: Uuid::new_v4(),
            post_id: comment.post_id,
            user_id: comment.user_id,
            content: comment.content,
            is_anonymous: comment.is_anonymous,
            created_at: OffsetDateTime::now_utc(),
            author_name: tables.author_name(comment.user_id),
        };
        tables.comments.push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl VoteLedger for MemoryStore {
    async fn apply_vote(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        value: VoteValue,
    ) -> anyhow::Result<VoteApplied> {
        let mut tables = self.tables.lock().unwrap();
        let Some(post) = tables.posts.iter().find(|p| p.id == post_id) else {
            return Ok(VoteApplied::PostMissing);
        };
        let tally = VoteTally {
            upvotes: post.upvotes,
            downvotes: post.downvotes,
        };
        let key = (user_id, post_id);
        let existing = tables.votes.get(&key).copied();
        // Mirrors the votes.user_id foreign key, only checked on insert.
        if existing.is_none() && !tables.users.iter().any(|u| u.id == user_id) {
            return Ok(VoteApplied::VoterMissing);
        }
        let step = tally.apply(existing, value);

        match step.user_vote {
            Some(v) => tables.votes.insert(key, v),
            None => tables.votes.remove(&key),
        };
        if let Some(p) = tables.posts.iter_mut().find(|p| p.id == post_id) {
            p.upvotes = step.tally.upvotes;
            p.downvotes = step.tally.downvotes;
        }
        Ok(VoteApplied::Applied(step.into()))
    }
}

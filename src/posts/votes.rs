//! Per-(user, post) vote ledger and the denormalized counters on posts.
//!
//! A vote button cycles through none/up/down. Re-sending the current value
//! removes the vote, so two identical taps cancel out; this is a toggle, not
//! an idempotent set. Every transition updates the vote row and the post's
//! counters together under a per-post lock.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Serialize, Serializer};
use sqlx::FromRow;
use tracing::debug;
use uuid::Uuid;

use crate::db::PgStore;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    pub fn as_i16(self) -> i16 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
        }
    }

    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            1 => Some(VoteValue::Up),
            -1 => Some(VoteValue::Down),
            _ => None,
        }
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = AppError;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            _ => Err(AppError::validation("Invalid vote value")),
        }
    }
}

impl Serialize for VoteValue {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i16(self.as_i16())
    }
}

/// Aggregate counters stored on a post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct VoteTally {
    pub upvotes: i32,
    pub downvotes: i32,
}

/// Row-level change a vote request makes to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteChange {
    Insert(VoteValue),
    Delete,
    Flip(VoteValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteStep {
    pub change: VoteChange,
    pub tally: VoteTally,
    pub user_vote: Option<VoteValue>,
}

impl VoteTally {
    fn counter(&mut self, value: VoteValue) -> &mut i32 {
        match value {
            VoteValue::Up => &mut self.upvotes,
            VoteValue::Down => &mut self.downvotes,
        }
    }

    fn incr(&mut self, value: VoteValue) {
        *self.counter(value) += 1;
    }

    // Never below zero, even if the stored counters had already drifted.
    fn decr(&mut self, value: VoteValue) {
        let c = self.counter(value);
        *c = (*c - 1).max(0);
    }

    /// Decide the transition for `requested` given the caller's current vote.
    pub fn apply(self, existing: Option<VoteValue>, requested: VoteValue) -> VoteStep {
        let mut tally = self;
        match existing {
            None => {
                tally.incr(requested);
                VoteStep {
                    change: VoteChange::Insert(requested),
                    tally,
                    user_vote: Some(requested),
                }
            }
            Some(current) if current == requested => {
                tally.decr(requested);
                VoteStep {
                    change: VoteChange::Delete,
                    tally,
                    user_vote: None,
                }
            }
            Some(current) => {
                tally.decr(current);
                tally.incr(requested);
                VoteStep {
                    change: VoteChange::Flip(requested),
                    tally,
                    user_vote: Some(requested),
                }
            }
        }
    }
}

/// Response to a vote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub upvotes: i32,
    pub downvotes: i32,
    pub user_vote: Option<VoteValue>,
}

impl From<VoteStep> for VoteOutcome {
    fn from(step: VoteStep) -> Self {
        Self {
            upvotes: step.tally.upvotes,
            downvotes: step.tally.downvotes,
            user_vote: step.user_vote,
        }
    }
}

/// What a ledger call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteApplied {
    Applied(VoteOutcome),
    PostMissing,
    /// The voter's account no longer exists.
    VoterMissing,
}

#[async_trait]
pub trait VoteLedger: Send + Sync {
    /// Apply one vote transition atomically.
    async fn apply_vote(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        value: VoteValue,
    ) -> anyhow::Result<VoteApplied>;
}

#[derive(FromRow)]
struct VoteRow {
    id: Uuid,
    value: i16,
}

#[async_trait]
impl VoteLedger for PgStore {
    async fn apply_vote(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        value: VoteValue,
    ) -> anyhow::Result<VoteApplied> {
        let mut tx = self.pool.begin().await.context("begin tx")?;

        // Row lock on the post serializes every vote on it until commit.
        let tally = sqlx::query_as::<_, VoteTally>(
            r#"SELECT upvotes, downvotes FROM posts WHERE id = $1 FOR UPDATE"#,
        )
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await
        .context("lock post")?;
        let Some(tally) = tally else {
            return Ok(VoteApplied::PostMissing);
        };

        let existing = sqlx::query_as::<_, VoteRow>(
            r#"SELECT id, value FROM votes WHERE user_id = $1 AND post_id = $2"#,
        )
        .bind(user_id)
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await
        .context("load vote")?;

        let current = match &existing {
            Some(row) => Some(
                VoteValue::from_i16(row.value)
                    .with_context(|| format!("corrupt vote value {}", row.value))?,
            ),
            None => None,
        };
        let step = tally.apply(current, value);

        match (step.change, existing) {
            (VoteChange::Insert(v), _) => {
                let inserted = sqlx::query(
                    r#"INSERT INTO votes (user_id, post_id, value) VALUES ($1, $2, $3)"#,
                )
                .bind(user_id)
                .bind(post_id)
                .bind(v.as_i16())
                .execute(&mut *tx)
                .await;
                // The post is locked, so a foreign key miss can only be the user.
                if let Err(sqlx::Error::Database(db)) = &inserted {
                    if db.is_foreign_key_violation() {
                        return Ok(VoteApplied::VoterMissing);
                    }
                }
                inserted.context("insert vote")?;
            }
            (VoteChange::Delete, Some(row)) => {
                sqlx::query(r#"DELETE FROM votes WHERE id = $1"#)
                    .bind(row.id)
                    .execute(&mut *tx)
                    .await
                    .context("delete vote")?;
            }
            (VoteChange::Flip(v), Some(row)) => {
                sqlx::query(r#"UPDATE votes SET value = $2 WHERE id = $1"#)
                    .bind(row.id)
                    .bind(v.as_i16())
                    .execute(&mut *tx)
                    .await
                    .context("update vote")?;
            }
            (change, None) => anyhow::bail!("vote transition {change:?} without a vote row"),
        }

        sqlx::query(r#"UPDATE posts SET upvotes = $2, downvotes = $3 WHERE id = $1"#)
            .bind(post_id)
            .bind(step.tally.upvotes)
            .bind(step.tally.downvotes)
            .execute(&mut *tx)
            .await
            .context("update post counters")?;

        tx.commit().await.context("commit tx")?;
        debug!(%user_id, %post_id, change = ?step.change, "vote ledger updated");
        Ok(VoteApplied::Applied(step.into()))
    }
}

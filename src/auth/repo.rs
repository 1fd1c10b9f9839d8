use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, School, User};
use crate::db::PgStore;

/// Outcome of inserting a user whose email may already be taken.
#[derive(Debug)]
pub enum CreateUser {
    Created(User),
    EmailTaken,
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    /// Insert a verified user.
    async fn create(&self, user: NewUser) -> anyhow::Result<CreateUser>;

    async fn find_school(&self, id: Uuid) -> anyhow::Result<Option<School>>;

    /// Return the school for `domain`, creating it with `name` if absent.
    async fn find_or_create_school(&self, domain: &str, name: &str) -> anyhow::Result<School>;
}

const USER_COLUMNS: &str =
    "id, email, password_hash, display_name, school_id, is_verified, created_at";

#[async_trait]
impl UserRepo for PgStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn create(&self, user: NewUser) -> anyhow::Result<CreateUser> {
        let row = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, display_name, school_id, is_verified)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (email) DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(user.school_id)
        .fetch_optional(&self.pool)
        .await
        .context("insert user")?;

        Ok(match row {
            Some(u) => CreateUser::Created(u),
            None => CreateUser::EmailTaken,
        })
    }

    async fn find_school(&self, id: Uuid) -> anyhow::Result<Option<School>> {
        let school = sqlx::query_as::<_, School>(
            r#"SELECT id, domain, name, created_at FROM schools WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("find school")?;
        Ok(school)
    }

    async fn find_or_create_school(&self, domain: &str, name: &str) -> anyhow::Result<School> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let school = sqlx::query_as::<_, School>(
            r#"
            INSERT INTO schools (domain, name)
            VALUES ($1, $2)
            ON CONFLICT (domain) DO UPDATE SET domain = EXCLUDED.domain
            RETURNING id, domain, name, created_at
            "#,
        )
        .bind(domain)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .context("upsert school")?;
        Ok(school)
    }
}

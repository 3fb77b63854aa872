use crate::{
    error::{AppError, Result, classify_db_error},
    models::{Comment, Post, PostFields, Role, User, UserCredentials},
};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

/// NewUser
///
/// Everything needed to persist an account. The password arrives already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

/// Repository Trait
///
/// Abstract contract for all persistence operations, so handlers work the same
/// against Postgres or the in-memory store.
///
/// Uniqueness (emails, titles) is enforced *inside* the store in one atomic step;
/// callers never read-then-write to check it.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Identity ---
    /// Inserts an account; the first account ever created becomes administrator.
    /// Fails with `DuplicateEmail` on collision.
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn get_user(&self, id: i64) -> Result<Option<User>>;
    async fn get_user_credentials(&self, email: &str) -> Result<Option<UserCredentials>>;
    /// `None` if the user does not exist. Refuses with `LastAdministrator` when
    /// the change would leave no administrator.
    async fn set_user_role(&self, id: i64, role: Role) -> Result<Option<User>>;

    // --- Sessions ---
    /// Fails with `NotFound` if the user does not exist.
    async fn create_session(&self, session_id: Uuid, user_id: i64) -> Result<()>;
    /// Resolves a live session to its user; `None` when either is gone.
    async fn get_session_user(&self, session_id: Uuid) -> Result<Option<User>>;
    /// Idempotent: deleting an unknown session is not an error.
    async fn delete_session(&self, session_id: Uuid) -> Result<()>;

    // --- Posts ---
    /// Fails with `DuplicateTitle` on collision.
    async fn create_post(&self, author_id: i64, fields: PostFields, date: NaiveDate) -> Result<Post>;
    async fn get_post(&self, id: i64) -> Result<Option<Post>>;
    /// Mutates title/subtitle/body/image only. `None` if the post does not exist.
    async fn update_post(&self, id: i64, fields: PostFields) -> Result<Option<Post>>;
    /// Returns false if nothing was deleted. Comments go with the post.
    async fn delete_post(&self, id: i64) -> Result<bool>;
    /// Newest first (`date DESC, id DESC`).
    async fn list_posts(&self, limit: i64, offset: i64) -> Result<Vec<Post>>;
    async fn count_posts(&self) -> Result<i64>;

    // --- Comments ---
    /// Fails with `NotFound` if the post does not exist.
    async fn add_comment(&self, post_id: i64, author_id: i64, text: String) -> Result<Comment>;
    /// Oldest first.
    async fn get_comments(&self, post_id: i64) -> Result<Vec<Comment>>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, email, name, role";

/// Advisory lock key serializing every write that reads or changes roles.
const ROLE_LOCK_KEY: i64 = 0x7175_696c_6c5f_726f;

const POST_SELECT: &str = r#"
    SELECT p.id, p.title, p.subtitle, p.body, p.img_url, p.date, p.author_id, u.name AS author_name
    FROM posts p
    JOIN users u ON u.id = p.author_id
"#;

/// PostgresRepository
///
/// The production implementation of the `Repository` trait, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a transaction that holds the role lock until commit or rollback.
    async fn begin_role_change(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(ROLE_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// create_user
    ///
    /// The role is decided under the role lock: administrator when the table is
    /// still empty, author otherwise. Concurrent first sign-ups queue on the
    /// lock, and each INSERT statement sees the rows committed before it.
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tx = self.begin_role_change().await?;

        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, name, role)
            SELECT $1, $2, $3,
                   CASE WHEN EXISTS (SELECT 1 FROM users) THEN 'author' ELSE 'administrator' END
            RETURNING id, email, name, role
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| classify_db_error(e, AppError::DuplicateEmail))?;

        tx.commit().await?;
        Ok(created)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user_credentials(&self, email: &str) -> Result<Option<UserCredentials>> {
        let creds = sqlx::query_as::<_, UserCredentials>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(creds)
    }

    /// set_user_role
    ///
    /// Runs under the role lock so two administrators demoting each other
    /// cannot both pass the last-administrator check.
    async fn set_user_role(&self, id: i64, role: Role) -> Result<Option<User>> {
        let mut tx = self.begin_role_change().await?;

        let current: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(current) = current else {
            return Ok(None);
        };

        if current == Role::Administrator.as_str() && role != Role::Administrator {
            let admins: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'administrator'")
                    .fetch_one(&mut *tx)
                    .await?;
            if admins <= 1 {
                return Err(AppError::LastAdministrator);
            }
        }

        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(role.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(user))
    }

    async fn create_session(&self, session_id: Uuid, user_id: i64) -> Result<()> {
        sqlx::query("INSERT INTO sessions (id, user_id) VALUES ($1, $2)")
            .bind(session_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| classify_db_error(e, AppError::Unauthorized))?;
        Ok(())
    }

    async fn get_session_user(&self, session_id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.email, u.name, u.role
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// create_post
    ///
    /// Inserts and joins the author's name in one round trip (CTE), mirroring how
    /// comments are returned.
    async fn create_post(&self, author_id: i64, fields: PostFields, date: NaiveDate) -> Result<Post> {
        sqlx::query_as::<_, Post>(
            r#"
            WITH inserted AS (
                INSERT INTO posts (title, subtitle, body, img_url, date, author_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, title, subtitle, body, img_url, date, author_id
            )
            SELECT i.id, i.title, i.subtitle, i.body, i.img_url, i.date, i.author_id, u.name AS author_name
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(&fields.title)
        .bind(&fields.subtitle)
        .bind(&fields.body)
        .bind(&fields.img_url)
        .bind(date)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify_db_error(e, AppError::DuplicateTitle))
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!("{POST_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn update_post(&self, id: i64, fields: PostFields) -> Result<Option<Post>> {
        sqlx::query_as::<_, Post>(
            r#"
            WITH updated AS (
                UPDATE posts
                SET title = $2, subtitle = $3, body = $4, img_url = $5
                WHERE id = $1
                RETURNING id, title, subtitle, body, img_url, date, author_id
            )
            SELECT d.id, d.title, d.subtitle, d.body, d.img_url, d.date, d.author_id, u.name AS author_name
            FROM updated d JOIN users u ON u.id = d.author_id
            "#,
        )
        .bind(id)
        .bind(&fields.title)
        .bind(&fields.subtitle)
        .bind(&fields.body)
        .bind(&fields.img_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify_db_error(e, AppError::DuplicateTitle))
    }

    async fn delete_post(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_posts(&self, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "{POST_SELECT} ORDER BY p.date DESC, p.id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    async fn count_posts(&self) -> Result<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    /// add_comment
    ///
    /// A missing post surfaces as a foreign key violation, reported as `NotFound`.
    async fn add_comment(&self, post_id: i64, author_id: i64, text: String) -> Result<Comment> {
        sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (post_id, author_id, text) VALUES ($1, $2, $3)
                RETURNING id, post_id, author_id, text, created_at
            )
            SELECT i.id, i.post_id, i.author_id, u.name AS author_name, i.text, i.created_at
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(post_id)
        .bind(author_id)
        .bind(text)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify_db_error(e, AppError::NotFound))
    }

    async fn get_comments(&self, post_id: i64) -> Result<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT c.id, c.post_id, c.author_id, u.name AS author_name, c.text, c.created_at
            FROM comments c
            JOIN users u ON u.id = c.author_id
            WHERE c.post_id = $1
            ORDER BY c.created_at ASC, c.id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }
}

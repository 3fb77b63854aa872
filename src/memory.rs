//! In-process implementation of [`Repository`].
//!
//! Backs the test suites and local demos. Every operation runs inside one
//! critical section, so the uniqueness checks are as atomic as the Postgres
//! constraints they stand in for.

use crate::{
    error::{AppError, Result},
    models::{Comment, Post, PostFields, Role, User, UserCredentials},
    repository::{NewUser, Repository},
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, UserCredentials>,
    posts: BTreeMap<i64, StoredPost>,
    comments: BTreeMap<i64, StoredComment>,
    sessions: HashMap<Uuid, i64>,
    next_user: i64,
    next_post: i64,
    next_comment: i64,
}

struct StoredPost {
    fields: PostFields,
    date: NaiveDate,
    author_id: i64,
}

struct StoredComment {
    post_id: i64,
    author_id: i64,
    text: String,
    created_at: chrono::DateTime<Utc>,
}

impl Tables {
    fn author_name(&self, id: i64) -> String {
        self.users
            .get(&id)
            .map(|c| c.user.name.clone())
            .unwrap_or_default()
    }

    fn post(&self, id: i64) -> Option<Post> {
        self.posts.get(&id).map(|p| Post {
            id,
            title: p.fields.title.clone(),
            subtitle: p.fields.subtitle.clone(),
            body: p.fields.body.clone(),
            img_url: p.fields.img_url.clone(),
            date: p.date,
            author_id: p.author_id,
            author_name: self.author_name(p.author_id),
        })
    }

    fn comment(&self, id: i64, c: &StoredComment) -> Comment {
        Comment {
            id,
            post_id: c.post_id,
            author_id: c.author_id,
            author_name: self.author_name(c.author_id),
            text: c.text.clone(),
            created_at: c.created_at,
        }
    }

    fn title_taken(&self, title: &str, except: Option<i64>) -> bool {
        self.posts
            .iter()
            .any(|(id, p)| p.fields.title == title && Some(*id) != except)
    }
}

/// MemoryRepository
///
/// Thread-safe, non-durable store with the same observable semantics as
/// `PostgresRepository`, including id sequences starting at 1.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts.
    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.tables.lock().await.sessions.len()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut t = self.tables.lock().await;
        if t.users.values().any(|c| c.user.email == user.email) {
            return Err(AppError::DuplicateEmail);
        }
        let role = if t.users.is_empty() {
            Role::Administrator
        } else {
            Role::Author
        };
        t.next_user += 1;
        let created = User {
            id: t.next_user,
            email: user.email,
            name: user.name,
            role,
        };
        t.users.insert(
            created.id,
            UserCredentials {
                user: created.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(created)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.get(&id).map(|c| c.user.clone()))
    }

    async fn get_user_credentials(&self, email: &str) -> Result<Option<UserCredentials>> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|c| c.user.email == email).cloned())
    }

    async fn set_user_role(&self, id: i64, role: Role) -> Result<Option<User>> {
        let mut t = self.tables.lock().await;
        let Some(current) = t.users.get(&id).map(|c| c.user.role) else {
            return Ok(None);
        };

        let admins = t.users.values().filter(|c| c.user.is_administrator()).count();
        if current == Role::Administrator && role != Role::Administrator && admins <= 1 {
            return Err(AppError::LastAdministrator);
        }

        Ok(t.users.get_mut(&id).map(|c| {
            c.user.role = role;
            c.user.clone()
        }))
    }

    async fn create_session(&self, session_id: Uuid, user_id: i64) -> Result<()> {
        let mut t = self.tables.lock().await;
        if !t.users.contains_key(&user_id) {
            return Err(AppError::NotFound);
        }
        t.sessions.insert(session_id, user_id);
        Ok(())
    }

    async fn get_session_user(&self, session_id: Uuid) -> Result<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t
            .sessions
            .get(&session_id)
            .and_then(|uid| t.users.get(uid))
            .map(|c| c.user.clone()))
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<()> {
        self.tables.lock().await.sessions.remove(&session_id);
        Ok(())
    }

    async fn create_post(&self, author_id: i64, fields: PostFields, date: NaiveDate) -> Result<Post> {
        let mut t = self.tables.lock().await;
        if !t.users.contains_key(&author_id) {
            return Err(AppError::NotFound);
        }
        if t.title_taken(&fields.title, None) {
            return Err(AppError::DuplicateTitle);
        }
        t.next_post += 1;
        let id = t.next_post;
        t.posts.insert(
            id,
            StoredPost {
                fields,
                date,
                author_id,
            },
        );
        t.post(id).ok_or(AppError::NotFound)
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>> {
        Ok(self.tables.lock().await.post(id))
    }

    async fn update_post(&self, id: i64, fields: PostFields) -> Result<Option<Post>> {
        let mut t = self.tables.lock().await;
        if !t.posts.contains_key(&id) {
            return Ok(None);
        }
        if t.title_taken(&fields.title, Some(id)) {
            return Err(AppError::DuplicateTitle);
        }
        if let Some(stored) = t.posts.get_mut(&id) {
            stored.fields = fields;
        }
        Ok(t.post(id))
    }

    async fn delete_post(&self, id: i64) -> Result<bool> {
        let mut t = self.tables.lock().await;
        if t.posts.remove(&id).is_none() {
            return Ok(false);
        }
        t.comments.retain(|_, c| c.post_id != id);
        Ok(true)
    }

    async fn list_posts(&self, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let t = self.tables.lock().await;
        let mut ordered: Vec<(i64, NaiveDate)> = t.posts.iter().map(|(id, p)| (*id, p.date)).collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));

        Ok(ordered
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .filter_map(|(id, _)| t.post(id))
            .collect())
    }

    async fn count_posts(&self) -> Result<i64> {
        Ok(self.tables.lock().await.posts.len() as i64)
    }

    async fn add_comment(&self, post_id: i64, author_id: i64, text: String) -> Result<Comment> {
        let mut t = self.tables.lock().await;
        if !t.posts.contains_key(&post_id) || !t.users.contains_key(&author_id) {
            return Err(AppError::NotFound);
        }
        t.next_comment += 1;
        let id = t.next_comment;
        let stored = StoredComment {
            post_id,
            author_id,
            text,
            created_at: Utc::now(),
        };
        let comment = t.comment(id, &stored);
        t.comments.insert(id, stored);
        Ok(comment)
    }

    async fn get_comments(&self, post_id: i64) -> Result<Vec<Comment>> {
        let t = self.tables.lock().await;
        Ok(t
            .comments
            .iter()
            .filter(|(_, c)| c.post_id == post_id)
            .map(|(id, c)| t.comment(*id, c))
            .collect())
    }
}

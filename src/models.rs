use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use validator::Validate;

// --- Core Application Schemas (Mapped to Database) ---

/// Role
///
/// Capability level of an account. Stored as text in `users.role`; the
/// Authorization Gate reads it instead of comparing identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    #[default]
    Author,
    Administrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Author => "author",
            Role::Administrator => "administrator",
        }
    }
}

/// A `users.role` value outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "author" => Ok(Role::Author),
            "administrator" => Ok(Role::Administrator),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// User
///
/// Public view of an account from the `users` table. The password hash never
/// leaves the repository except through [`UserCredentials`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: i64,
    // Unique, compared exactly as stored.
    pub email: String,
    // Display name shown next to posts and comments.
    pub name: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
}

impl User {
    pub fn is_administrator(&self) -> bool {
        self.role == Role::Administrator
    }
}

/// UserCredentials
///
/// Internal row used only by the Identity Store to verify a login attempt.
#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    #[sqlx(flatten)]
    pub user: User,
    // Argon2id PHC string, salted per record.
    pub password_hash: String,
}

/// Post
///
/// A published article from the `posts` table, joined with its author's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub subtitle: String,
    pub body: String,
    pub img_url: String,
    /// Publication day, serialized as e.g. "October 17, 2026".
    #[serde(with = "display_date")]
    #[ts(type = "string")]
    #[schema(value_type = String, example = "October 17, 2026")]
    pub date: NaiveDate,
    // FK to users.id (owner).
    pub author_id: i64,
    // Loaded via JOIN in the repository query.
    pub author_name: String,
}

/// Comment
///
/// A reply from the `comments` table, augmented with the author's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub author_name: String,
    pub text: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Input payload for account creation (POST /register).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct RegisterRequest {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(min = 1, max = 250, message = "Name is required."))]
    pub name: String,
    #[validate(length(min = 1, max = 255, message = "Password is required."))]
    pub password: String,
}

/// LoginRequest
///
/// Input payload for POST /login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct LoginRequest {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

/// PostFields
///
/// The editable part of a post, used both for creation (POST /new-post) and
/// editing (POST /edit-post/{id}). Author and date are never taken from input.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct PostFields {
    #[validate(length(min = 1, max = 250, message = "Post title is required."))]
    pub title: String,
    #[validate(length(min = 1, max = 250, message = "Post subtitle is required."))]
    pub subtitle: String,
    #[validate(length(min = 1, message = "Post content is required."))]
    pub body: String,
    #[validate(url(message = "Image URL must be a valid URL."))]
    pub img_url: String,
}

/// CreateCommentRequest
///
/// Input payload for posting a comment (POST /post/{id}).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, message = "Comment cannot be empty."))]
    pub text: String,
}

/// UpdateRoleRequest
///
/// Input payload for PUT /admin/users/{id}/role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// ContactRequest
///
/// Contact form submission forwarded to the site owner by mail.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct ContactRequest {
    #[validate(length(min = 1, max = 250, message = "Name is required."))]
    pub name: String,
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[validate(length(min = 1, message = "Message is required."))]
    pub message: String,
}

// --- Response Schemas (Output) ---

/// SessionResponse
///
/// Returned by a successful login. The token is sent back as a Bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionResponse {
    pub token_type: String,
    pub token: String,
    pub user: User,
}

/// PostPage
///
/// One page of the post listing plus what the UI needs for navigation controls.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub page_index: u32,
    pub total_pages: u32,
}

/// PostDetail
///
/// A single post with its comments, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PostDetail {
    pub post: Post,
    pub comments: Vec<Comment>,
}

/// SiteInfo
///
/// Static site metadata served by /about and /contact.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SiteInfo {
    pub site_name: String,
    pub contact_enabled: bool,
}

/// Serde adapter keeping the long-form publication date the blog has always shown.
pub mod display_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub const FORMAT: &str = "%B %d, %Y";

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&raw, FORMAT).map_err(D::Error::custom)
    }
}

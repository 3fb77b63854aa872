use crate::{
    AppState,
    auth::{self, Actor, AuthUser},
    error::{AppError, Result},
    gate::{Operation, authorize},
    identity,
    mail::OutboundMessage,
    models::{
        Comment, ContactRequest, CreateCommentRequest, LoginRequest, Post, PostDetail, PostFields,
        PostPage, RegisterRequest, SessionResponse, SiteInfo, UpdateRoleRequest, User,
    },
    pagination::{self, PageQuery},
};
use axum::{
    Json,
    extract::{FromRequest, Path, Query, Request, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use validator::Validate;

// --- Extractors ---

/// A JSON body that has been read but not yet judged. Gated handlers take this
/// instead of [`Valid`] so the gate answers before the payload's shape does.
pub type RawBody<T> = std::result::Result<Json<T>, JsonRejection>;

/// Turns a [`RawBody`] into a payload that passed its `validator` rules.
pub fn validated<T: Validate>(body: RawBody<T>) -> Result<T> {
    let Json(value) = body?;
    value.validate()?;
    Ok(value)
}

/// Valid
///
/// JSON body extractor that runs the payload's `validator` rules before the
/// handler sees it; failures become a 400 with field-level messages. Only for
/// routes open to everyone.
pub struct Valid<T>(pub T);

impl<S, T> FromRequest<S> for Valid<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let body = Json::<T>::from_request(req, state).await;
        validated(body)
            .map(Valid)
            .map_err(IntoResponse::into_response)
    }
}

// --- Listing & Reading ---

/// list_posts
///
/// [Public Route] One page of posts, newest first. `page_index` defaults to 1.
#[utoipa::path(
    get,
    path = "/",
    params(PageQuery),
    responses((status = 200, description = "Page of posts", body = PostPage))
)]
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PostPage>> {
    let page = pagination::list_posts(
        state.repo.as_ref(),
        query.page_index.unwrap_or(1),
        state.config.posts_per_page,
    )
    .await?;
    Ok(Json(page))
}

/// show_post
///
/// [Public Route] A single post with its comments.
#[utoipa::path(
    get,
    path = "/post/{id}",
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Found", body = PostDetail),
        (status = 404, description = "Not Found")
    )
)]
pub async fn show_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostDetail>> {
    let post = state.repo.get_post(id).await?.ok_or(AppError::NotFound)?;
    let comments = state.repo.get_comments(id).await?;
    Ok(Json(PostDetail { post, comments }))
}

// --- Identity & Sessions ---

/// register_user
///
/// [Public Route] Creates an account. A taken email yields 409 with a message
/// pointing the visitor to the login form.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = User),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Valid(payload): Valid<RegisterRequest>,
) -> Result<(StatusCode, Json<User>)> {
    let user = identity::register(state.repo.as_ref(), payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// login
///
/// [Public Route] Verifies credentials and starts a session. Unknown email and
/// wrong password produce the same 401 body.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = SessionResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Valid(payload): Valid<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    let user = identity::authenticate(state.repo.as_ref(), &payload.email, &payload.password).await?;
    let token = auth::start_session(state.repo.as_ref(), &state.config, &user).await?;

    Ok(Json(SessionResponse {
        token_type: "Bearer".to_string(),
        token,
        user,
    }))
}

/// logout
///
/// [Public Route] Ends the presented session, if any, and sends the client back
/// to the listing. Calling it without a session is harmless.
#[utoipa::path(
    get,
    path = "/logout",
    responses((status = 303, description = "Redirect to listing"))
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Redirect> {
    if let Some(token) = auth::bearer_token(&headers) {
        auth::end_session(state.repo.as_ref(), &state.config, token).await?;
    }
    Ok(Redirect::to("/"))
}

/// get_me
///
/// [Authenticated Route] The account bound to the current session.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Profile", body = User),
        (status = 401, description = "No session")
    )
)]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

// --- Comments ---

/// add_comment
///
/// [Actor-Gated Route] Any logged-in actor may comment; anonymous visitors get 401.
#[utoipa::path(
    post,
    path = "/post/{id}",
    params(("id" = i64, Path, description = "Post ID")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment Added", body = Comment),
        (status = 401, description = "Login required"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn add_comment(
    actor: Actor,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    body: RawBody<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>)> {
    authorize(&actor, Operation::CreateComment(post_id)).into_result()?;
    let author = actor.user().ok_or(AppError::Unauthorized)?;
    let payload = validated(body)?;

    let comment = state
        .repo
        .add_comment(post_id, author.id, payload.text)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

// --- Post Management (administrators) ---

/// create_post
///
/// [Actor-Gated Route] Publishes a post dated today, authored by the caller.
#[utoipa::path(
    post,
    path = "/new-post",
    request_body = PostFields,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 403, description = "Not an administrator"),
        (status = 409, description = "Title already taken")
    )
)]
pub async fn create_post(
    actor: Actor,
    State(state): State<AppState>,
    body: RawBody<PostFields>,
) -> Result<(StatusCode, Json<Post>)> {
    authorize(&actor, Operation::CreatePost).into_result()?;
    let author = actor.user().ok_or(AppError::Forbidden)?;
    let fields = validated(body)?;

    let post = state
        .repo
        .create_post(author.id, fields, Utc::now().date_naive())
        .await?;

    tracing::info!(post_id = post.id, author_id = author.id, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// get_edit_post
///
/// [Actor-Gated Route] Current values of a post, used to prefill the edit form.
#[utoipa::path(
    get,
    path = "/edit-post/{id}",
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post", body = Post),
        (status = 403, description = "Not an administrator"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_edit_post(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Post>> {
    authorize(&actor, Operation::EditPost(id)).into_result()?;
    let post = state.repo.get_post(id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(post))
}

/// edit_post
///
/// [Actor-Gated Route] Replaces title, subtitle, body and image. Author and date
/// stay as they were; any administrator may edit any post.
#[utoipa::path(
    post,
    path = "/edit-post/{id}",
    params(("id" = i64, Path, description = "Post ID")),
    request_body = PostFields,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 403, description = "Not an administrator"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Title already taken")
    )
)]
pub async fn edit_post(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: RawBody<PostFields>,
) -> Result<Json<Post>> {
    authorize(&actor, Operation::EditPost(id)).into_result()?;
    let fields = validated(body)?;

    let post = state
        .repo
        .update_post(id, fields)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(post))
}

/// delete_post
///
/// [Actor-Gated Route] Removes a post and its comments. Requires the same
/// administrator check as editing.
#[utoipa::path(
    get,
    path = "/delete/{id}",
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 303, description = "Deleted, redirect to listing"),
        (status = 403, description = "Not an administrator"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_post(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Redirect> {
    authorize(&actor, Operation::DeletePost(id)).into_result()?;

    if !state.repo.delete_post(id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(post_id = id, "post deleted");
    Ok(Redirect::to("/"))
}

/// update_user_role
///
/// [Actor-Gated Route] Promotes or demotes an account.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    params(("id" = i64, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 403, description = "Not an administrator"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Would leave no administrator")
    )
)]
pub async fn update_user_role(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: RawBody<UpdateRoleRequest>,
) -> Result<Json<User>> {
    authorize(&actor, Operation::ManageRoles).into_result()?;
    let Json(payload) = body?;

    let user = identity::promote(state.repo.as_ref(), &actor, id, payload.role).await?;
    Ok(Json(user))
}

// --- Static & Contact ---

fn site_info(state: &AppState) -> SiteInfo {
    SiteInfo {
        site_name: state.config.site_name.clone(),
        contact_enabled: true,
    }
}

/// about
///
/// [Public Route] Site metadata for the about page.
#[utoipa::path(
    get,
    path = "/about",
    responses((status = 200, description = "Site info", body = SiteInfo))
)]
pub async fn about(State(state): State<AppState>) -> Json<SiteInfo> {
    Json(site_info(&state))
}

/// contact_info
///
/// [Public Route] Site metadata for the contact page.
#[utoipa::path(
    get,
    path = "/contact",
    responses((status = 200, description = "Site info", body = SiteInfo))
)]
pub async fn contact_info(State(state): State<AppState>) -> Json<SiteInfo> {
    Json(site_info(&state))
}

/// send_contact
///
/// [Public Route] Forwards a contact form submission to the site owner through
/// the mail relay. Also mounted at `/form-entry`.
#[utoipa::path(
    post,
    path = "/contact",
    request_body = ContactRequest,
    responses(
        (status = 202, description = "Message accepted by the relay"),
        (status = 502, description = "Mail relay unavailable")
    )
)]
pub async fn send_contact(
    State(state): State<AppState>,
    Valid(form): Valid<ContactRequest>,
) -> Result<StatusCode> {
    let message = OutboundMessage::from_contact(&form, &state.config.mail_recipient);
    state.mail.send(message).await?;
    Ok(StatusCode::ACCEPTED)
}

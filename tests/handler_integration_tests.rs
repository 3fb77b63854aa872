use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use quill_blog::{
    AppConfig, AppState, MemoryRepository, MockMailService, create_router,
    models::{Comment, Post, PostDetail, PostPage, SessionResponse, User},
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::util::ServiceExt;

// --- Test Harness ---

struct TestApp {
    router: Router,
    mail: MockMailService,
}

fn spawn_app_with_mail(mail: MockMailService) -> TestApp {
    let state = AppState {
        repo: Arc::new(MemoryRepository::new()),
        mail: Arc::new(mail.clone()),
        config: AppConfig::default(),
    };
    TestApp {
        router: create_router(state),
        mail,
    }
}

fn spawn_app() -> TestApp {
    spawn_app_with_mail(MockMailService::new())
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn register(&self, email: &str, name: &str, password: &str) -> User {
        let resp = self
            .send(
                Method::POST,
                "/register",
                None,
                Some(json!({ "email": email, "name": name, "password": password })),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        read_json(resp).await
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let resp = self
            .send(
                Method::POST,
                "/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let session: SessionResponse = read_json(resp).await;
        session.token
    }

    /// Registers the first account, which becomes administrator, and logs it in.
    async fn admin_token(&self) -> String {
        self.register("admin@example.com", "admin", "admin-pw").await;
        self.login("admin@example.com", "admin-pw").await
    }

    async fn create_post(&self, token: &str, title: &str) -> Response {
        self.send(Method::POST, "/new-post", Some(token), Some(post_body(title)))
            .await
    }
}

fn post_body(title: &str) -> Value {
    json!({
        "title": title,
        "subtitle": "A subtitle",
        "body": "<p>Body</p>",
        "img_url": "https://images.example.com/cover.jpg"
    })
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> T {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// --- Tests ---

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app();
    let resp = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_end_to_end_blog_scenario() {
    let app = spawn_app();
    let admin_token = app.admin_token().await;

    // alice registers and logs in
    let alice = app.register("alice@example.com", "alice", "pw123").await;
    let alice_token = app.login("alice@example.com", "pw123").await;

    // alice is not an administrator
    let resp = app.create_post(&alice_token, "Alice's Post").await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // the administrator publishes
    let resp = app.create_post(&admin_token, "First Post").await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let post: Post = read_json(resp).await;
    assert_eq!(post.author_id, 1);

    // the listing shows it
    let resp = app.send(Method::GET, "/", None, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page: PostPage = read_json(resp).await;
    assert!(page.posts.iter().any(|p| p.title == "First Post"));
    assert_eq!(page.page_index, 1);

    // alice comments
    let resp = app
        .send(
            Method::POST,
            &format!("/post/{}", post.id),
            Some(&alice_token),
            Some(json!({ "text": "Nice one!" })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let comment: Comment = read_json(resp).await;
    assert_eq!(comment.author_id, alice.id);

    // the comment shows up attributed to alice
    let resp = app
        .send(Method::GET, &format!("/post/{}", post.id), None, None)
        .await;
    let detail: PostDetail = read_json(resp).await;
    assert_eq!(detail.comments.len(), 1);
    assert_eq!(detail.comments[0].author_name, "alice");
    assert_eq!(detail.comments[0].text, "Nice one!");
}

#[tokio::test]
async fn test_anonymous_cannot_manage_posts() {
    let app = spawn_app();
    let admin = app.admin_token().await;
    let post: Post = read_json(app.create_post(&admin, "Existing").await).await;

    let resp = app.send(Method::POST, "/new-post", None, Some(post_body("Nope"))).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .send(
            Method::POST,
            &format!("/edit-post/{}", post.id),
            None,
            Some(post_body("Nope")),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .send(Method::GET, &format!("/delete/{}", post.id), None, None)
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_forbidden_does_not_reveal_missing_posts() {
    let app = spawn_app();
    app.admin_token().await;
    app.register("bob@example.com", "bob", "pw").await;
    let bob = app.login("bob@example.com", "pw").await;

    // post 999 does not exist, but bob is refused before that is checked
    let resp = app
        .send(Method::GET, "/edit-post/999", Some(&bob), None)
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_delete_post_requires_administrator() {
    // Deletion is gated exactly like editing, closing the unguarded delete route.
    let app = spawn_app();
    let admin = app.admin_token().await;
    app.register("bob@example.com", "bob", "pw").await;
    let bob = app.login("bob@example.com", "pw").await;

    let post: Post = read_json(app.create_post(&admin, "Keep Me").await).await;

    let resp = app
        .send(Method::GET, &format!("/delete/{}", post.id), Some(&bob), None)
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .send(Method::GET, &format!("/post/{}", post.id), None, None)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .send(Method::GET, &format!("/delete/{}", post.id), Some(&admin), None)
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/");

    let resp = app
        .send(Method::GET, &format!("/post/{}", post.id), None, None)
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .send(Method::GET, &format!("/delete/{}", post.id), Some(&admin), None)
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_any_administrator_edits_any_post() {
    let app = spawn_app();
    let first_admin = app.admin_token().await;
    let second = app.register("second@example.com", "second", "pw").await;
    let second_token = app.login("second@example.com", "pw").await;

    let resp = app
        .send(
            Method::PUT,
            &format!("/admin/users/{}/role", second.id),
            Some(&first_admin),
            Some(json!({ "role": "administrator" })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let post: Post = read_json(app.create_post(&first_admin, "Shared").await).await;

    let resp = app
        .send(
            Method::POST,
            &format!("/edit-post/{}", post.id),
            Some(&second_token),
            Some(post_body("Shared, edited")),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let edited: Post = read_json(resp).await;
    assert_eq!(edited.title, "Shared, edited");
    // author and date are untouched by edits
    assert_eq!(edited.author_id, post.author_id);
    assert_eq!(edited.date, post.date);
}

#[tokio::test]
async fn test_edit_missing_post_is_not_found() {
    let app = spawn_app();
    let admin = app.admin_token().await;

    let resp = app
        .send(Method::POST, "/edit-post/42", Some(&admin), Some(post_body("Ghost")))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app.send(Method::GET, "/edit-post/42", Some(&admin), None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_title_conflicts() {
    let app = spawn_app();
    let admin = app.admin_token().await;

    assert_eq!(app.create_post(&admin, "Hello").await.status(), StatusCode::CREATED);
    assert_eq!(app.create_post(&admin, "Hello").await.status(), StatusCode::CONFLICT);
    // titles are compared case-sensitively
    assert_eq!(app.create_post(&admin, "hello").await.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_anonymous_comment_requires_login() {
    let app = spawn_app();
    let admin = app.admin_token().await;
    let post: Post = read_json(app.create_post(&admin, "Commentable").await).await;

    let resp = app
        .send(
            Method::POST,
            &format!("/post/{}", post.id),
            None,
            Some(json!({ "text": "drive-by" })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_comment_on_missing_post_is_not_found() {
    let app = spawn_app();
    let admin = app.admin_token().await;

    let resp = app
        .send(
            Method::POST,
            "/post/77",
            Some(&admin),
            Some(json!({ "text": "hello?" })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let app = spawn_app();
    app.register("dup@example.com", "one", "pw-one").await;

    let resp = app
        .send(
            Method::POST,
            "/register",
            None,
            Some(json!({ "email": "dup@example.com", "name": "two", "password": "pw-two" })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = read_json(resp).await;
    assert!(body["title"].as_str().unwrap().contains("log in instead"));
}

#[tokio::test]
async fn test_register_validation_errors_are_field_level() {
    let app = spawn_app();
    let resp = app
        .send(
            Method::POST,
            "/register",
            None,
            Some(json!({ "email": "not-an-email", "name": "", "password": "pw" })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = read_json(resp).await;
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"email"));
    assert!(fields.contains(&"name"));
}

#[tokio::test]
async fn test_login_failures_look_the_same() {
    let app = spawn_app();
    app.register("carol@example.com", "carol", "right").await;

    let wrong_password = app
        .send(
            Method::POST,
            "/login",
            None,
            Some(json!({ "email": "carol@example.com", "password": "wrong" })),
        )
        .await;
    let unknown_email = app
        .send(
            Method::POST,
            "/login",
            None,
            Some(json!({ "email": "nobody@example.com", "password": "right" })),
        )
        .await;

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);

    let a: Value = read_json(wrong_password).await;
    let b: Value = read_json(unknown_email).await;
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = spawn_app();
    app.register("dave@example.com", "dave", "pw").await;
    let token = app.login("dave@example.com", "pw").await;

    let resp = app.send(Method::GET, "/me", Some(&token), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let me: User = read_json(resp).await;
    assert_eq!(me.email, "dave@example.com");

    let resp = app.send(Method::GET, "/logout", Some(&token), None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let resp = app.send(Method::GET, "/me", Some(&token), None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // logging out again, or without any session, is harmless
    let resp = app.send(Method::GET, "/logout", Some(&token), None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let resp = app.send(Method::GET, "/logout", None, None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_me_requires_session() {
    let app = spawn_app();
    let resp = app.send(Method::GET, "/me", None, None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app.send(Method::GET, "/me", Some("garbage"), None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_listing_past_last_page_is_empty() {
    let app = spawn_app();
    let admin = app.admin_token().await;
    for i in 0..5 {
        app.create_post(&admin, &format!("Post {i}")).await;
    }

    let first: PostPage = read_json(app.send(Method::GET, "/", None, None).await).await;
    assert_eq!(first.posts.len(), 4);
    assert_eq!(first.total_pages, 2);

    let second: PostPage =
        read_json(app.send(Method::GET, "/?page_index=2", None, None).await).await;
    assert_eq!(second.posts.len(), 1);

    let beyond: PostPage =
        read_json(app.send(Method::GET, "/?page_index=9", None, None).await).await;
    assert!(beyond.posts.is_empty());
    assert_eq!(beyond.total_pages, first.total_pages);
}

#[tokio::test]
async fn test_contact_form_is_relayed() {
    let app = spawn_app();
    let form = json!({
        "name": "Erin",
        "email": "erin@example.com",
        "phone": "555-0100",
        "message": "Love the blog"
    });

    let resp = app.send(Method::POST, "/contact", None, Some(form.clone())).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let resp = app.send(Method::POST, "/form-entry", None, Some(form)).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let sent = app.mail.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].to, AppConfig::default().mail_recipient);
    assert_eq!(sent[0].reply_to, "erin@example.com");
    assert!(sent[0].text.contains("Love the blog"));
}

#[tokio::test]
async fn test_contact_relay_failure_is_bad_gateway() {
    let app = spawn_app_with_mail(MockMailService::new_failing());
    let resp = app
        .send(
            Method::POST,
            "/contact",
            None,
            Some(json!({ "name": "Erin", "email": "erin@example.com", "message": "hi" })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_about_returns_site_info() {
    let app = spawn_app();
    let resp = app.send(Method::GET, "/about", None, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = read_json(resp).await;
    assert_eq!(body["site_name"], "Quill");
}

#[tokio::test]
async fn test_gate_answers_before_body_is_checked() {
    let app = spawn_app();
    let admin = app.admin_token().await;
    app.register("bob@example.com", "bob", "pw").await;
    let bob = app.login("bob@example.com", "pw").await;
    let post: Post = read_json(app.create_post(&admin, "Guarded").await).await;

    // an author with a body that fails validation
    let resp = app
        .send(Method::POST, "/new-post", Some(&bob), Some(json!({ "title": "" })))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // an author with no body at all
    let resp = app.send(Method::POST, "/new-post", Some(&bob), None).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // anonymous edit with a body missing every field
    let resp = app
        .send(
            Method::POST,
            &format!("/edit-post/{}", post.id),
            None,
            Some(json!({})),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // anonymous comment with empty text
    let resp = app
        .send(
            Method::POST,
            &format!("/post/{}", post.id),
            None,
            Some(json!({ "text": "" })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // an author changing roles with a garbage body
    let resp = app
        .send(
            Method::PUT,
            "/admin/users/1/role",
            Some(&bob),
            Some(json!({ "role": "root" })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_allowed_callers_still_get_body_errors() {
    let app = spawn_app();
    let admin = app.admin_token().await;

    let resp = app
        .send(Method::POST, "/new-post", Some(&admin), Some(json!({ "title": "" })))
        .await;
    assert!(resp.status().is_client_error());
    assert_ne!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .send(
            Method::POST,
            "/new-post",
            Some(&admin),
            Some(json!({
                "title": "",
                "subtitle": "s",
                "body": "b",
                "img_url": "https://example.com/a.png"
            })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.send(Method::POST, "/new-post", Some(&admin), None).await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_last_administrator_cannot_step_down() {
    let app = spawn_app();
    let admin = app.admin_token().await;

    let resp = app
        .send(
            Method::PUT,
            "/admin/users/1/role",
            Some(&admin),
            Some(json!({ "role": "author" })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // still able to publish
    assert_eq!(app.create_post(&admin, "Still here").await.status(), StatusCode::CREATED);

    // with a second administrator, stepping down is allowed
    let carol = app.register("carol@example.com", "carol", "pw").await;
    let resp = app
        .send(
            Method::PUT,
            &format!("/admin/users/{}/role", carol.id),
            Some(&admin),
            Some(json!({ "role": "administrator" })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .send(
            Method::PUT,
            "/admin/users/1/role",
            Some(&admin),
            Some(json!({ "role": "author" })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let demoted: User = read_json(resp).await;
    assert_eq!(demoted.role, quill_blog::models::Role::Author);
}

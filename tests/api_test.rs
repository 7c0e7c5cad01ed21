//! End-to-end tests driving the full router against a temporary database.
//!
//! Covers:
//! - Registration, login and bearer-token auth
//! - Post visibility, slugs, counters and cascading delete
//! - Category/tag management
//! - Comment threading and moderation
//! - Envelope shape for errors and fallbacks

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use inkwell::config::{AdminConfig, Config};
use inkwell::db;
use inkwell::routes;
use inkwell::state::{AppState, DbPool};

const TEST_COST: u32 = 4;

struct TestApp {
    _dir: TempDir,
    app: Router,
    pool: DbPool,
}

fn setup() -> TestApp {
    let dir = TempDir::new().unwrap();
    let pool = db::create_pool(&dir.path().join("test.db"), 4).unwrap();
    db::run_migrations(&pool).unwrap();

    let mut config = Config::default();
    config.auth.jwt_secret = Some("integration-secret".into());
    config.auth.bcrypt_cost = TEST_COST;
    config.admin = AdminConfig {
        username: Some("admin".into()),
        email: None,
        password: Some("admin-pass".into()),
    };
    db::bootstrap_admin(&pool, &config.admin, TEST_COST).unwrap();

    let app = routes::router(AppState::new(pool.clone(), config));
    TestApp {
        _dir: dir,
        app,
        pool,
    }
}

impl TestApp {
    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, token, Some(body)).await
    }

    async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, token, None).await
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .post(
                "/api/auth/login",
                None,
                json!({ "username": username, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["data"]["token"].as_str().unwrap().to_string()
    }

    async fn admin_token(&self) -> String {
        self.login("admin", "admin-pass").await
    }

    /// Register a user and return (id, token).
    async fn register(&self, username: &str) -> (i64, String) {
        let (status, body) = self
            .post(
                "/api/auth/register",
                None,
                json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": "secret123",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        (
            body["data"]["user"]["id"].as_i64().unwrap(),
            body["data"]["token"].as_str().unwrap().to_string(),
        )
    }

    async fn create_post(&self, token: &str, body: Value) -> Value {
        let (status, body) = self.post("/api/posts", Some(token), body).await;
        assert_eq!(status, StatusCode::CREATED, "create post failed: {body}");
        body["data"].clone()
    }

    async fn published_post(&self, token: &str, title: &str) -> i64 {
        self.create_post(
            token,
            json!({ "title": title, "content": "Body text", "status": "published" }),
        )
        .await["id"]
            .as_i64()
            .unwrap()
    }

    fn count(&self, sql: &str, id: i64) -> i64 {
        let conn = self.pool.get().unwrap();
        conn.query_row(sql, [id], |row| row.get(0)).unwrap()
    }

    fn exec(&self, sql: &str) {
        self.pool.get().unwrap().execute_batch(sql).unwrap();
    }
}

// ============================================================================
// AUTH
// ============================================================================

#[tokio::test]
async fn test_register_returns_user_and_token() {
    let app = setup();
    let (status, body) = app
        .post(
            "/api/auth/register",
            None,
            json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": "secret123",
                "nickname": "Alice",
            }),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["code"], 201);
    assert_eq!(body["data"]["user"]["username"], "alice");
    assert_eq!(body["data"]["user"]["nickname"], "Alice");
    assert_eq!(body["data"]["user"]["role"], "user");
    assert!(body["data"]["user"].get("password_hash").is_none());
    assert!(body["data"]["token"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn test_register_rejects_duplicates() {
    let app = setup();
    app.register("alice").await;

    let (status, body) = app
        .post(
            "/api/auth/register",
            None,
            json!({ "username": "alice", "email": "other@example.com", "password": "secret123" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (status, _) = app
        .post(
            "/api/auth/register",
            None,
            json!({ "username": "alice2", "email": "alice@example.com", "password": "secret123" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_validates_fields() {
    let app = setup();
    for body in [
        json!({ "username": "ab", "email": "ab@example.com", "password": "secret123" }),
        json!({ "username": "valid", "email": "not-an-email", "password": "secret123" }),
        json!({ "username": "valid", "email": "valid@example.com", "password": "123" }),
    ] {
        let (status, _) = app.post("/api/auth/register", None, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_login_success_and_failure() {
    let app = setup();
    app.register("bob").await;

    let token = app.login("bob", "secret123").await;
    let (status, body) = app.get("/api/auth/user", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "bob");

    let (status, body) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "username": "bob", "password": "wrong-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);

    let (status, _) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "username": "nobody", "password": "secret123" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_or_bad_token_is_401() {
    let app = setup();
    let (status, _) = app.get("/api/auth/user", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/auth/user", Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.post("/api/auth/logout", None, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_deleted_user_token_is_rejected() {
    let app = setup();
    let admin = app.admin_token().await;
    let (bob_id, bob_token) = app.register("bob").await;

    let (status, _) = app.delete(&format!("/api/users/{bob_id}"), Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get("/api/auth/user", Some(&bob_token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "username": "bob", "password": "secret123" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// USERS
// ============================================================================

#[tokio::test]
async fn test_user_access_is_self_or_admin() {
    let app = setup();
    let admin = app.admin_token().await;
    let (alice_id, alice) = app.register("alice").await;
    let (bob_id, _) = app.register("bob").await;

    let (status, _) = app.get(&format!("/api/users/{alice_id}"), Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/api/users/{bob_id}"), Some(&alice)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/api/users", Some(&alice)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.get("/api/users", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["users"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_user_update_rules() {
    let app = setup();
    let (alice_id, alice) = app.register("alice").await;
    app.register("bob").await;
    let uri = format!("/api/users/{alice_id}");

    let (status, body) = app
        .put(&uri, Some(&alice), json!({ "nickname": "Ali", "avatar": "a.png" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["nickname"], "Ali");
    assert_eq!(body["data"]["avatar"], "a.png");

    let (status, _) = app.put(&uri, Some(&alice), json!({ "role": "admin" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .put(&uri, Some(&alice), json!({ "email": "bob@example.com" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .put(&uri, Some(&alice), json!({ "password": "new-secret" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    app.login("alice", "new-secret").await;
}

#[tokio::test]
async fn test_admin_cannot_delete_self() {
    let app = setup();
    let admin = app.admin_token().await;
    let (_, body) = app.get("/api/auth/user", Some(&admin)).await;
    let admin_id = body["data"]["id"].as_i64().unwrap();

    let (status, _) = app.delete(&format!("/api/users/{admin_id}"), Some(&admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// POSTS
// ============================================================================

#[tokio::test]
async fn test_post_create_requires_admin() {
    let app = setup();
    let (_, alice) = app.register("alice").await;

    let (status, _) = app
        .post(
            "/api/posts",
            Some(&alice),
            json!({ "title": "Mine", "content": "x" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post("/api/posts", None, json!({ "title": "Mine", "content": "x" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_post_defaults_and_slug_conflict() {
    let app = setup();
    let admin = app.admin_token().await;

    let first = app
        .create_post(&admin, json!({ "title": "Hello World", "content": "One" }))
        .await;
    assert_eq!(first["slug"], "hello-world");
    assert_eq!(first["status"], "draft");
    assert_eq!(first["author"]["username"], "admin");

    let second = app
        .create_post(&admin, json!({ "title": "Hello World", "content": "Two" }))
        .await;
    let slug = second["slug"].as_str().unwrap();
    assert!(slug.starts_with("hello-world-"), "{slug}");
    assert_eq!(slug.len(), "hello-world-".len() + 14);

    // Same title twice more, most likely within the same second.
    let third = app
        .create_post(&admin, json!({ "title": "Hello World", "content": "Three" }))
        .await;
    let fourth = app
        .create_post(&admin, json!({ "title": "Hello World", "content": "Four" }))
        .await;
    let slugs = [slug, third["slug"].as_str().unwrap(), fourth["slug"].as_str().unwrap()];
    assert_ne!(slugs[0], slugs[1]);
    assert_ne!(slugs[1], slugs[2]);
    assert_ne!(slugs[0], slugs[2]);
    assert!(slugs.iter().all(|s| s.starts_with("hello-world-")));

    let (status, _) = app
        .post(
            "/api/posts",
            Some(&admin),
            json!({ "title": "Bad", "content": "x", "status": "archived" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/api/posts", Some(&admin), json!({ "title": "  ", "content": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_drafts_hidden_from_public() {
    let app = setup();
    let admin = app.admin_token().await;
    let (_, alice) = app.register("alice").await;

    let draft = app
        .create_post(&admin, json!({ "title": "Secret", "content": "x" }))
        .await["id"]
        .as_i64()
        .unwrap();
    app.published_post(&admin, "Public").await;

    let uri = format!("/api/posts/{draft}");
    let (status, _) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get(&uri, Some(&alice)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get(&uri, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.get("/api/posts", None).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["posts"][0]["title"], "Public");

    let (_, body) = app.get("/api/posts?status=draft", Some(&admin)).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["posts"][0]["title"], "Secret");

    let like = format!("/api/posts/{draft}/like");
    let (status, body) = app.post(&like, Some(&alice), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
    assert_eq!(
        app.count("SELECT like_count FROM posts WHERE id = ?1", draft),
        0
    );
    let (status, body) = app.post(&like, Some(&admin), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["like_count"], 1);
}

#[tokio::test]
async fn test_post_detail_counts_views_and_likes() {
    let app = setup();
    let admin = app.admin_token().await;
    let (_, alice) = app.register("alice").await;
    let id = app.published_post(&admin, "Counted").await;
    let uri = format!("/api/posts/{id}");

    let (_, body) = app.get(&uri, None).await;
    assert_eq!(body["data"]["view_count"], 1);
    assert!(body["data"]["comments"].is_array());
    let (_, body) = app.get(&uri, None).await;
    assert_eq!(body["data"]["view_count"], 2);

    let like = format!("/api/posts/{id}/like");
    let (status, _) = app.post(&like, None, json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = app.post(&like, Some(&alice), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["like_count"], 1);
    let (_, body) = app.post(&like, Some(&admin), json!({})).await;
    assert_eq!(body["data"]["like_count"], 2);

    let (status, _) = app.post("/api/posts/9999/like", Some(&alice), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pagination_defaults_when_absent_or_invalid() {
    let app = setup();
    let admin = app.admin_token().await;
    for i in 0..12 {
        app.published_post(&admin, &format!("Post {i}")).await;
    }

    for uri in ["/api/posts", "/api/posts?page=abc&page_size=-3", "/api/posts?page=0"] {
        let (status, body) = app.get(uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        assert_eq!(data["page"], 1, "{uri}");
        assert_eq!(data["page_size"], 10, "{uri}");
        assert_eq!(data["total"], 12);
        assert_eq!(data["total_page"], 2);
        assert_eq!(data["posts"].as_array().unwrap().len(), 10);
    }

    let (_, body) = app.get("/api/posts?page=2&page_size=10", None).await;
    assert_eq!(body["data"]["posts"].as_array().unwrap().len(), 2);

    let (_, body) = app.get("/api/posts?page_size=1000", None).await;
    assert_eq!(body["data"]["page_size"], 100);
}

#[tokio::test]
async fn test_search_matches_title_and_content() {
    let app = setup();
    let admin = app.admin_token().await;
    app.published_post(&admin, "Learning Rust").await;
    app.create_post(
        &admin,
        json!({ "title": "Other", "content": "all about RUST", "status": "published" }),
    )
    .await;
    app.published_post(&admin, "Gardening").await;

    let (status, body) = app.get("/api/posts/search?q=rust", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);

    let (_, body) = app.get("/api/posts/search?keyword=garden", None).await;
    assert_eq!(body["data"]["total"], 1);

    let (status, _) = app.get("/api/posts/search", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_folds_unicode_and_treats_wildcards_literally() {
    let app = setup();
    let admin = app.admin_token().await;
    app.published_post(&admin, "Élan vital").await;
    app.published_post(&admin, "100% Rust").await;
    app.published_post(&admin, "Gardening").await;
    app.published_post(&admin, "Cooking").await;

    // "Élan", "élan" and "ÉLAN", percent-encoded.
    for q in ["%C3%89lan", "%C3%A9lan", "%C3%89LAN"] {
        let (status, body) = app.get(&format!("/api/posts/search?q={q}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 1, "q={q}");
        assert_eq!(body["data"]["posts"][0]["title"], "Élan vital");
    }

    let (_, body) = app.get("/api/posts/search?q=%25", None).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["posts"][0]["title"], "100% Rust");

    let (_, body) = app.get("/api/posts/search?q=_", None).await;
    assert_eq!(body["data"]["total"], 0);

    let (_, body) = app.get("/api/posts/search?q=100_", None).await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn test_only_author_or_admin_may_modify_post() {
    let app = setup();
    let admin = app.admin_token().await;
    let (_, alice) = app.register("alice").await;
    let id = app.published_post(&admin, "Owned").await;
    let uri = format!("/api/posts/{id}");

    let (status, body) = app.put(&uri, Some(&alice), json!({ "title": "Hijacked" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 403);
    let (status, _) = app.delete(&uri, Some(&alice)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.put(&uri, Some(&admin), json!({ "title": "Renamed" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Renamed");
    assert_eq!(body["data"]["slug"], "renamed");
}

#[tokio::test]
async fn test_post_update_replaces_associations() {
    let app = setup();
    let admin = app.admin_token().await;
    let (_, rust) = app
        .post("/api/categories", Some(&admin), json!({ "name": "Rust" }))
        .await;
    let (_, web) = app
        .post("/api/categories", Some(&admin), json!({ "name": "Web" }))
        .await;
    let rust = rust["data"]["id"].as_i64().unwrap();
    let web = web["data"]["id"].as_i64().unwrap();

    let post = app
        .create_post(
            &admin,
            json!({ "title": "Tagged", "content": "x", "categories": [rust] }),
        )
        .await;
    let uri = format!("/api/posts/{}", post["id"]);
    assert_eq!(post["categories"][0]["name"], "Rust");

    let (_, body) = app.put(&uri, Some(&admin), json!({ "categories": [web] })).await;
    let names: Vec<&str> = body["data"]["categories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Web"]);

    let (_, body) = app.put(&uri, Some(&admin), json!({ "content": "y" })).await;
    assert_eq!(body["data"]["categories"].as_array().unwrap().len(), 1);

    let (_, body) = app.put(&uri, Some(&admin), json!({ "categories": [] })).await;
    assert!(body["data"]["categories"].as_array().unwrap().is_empty());

    let (status, _) = app.put(&uri, Some(&admin), json!({ "categories": [9999] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_post_update_leaves_post_unchanged() {
    let app = setup();
    let admin = app.admin_token().await;
    let (_, rust) = app
        .post("/api/categories", Some(&admin), json!({ "name": "Rust" }))
        .await;
    let (_, web) = app
        .post("/api/categories", Some(&admin), json!({ "name": "Web" }))
        .await;
    let post = app
        .create_post(
            &admin,
            json!({ "title": "T", "content": "x", "categories": [rust["data"]["id"]] }),
        )
        .await;
    let uri = format!("/api/posts/{}", post["id"]);

    // Categories are valid and applied first; the unknown tag fails the write.
    let (status, body) = app
        .put(
            &uri,
            Some(&admin),
            json!({ "title": "New", "categories": [web["data"]["id"]], "tags": [9999] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (_, body) = app.get(&uri, Some(&admin)).await;
    assert_eq!(body["data"]["title"], "T");
    assert_eq!(body["data"]["slug"], "t");
    let categories = body["data"]["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0]["name"], "Rust");
}

#[tokio::test]
async fn test_post_delete_clears_associations_and_comments() {
    let app = setup();
    let admin = app.admin_token().await;
    let (_, alice) = app.register("alice").await;
    let (_, category) = app
        .post("/api/categories", Some(&admin), json!({ "name": "News" }))
        .await;
    let (_, tag) = app.post("/api/tags", Some(&admin), json!({ "name": "daily" })).await;

    let post = app
        .create_post(
            &admin,
            json!({
                "title": "Doomed",
                "content": "x",
                "status": "published",
                "categories": [category["data"]["id"]],
                "tags": [tag["data"]["id"]],
            }),
        )
        .await;
    let id = post["id"].as_i64().unwrap();
    app.post(
        &format!("/api/comments/post/{id}"),
        Some(&alice),
        json!({ "content": "first" }),
    )
    .await;

    let (status, _) = app.delete(&format!("/api/posts/{id}"), Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get(&format!("/api/posts/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        app.count("SELECT COUNT(*) FROM post_categories WHERE post_id = ?1", id),
        0
    );
    assert_eq!(app.count("SELECT COUNT(*) FROM post_tags WHERE post_id = ?1", id), 0);
    assert_eq!(
        app.count(
            "SELECT COUNT(*) FROM comments WHERE post_id = ?1 AND deleted_at IS NULL",
            id
        ),
        0
    );

    let (_, body) = app.get("/api/categories/hot", None).await;
    assert_eq!(body["data"][0]["post_count"], 0);
}

#[tokio::test]
async fn test_failed_post_delete_keeps_associations_and_comments() {
    let app = setup();
    let admin = app.admin_token().await;
    let (_, alice) = app.register("alice").await;
    let (_, category) = app
        .post("/api/categories", Some(&admin), json!({ "name": "News" }))
        .await;
    let (_, tag) = app.post("/api/tags", Some(&admin), json!({ "name": "daily" })).await;

    let post = app
        .create_post(
            &admin,
            json!({
                "title": "Sticky",
                "content": "x",
                "status": "published",
                "categories": [category["data"]["id"]],
                "tags": [tag["data"]["id"]],
            }),
        )
        .await;
    let id = post["id"].as_i64().unwrap();
    app.post(
        &format!("/api/comments/post/{id}"),
        Some(&alice),
        json!({ "content": "first" }),
    )
    .await;

    // The post row itself refuses the soft delete, after the join rows and
    // comments have already been touched.
    app.exec(
        "CREATE TRIGGER refuse_post_delete BEFORE UPDATE OF deleted_at ON posts
         BEGIN SELECT RAISE(ABORT, 'post delete refused'); END;",
    );

    let (status, body) = app.delete(&format!("/api/posts/{id}"), Some(&admin)).await;
    assert_ne!(status, StatusCode::OK);
    assert_ne!(body["code"], 200);

    let (status, _) = app.get(&format!("/api/posts/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.count("SELECT COUNT(*) FROM post_categories WHERE post_id = ?1", id),
        1
    );
    assert_eq!(app.count("SELECT COUNT(*) FROM post_tags WHERE post_id = ?1", id), 1);
    assert_eq!(
        app.count(
            "SELECT COUNT(*) FROM comments WHERE post_id = ?1 AND deleted_at IS NULL",
            id
        ),
        1
    );
}

// ============================================================================
// CATEGORIES & TAGS
// ============================================================================

#[tokio::test]
async fn test_category_crud() {
    let app = setup();
    let admin = app.admin_token().await;
    let (_, alice) = app.register("alice").await;

    let (status, _) = app
        .post("/api/categories", Some(&alice), json!({ "name": "Nope" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(
            "/api/categories",
            Some(&admin),
            json!({ "name": "Systems Programming", "description": "Low level" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["slug"], "systems-programming");
    let id = body["data"]["id"].as_i64().unwrap();
    let uri = format!("/api/categories/{id}");

    let (status, _) = app
        .post("/api/categories", Some(&admin), json!({ "name": "Systems Programming" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.put(&uri, Some(&admin), json!({ "name": "Systems" })).await;
    assert_eq!(body["data"]["name"], "Systems");
    assert_eq!(body["data"]["slug"], "systems");
    assert_eq!(body["data"]["description"], "Low level");

    let (status, body) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Systems");

    let (status, _) = app.delete(&uri, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Category not found");
}

#[tokio::test]
async fn test_hot_tags_rank_by_live_posts() {
    let app = setup();
    let admin = app.admin_token().await;
    let (_, busy) = app.post("/api/tags", Some(&admin), json!({ "name": "busy" })).await;
    let (_, quiet) = app.post("/api/tags", Some(&admin), json!({ "name": "quiet" })).await;
    let busy = busy["data"]["id"].as_i64().unwrap();
    let quiet = quiet["data"]["id"].as_i64().unwrap();

    for title in ["A", "B"] {
        app.create_post(
            &admin,
            json!({ "title": title, "content": "x", "status": "published", "tags": [busy] }),
        )
        .await;
    }
    app.create_post(
        &admin,
        json!({ "title": "C", "content": "x", "status": "published", "tags": [quiet] }),
    )
    .await;

    let (_, body) = app.get("/api/tags/hot", None).await;
    assert_eq!(body["data"][0]["name"], "busy");
    assert_eq!(body["data"][0]["post_count"], 2);
    assert_eq!(body["data"][1]["post_count"], 1);

    let (_, body) = app.get(&format!("/api/posts?tag_id={busy}"), None).await;
    assert_eq!(body["data"]["total"], 2);
}

// ============================================================================
// COMMENTS
// ============================================================================

#[tokio::test]
async fn test_user_comments_start_pending_admin_comments_approved() {
    let app = setup();
    let admin = app.admin_token().await;
    let (_, alice) = app.register("alice").await;
    let id = app.published_post(&admin, "Discuss").await;
    let uri = format!("/api/comments/post/{id}");

    let (status, body) = app.post(&uri, Some(&alice), json!({ "content": "Nice" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "pending");
    let pending_id = body["data"]["id"].as_i64().unwrap();

    let (_, body) = app.post(&uri, Some(&admin), json!({ "content": "Thanks" })).await;
    assert_eq!(body["data"]["status"], "approved");

    let (_, body) = app.get(&uri, None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = app.get("/api/admin/comments/pending", Some(&alice)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, body) = app.get("/api/admin/comments/pending", Some(&admin)).await;
    assert_eq!(body["data"][0]["id"], pending_id);

    let approve = format!("/api/admin/comments/{pending_id}/approve");
    let (status, body) = app.put(&approve, Some(&admin), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "approved");
    let (status, _) = app.put(&approve, Some(&admin), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.get(&uri, None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let reject = format!("/api/admin/comments/{pending_id}/reject");
    let (status, _) = app.put(&reject, Some(&admin), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.get(&uri, None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reply_parent_must_be_on_same_post() {
    let app = setup();
    let admin = app.admin_token().await;
    let (_, alice) = app.register("alice").await;
    let first = app.published_post(&admin, "First").await;
    let second = app.published_post(&admin, "Second").await;

    let (_, body) = app
        .post(
            &format!("/api/comments/post/{first}"),
            Some(&admin),
            json!({ "content": "root" }),
        )
        .await;
    let root = body["data"]["id"].as_i64().unwrap();

    let (status, _) = app
        .post(
            &format!("/api/comments/post/{second}"),
            Some(&alice),
            json!({ "content": "wrong post", "parent_id": root }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            &format!("/api/comments/post/{first}"),
            Some(&admin),
            json!({ "content": "reply", "parent_id": root }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = app.get(&format!("/api/comments/post/{first}"), None).await;
    assert_eq!(body["data"][0]["replies"][0]["content"], "reply");
}

#[tokio::test]
async fn test_only_author_or_admin_may_delete_comment() {
    let app = setup();
    let admin = app.admin_token().await;
    let (_, alice) = app.register("alice").await;
    let (_, bob) = app.register("bob").await;
    let id = app.published_post(&admin, "Thread").await;

    let (_, body) = app
        .post(
            &format!("/api/comments/post/{id}"),
            Some(&alice),
            json!({ "content": "mine" }),
        )
        .await;
    let uri = format!("/api/comments/{}", body["data"]["id"]);

    let (status, _) = app.delete(&uri, Some(&bob)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.delete(&uri, Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.delete(&uri, Some(&alice)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// HOME, ARCHIVE, ENVELOPE
// ============================================================================

#[tokio::test]
async fn test_home_and_archive() {
    let app = setup();
    let admin = app.admin_token().await;
    for title in ["One", "Two", "Three"] {
        app.published_post(&admin, title).await;
    }
    app.create_post(&admin, json!({ "title": "Draft", "content": "x" }))
        .await;

    let (status, body) = app.get("/api/home", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["latest_posts"].as_array().unwrap().len(), 3);
    assert_eq!(body["data"]["hot_posts"].as_array().unwrap().len(), 3);
    assert!(body["data"]["hot_categories"].is_array());
    assert!(body["data"]["hot_tags"].is_array());

    let (status, body) = app.get("/api/archive", None).await;
    assert_eq!(status, StatusCode::OK);
    let months = body["data"].as_array().unwrap();
    assert_eq!(months.len(), 1);
    assert_eq!(months[0]["year_month"].as_str().unwrap().len(), 7);
    assert_eq!(months[0]["posts"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_error_envelopes() {
    let app = setup();
    let admin = app.admin_token().await;

    let (status, body) = app.get("/api/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);

    let (status, body) = app.get("/api/posts/not-a-number", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (status, body) = app.delete("/api/posts", Some(&admin)).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["code"], 405);

    let (status, body) = app.get("/api/users?page=1&page=2", Some(&admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert!(body["error"].is_string());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/posts")
        .header(header::AUTHORIZATION, format!("Bearer {admin}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], 400);
    assert!(body["error"].is_string());
}

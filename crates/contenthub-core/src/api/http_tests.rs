//! Client behaviour against a mock backend.

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use super::client::MAX_RATE_LIMIT_RETRIES;
use super::{ApiClient, ApiError, ClientOptions};
use crate::auth::session::sample_session;
use crate::auth::{MemoryTokenStore, SessionEvent, TokenStore};
use crate::models::{PostDraft, PostQuery, PostStatus};

fn client_for(server: &MockServer, store: Arc<MemoryTokenStore>) -> ApiClient {
    ApiClient::new(server.url("/api/v1"), store).unwrap()
}

/// Client whose 429 backoff starts at a few milliseconds.
fn fast_backoff_client(server: &MockServer, store: Arc<MemoryTokenStore>) -> ApiClient {
    let options = ClientOptions {
        initial_backoff: Duration::from_millis(5),
        ..ClientOptions::with_base_url(server.url("/api/v1"))
    };
    ApiClient::with_options(options, store).unwrap()
}

fn page_json(ids: &[&str], has_more: bool) -> serde_json::Value {
    let posts: Vec<_> = ids
        .iter()
        .map(|id| json!({"id": id, "title": format!("Post {}", id), "content": "..."}))
        .collect();
    json!({
        "message": "Posts fetched successfully.",
        "data": {"posts": posts, "cursor": if has_more { json!("Y3Vyc29y") } else { json!(null) }, "hasMore": has_more},
        "status": 200,
        "success": true,
        "dateTime": "2025-03-01T10:00:00"
    })
}

// ── Login and bearer auth ─────────────────────────────────────────────

#[tokio::test]
async fn test_login_stores_tokens_and_profile_uses_bearer() {
    let server = MockServer::start_async().await;

    let login = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/auth/login")
                .json_body(json!({"email": "ada@example.com", "password": "s3cret!"}));
            then.status(200).json_body(json!({
                "token": "acc-1",
                "issuedAt": 1735689600000_i64,
                "expiresAt": 1735690500000_i64,
                "refreshToken": "ref-1",
                "refExpiry": 1736294400000_i64
            }));
        })
        .await;

    let profile = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/user")
                .header("Authorization", "Bearer acc-1");
            then.status(200).json_body(json!({
                "message": "ok",
                "data": {"id": "u1", "name": "Ada", "email": "ada@example.com"},
                "status": 200,
                "success": true
            }));
        })
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    let client = client_for(&server, store.clone());
    let mut events = client.subscribe();

    let session = client.login("ada@example.com", "s3cret!").await.unwrap();
    assert_eq!(session.access_token, "acc-1");
    assert_eq!(store.load().unwrap().unwrap().refresh_token, "ref-1");
    assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedIn);

    let user = client.get_user_profile().await.unwrap();
    assert_eq!(user.name, "Ada");

    login.assert_async().await;
    profile.assert_async().await;
}

#[tokio::test]
async fn test_bad_credentials_do_not_trigger_refresh() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/auth/login");
            then.status(401)
                .json_body(json!({"message": "Invalid email or password.", "status": 401}));
        })
        .await;
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/auth/refresh-token");
            then.status(200);
        })
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    let client = client_for(&server, store);

    let err = client.login("ada@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert_eq!(err.message(), "Invalid email or password.");
    refresh.assert_hits_async(0).await;
}

// ── Transparent refresh ───────────────────────────────────────────────

#[tokio::test]
async fn test_expired_token_is_refreshed_and_request_retried() {
    let server = MockServer::start_async().await;

    let stale = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/posts")
                .header("Authorization", "Bearer old");
            then.status(401)
                .json_body(json!({"message": "JWT expired", "status": 401}));
        })
        .await;

    let refresh = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/auth/refresh-token")
                .header_missing("Authorization")
                .json_body(json!({"refreshToken": "ref-1"}));
            then.status(200).json_body(json!({
                "refreshToken": "ref-2",
                "accessToken": "new",
                "refreshExpTime": "2030-01-08T00:00:00Z",
                "accessExpTime": "2030-01-01T00:15:00Z"
            }));
        })
        .await;

    let fresh = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/posts")
                .query_param("pageSize", "10")
                .header("Authorization", "Bearer new");
            then.status(200).json_body(page_json(&["p1", "p2"], true));
        })
        .await;

    let store = Arc::new(MemoryTokenStore::with_session(sample_session("old", "ref-1")));
    let client = client_for(&server, store.clone());
    let mut events = client.subscribe();

    let query = PostQuery {
        page_size: Some(10),
        ..Default::default()
    };
    let page = client.get_posts(&query).await.unwrap();

    assert_eq!(page.posts.len(), 2);
    assert!(page.has_more);
    stale.assert_hits_async(1).await;
    refresh.assert_hits_async(1).await;
    fresh.assert_hits_async(1).await;

    let stored = store.load().unwrap().unwrap();
    assert_eq!(stored.access_token, "new");
    assert_eq!(stored.refresh_token, "ref-2");
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Refreshed);
}

#[tokio::test]
async fn test_concurrent_unauthorized_requests_share_one_refresh() {
    let server = MockServer::start_async().await;

    let stale = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/posts/drafts")
                .header("Authorization", "Bearer old");
            then.status(401);
        })
        .await;

    let refresh = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/auth/refresh-token")
                .header_missing("Authorization");
            then.status(200)
                .delay(Duration::from_millis(300))
                .json_body(json!({"refreshToken": "ref-2", "accessToken": "new"}));
        })
        .await;

    let fresh = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/posts/drafts")
                .header("Authorization", "Bearer new");
            then.status(200).json_body(json!({
                "message": "drafts posts fetched successfully.",
                "data": [{"id": "d1", "title": "Draft", "postStatus": "DRAFT"}],
                "status": 200,
                "success": true
            }));
        })
        .await;

    let store = Arc::new(MemoryTokenStore::with_session(sample_session("old", "ref-1")));
    let client = client_for(&server, store);

    let calls = (0..5).map(|_| client.get_drafts());
    let results = futures::future::join_all(calls).await;

    for result in results {
        let drafts = result.unwrap();
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].is_draft());
    }
    refresh.assert_hits_async(1).await;
    fresh.assert_hits_async(5).await;
    assert!(stale.hits_async().await >= 1);
}

#[tokio::test]
async fn test_failed_refresh_rejects_all_and_clears_tokens() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/posts/user");
            then.status(401);
        })
        .await;

    let refresh = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/auth/refresh-token");
            then.status(401)
                .delay(Duration::from_millis(200))
                .json_body(json!({"message": "refresh Token is expired", "status": 401}));
        })
        .await;

    let store = Arc::new(MemoryTokenStore::with_session(sample_session("old", "ref-1")));
    let client = client_for(&server, store.clone());
    let mut events = client.subscribe();

    let calls = (0..3).map(|_| client.get_user_posts());
    let results = futures::future::join_all(calls).await;

    for result in results {
        let err = result.unwrap_err();
        assert!(err.is_session_ended(), "unexpected error: {err}");
    }
    refresh.assert_hits_async(1).await;
    assert!(store.load().unwrap().is_none());
    assert!(!client.is_authenticated());
    assert!(matches!(events.recv().await.unwrap(), SessionEvent::Ended { .. }));
}

#[tokio::test]
async fn test_missing_refresh_token_ends_session_without_network() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/posts/drafts");
            then.status(401);
        })
        .await;
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/auth/refresh-token");
            then.status(200);
        })
        .await;

    let client = client_for(&server, Arc::new(MemoryTokenStore::new()));

    let err = client.get_drafts().await.unwrap_err();
    assert!(err.is_session_ended());
    refresh.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_second_unauthorized_is_surfaced() {
    let server = MockServer::start_async().await;

    let posts = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/posts/featured");
            then.status(401)
                .json_body(json!({"message": "Full authentication is required", "status": 401}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/auth/refresh-token");
            then.status(200)
                .json_body(json!({"refreshToken": "ref-2", "accessToken": "new"}));
        })
        .await;

    let store = Arc::new(MemoryTokenStore::with_session(sample_session("old", "ref-1")));
    let client = client_for(&server, store.clone());

    let err = client.get_featured_posts().await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { .. }));
    posts.assert_hits_async(2).await;
    // The refresh itself worked, so the session survives.
    assert_eq!(store.load().unwrap().unwrap().access_token, "new");
}

#[tokio::test]
async fn test_near_expiry_session_is_refreshed_early() {
    let server = MockServer::start_async().await;

    let refresh = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/auth/refresh-token")
                .json_body(json!({"refreshToken": "ref-1"}));
            then.status(200).json_body(json!({
                "refreshToken": "ref-2",
                "accessToken": "new",
                "accessExpTime": "2030-01-01T00:15:00Z"
            }));
        })
        .await;

    let mut session = sample_session("old", "ref-1");
    session.expires_at = chrono::Utc::now() + chrono::Duration::minutes(2);
    let store = Arc::new(MemoryTokenStore::with_session(session));
    let client = client_for(&server, store.clone());

    assert!(client.refresh_if_needed().await.unwrap());
    refresh.assert_hits_async(1).await;
    assert_eq!(store.load().unwrap().unwrap().access_token, "new");

    // The rotated token is good until 2030, so nothing more happens.
    assert!(!client.refresh_if_needed().await.unwrap());
    refresh.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_fresh_or_missing_session_is_not_refreshed_early() {
    let server = MockServer::start_async().await;
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/auth/refresh-token");
            then.status(200);
        })
        .await;

    let signed_in = client_for(
        &server,
        Arc::new(MemoryTokenStore::with_session(sample_session("acc", "ref"))),
    );
    assert!(!signed_in.refresh_if_needed().await.unwrap());

    let signed_out = client_for(&server, Arc::new(MemoryTokenStore::new()));
    assert!(!signed_out.refresh_if_needed().await.unwrap());

    refresh.assert_hits_async(0).await;
}

// ── Rate limiting ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_persistent_rate_limit_gives_up_after_retries() {
    let server = MockServer::start_async().await;

    let trending = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/posts/trending");
            then.status(429).body("slow down");
        })
        .await;

    let client = fast_backoff_client(&server, Arc::new(MemoryTokenStore::new()));

    let started = std::time::Instant::now();
    let err = client.get_trending_posts().await.unwrap_err();

    assert!(matches!(err, ApiError::RateLimited));
    trending
        .assert_hits_async(MAX_RATE_LIMIT_RETRIES as usize + 1)
        .await;
    // 5 + 10 + 20 ms of doubling backoff
    assert!(started.elapsed() >= Duration::from_millis(35));
}

#[tokio::test]
async fn test_rate_limit_after_refresh_keeps_new_token() {
    let server = MockServer::start_async().await;

    let stale = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/posts/drafts")
                .header("Authorization", "Bearer old");
            then.status(401);
        })
        .await;
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/auth/refresh-token");
            then.status(200)
                .json_body(json!({"refreshToken": "ref-2", "accessToken": "new"}));
        })
        .await;
    let limited = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/posts/drafts")
                .header("Authorization", "Bearer new");
            then.status(429);
        })
        .await;

    let store = Arc::new(MemoryTokenStore::with_session(sample_session("old", "ref-1")));
    let client = fast_backoff_client(&server, store.clone());

    let err = client.get_drafts().await.unwrap_err();

    assert!(matches!(err, ApiError::RateLimited));
    stale.assert_hits_async(1).await;
    refresh.assert_hits_async(1).await;
    limited
        .assert_hits_async(MAX_RATE_LIMIT_RETRIES as usize + 1)
        .await;
    assert_eq!(store.load().unwrap().unwrap().access_token, "new");
}

// ── Errors and writes ─────────────────────────────────────────────────

#[tokio::test]
async fn test_validation_errors_surface_as_field_map() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/categories")
                .json_body(json!({"name": "x"}));
            then.status(400).json_body(json!({
                "message": "Validation error.",
                "status": 400,
                "errors": {"name": "size should be in range of 2 to 50 character."}
            }));
        })
        .await;

    let store = Arc::new(MemoryTokenStore::with_session(sample_session("acc", "ref")));
    let client = client_for(&server, store);

    let err = client.create_category(" x ").await.unwrap_err();
    assert_eq!(err.status(), 400);
    assert_eq!(err.message(), "Validation error.");
    assert!(err.validation_errors().contains_key("name"));
}

#[tokio::test]
async fn test_create_post_sends_multipart_form() {
    let server = MockServer::start_async().await;

    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/posts")
                .header("Authorization", "Bearer acc")
                .header_exists("Content-Type");
            then.status(201).json_body(json!({
                "message": "Post created successfully.",
                "data": {
                    "id": "p9",
                    "title": "Writing a token refresher",
                    "content": "Twenty characters at the very least.",
                    "category": {"id": "c1", "name": "Rust"},
                    "tags": [],
                    "postStatus": "PUBLISHED"
                },
                "status": 201,
                "success": true
            }));
        })
        .await;

    let store = Arc::new(MemoryTokenStore::with_session(sample_session("acc", "ref")));
    let client = client_for(&server, store);

    let draft = PostDraft {
        title: "Writing a token refresher".into(),
        content: "Twenty characters at the very least.".into(),
        category_id: "c1".into(),
        tag_ids: vec![],
        status: PostStatus::Published,
    };
    let cover = crate::models::CoverImage::from_bytes("cover.png", vec![0x89, b'P', b'N', b'G']);
    let post = client.create_post(&draft, Some(cover)).await.unwrap();

    assert_eq!(post.id, "p9");
    assert_eq!(post.status, Some(PostStatus::Published));
    create.assert_async().await;
}

#[tokio::test]
async fn test_bare_tag_list_and_empty_delete() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/tags")
                .json_body(json!({"names": ["rust", "tokio"]}));
            then.status(201)
                .json_body(json!([{"id": "t1", "name": "rust"}, {"id": "t2", "name": "tokio"}]));
        })
        .await;
    let delete = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/api/v1/tags/t1");
            then.status(204);
        })
        .await;

    let store = Arc::new(MemoryTokenStore::with_session(sample_session("acc", "ref")));
    let client = client_for(&server, store);

    let tags = client.create_tags(&["rust", " tokio ", "Rust"]).await.unwrap();
    assert_eq!(tags.len(), 2);
    client.delete_tag("t1").await.unwrap();
    delete.assert_async().await;
}

#[tokio::test]
async fn test_logout_clears_session_even_if_server_fails() {
    let server = MockServer::start_async().await;

    let logout = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/auth/logout")
                .header("Authorization", "Bearer acc");
            then.status(500).body("boom");
        })
        .await;

    let store = Arc::new(MemoryTokenStore::with_session(sample_session("acc", "ref")));
    let client = client_for(&server, store.clone());
    let mut events = client.subscribe();

    client.logout().await.unwrap();

    logout.assert_async().await;
    assert!(store.load().unwrap().is_none());
    assert!(!client.is_authenticated());
    assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);
}

#[tokio::test]
async fn test_empty_comment_rejected_locally() {
    let server = MockServer::start_async().await;
    let client = client_for(&server, Arc::new(MemoryTokenStore::new()));

    let err = client.create_comment("p1", "   ").await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));
}

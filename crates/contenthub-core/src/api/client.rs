//! API client for communicating with the ContentHub REST API.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! requests for posts, categories, tags, comments and the user profile.

use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::auth::{SessionData, SessionEvent, TokenStore};
use crate::models::{
    Category, CategoryRequest, Comment, CoverImage, CreateCommentRequest, CreateTagsRequest,
    LoginRequest, LoginResponse, LogoutResponse, Payload, Post, PostDraft, PostPage, PostQuery,
    PostUpdate, RefreshTokenRequest, RefreshTokenResponse, RegisterRequest, RegisterResponse,
    Tag, UserProfile,
};

use super::refresh::TokenManager;
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default API root, matching the backend's development profile.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api/v1";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Upper bound on a refresh cycle. Queued requests wait at most this long.
const REFRESH_TIMEOUT_SECS: u64 = 15;

/// Maximum number of retries for rate-limited (429) requests.
pub(crate) const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

const AUTH_PREFIX: &str = "/auth/";
const LOGIN_PATH: &str = "/auth/login";
const REGISTER_PATH: &str = "/auth/register";
const REFRESH_PATH: &str = "/auth/refresh-token";
const LOGOUT_PATH: &str = "/auth/logout";

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub request_timeout: Duration,
    pub refresh_timeout: Duration,
    /// First delay after a 429; doubled on each further retry.
    pub initial_backoff: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            refresh_timeout: Duration::from_secs(REFRESH_TIMEOUT_SECS),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }
}

impl ClientOptions {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone)]
enum Body {
    Empty,
    Json(serde_json::Value),
    /// Post form: a JSON `post` part plus an optional `file` part.
    Multipart {
        post: serde_json::Value,
        cover: Option<CoverImage>,
    },
}

/// Everything needed to (re)build one HTTP request. Kept separate from
/// `reqwest::RequestBuilder` because a retry after refresh has to send the
/// same request again and multipart forms are single-use.
#[derive(Debug, Clone)]
struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Body,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
        }
    }

    fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("{} {}: {}", self.method, self.path, e)))?;
        self.body = Body::Json(value);
        Ok(self)
    }

    fn multipart<B: Serialize>(mut self, post: &B, cover: Option<CoverImage>) -> Result<Self, ApiError> {
        let post = serde_json::to_value(post)
            .map_err(|e| ApiError::InvalidRequest(format!("{} {}: {}", self.method, self.path, e)))?;
        self.body = Body::Multipart { post, cover };
        Ok(self)
    }

    fn query_pairs(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    fn is_auth_endpoint(&self) -> bool {
        self.path.starts_with(AUTH_PREFIX)
    }

    fn is_refresh_endpoint(&self) -> bool {
        self.path == REFRESH_PATH
    }
}

// ============================================================================
// Client
// ============================================================================

/// API client for ContentHub.
///
/// Construct one at startup and clone it into whatever needs it. Clones share
/// the connection pool and the session, so a refresh triggered through one
/// clone is seen by all of them.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
    tokens: Arc<TokenManager>,
    initial_backoff: Duration,
}

impl ApiClient {
    /// Create a new API client with default timeouts
    pub fn new(base_url: impl Into<String>, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        Self::with_options(ClientOptions::with_base_url(base_url), store)
    }

    pub fn with_options(options: ClientOptions, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(options.request_timeout).build()?;
        let base_url: Arc<str> = options.base_url.trim_end_matches('/').into();
        debug!(base_url = %base_url, "API client created");

        Ok(Self {
            client,
            base_url,
            tokens: Arc::new(TokenManager::new(store, options.refresh_timeout)),
            initial_backoff: options.initial_backoff,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Listen for login, refresh, logout and forced session-end events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tokens.subscribe()
    }

    /// Snapshot of the current session, if any.
    pub fn session(&self) -> Option<SessionData> {
        self.tokens.session()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.session().is_some()
    }

    /// Rotate the session ahead of time when the access token is about to
    /// expire. Joins the same single-flight cycle as 401-triggered refreshes,
    /// so a failure ends the session. Returns whether a refresh happened.
    pub async fn refresh_if_needed(&self) -> Result<bool, ApiError> {
        let Some(session) = self.tokens.session() else {
            return Ok(false);
        };
        if !session.needs_refresh() {
            return Ok(false);
        }
        debug!(minutes_left = session.minutes_until_expiry(), "Access token near expiry, refreshing early");
        self.tokens
            .refresh_after_unauthorized(Some(&session.access_token), |refresh_token| {
                self.request_refresh(refresh_token)
            })
            .await?;
        Ok(true)
    }

    // ===== Request plumbing =====

    fn build(&self, request: &ApiRequest, token: Option<&str>) -> Result<RequestBuilder, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.clone(), &url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = token.filter(|_| !request.is_refresh_endpoint()) {
            builder = builder.bearer_auth(token);
        }

        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Multipart { post, cover } => {
                let post_part = Part::text(post.to_string()).mime_str("application/json")?;
                let mut form = Form::new().part("post", post_part);
                if let Some(cover) = cover {
                    let file_part = Part::bytes(cover.bytes.clone())
                        .file_name(cover.file_name.clone())
                        .mime_str(&cover.mime_type)?;
                    form = form.part("file", file_part);
                }
                builder.multipart(form)
            }
        };
        Ok(builder)
    }

    fn transport_error(error: reqwest::Error) -> ApiError {
        if error.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(error)
        }
    }

    /// Send a request, transparently handling one refresh-and-retry on 401
    /// and backing off on 429.
    async fn execute(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        let mut token = if request.is_refresh_endpoint() {
            None
        } else {
            self.tokens.access_token()
        };
        let mut retried = false;
        let mut rate_retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = self
                .build(request, token.as_deref())?
                .send()
                .await
                .map_err(Self::transport_error)?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::UNAUTHORIZED && !retried && !request.is_auth_endpoint() {
                retried = true;
                debug!(method = %request.method, path = %request.path, "Unauthorized, waiting for a fresh token");
                let fresh = self
                    .tokens
                    .refresh_after_unauthorized(token.as_deref(), |refresh_token| {
                        self.request_refresh(refresh_token)
                    })
                    .await?;
                token = Some(fresh);
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                rate_retries += 1;
                if rate_retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(path = %request.path, retry = rate_retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                tokio::time::sleep(backoff).await;
                backoff *= 2; // Exponential backoff
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
    }

    fn decode<T: DeserializeOwned>(request: &ApiRequest, text: &str) -> Result<T, ApiError> {
        serde_json::from_str(text).map_err(|e| {
            ApiError::InvalidResponse(format!("{} {}: {}", request.method, request.path, e))
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let response = self.execute(request).await?;
        let text = response.text().await.map_err(Self::transport_error)?;
        Self::decode(request, &text)
    }

    /// Send and unwrap the payload whether or not it is enveloped.
    async fn send_data<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        Ok(self.send::<Payload<T>>(request).await?.into_inner())
    }

    async fn send_empty(&self, request: &ApiRequest) -> Result<(), ApiError> {
        self.execute(request).await?;
        Ok(())
    }

    /// Exchange a refresh token for a rotated session. Only ever called by
    /// the task driving a refresh cycle, and sent directly rather than through
    /// `execute` so a rejected refresh can never start another cycle.
    async fn request_refresh(&self, refresh_token: String) -> Result<SessionData, ApiError> {
        let request = ApiRequest::post(REFRESH_PATH).json(&RefreshTokenRequest { refresh_token })?;
        let previous = self.tokens.session();

        let response = self
            .build(&request, None)?
            .send()
            .await
            .map_err(Self::transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(Self::transport_error)?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &text));
        }

        let payload: Payload<RefreshTokenResponse> = Self::decode(&request, &text)?;
        Ok(payload.into_inner().into_session(previous.as_ref()))
    }

    // ===== Auth =====

    /// Log in, store the issued tokens and announce `SessionEvent::LoggedIn`.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionData, ApiError> {
        let request = ApiRequest::post(LOGIN_PATH).json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        let response: LoginResponse = self.send_data(&request).await?;
        let session = response.into_session();
        self.tokens.establish(session.clone())?;
        info!("Login successful");
        Ok(session)
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterResponse, ApiError> {
        let request = ApiRequest::post(REGISTER_PATH).json(&RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        })?;
        self.send_data(&request).await
    }

    /// Revoke the refresh token server-side (best effort) and clear the
    /// local session. The local session is always cleared.
    pub async fn logout(&self) -> Result<(), ApiError> {
        if self.is_authenticated() {
            match self.send_data::<LogoutResponse>(&ApiRequest::post(LOGOUT_PATH)).await {
                Ok(response) => debug!(message = %response.message, "Server logout"),
                Err(e) => warn!(error = %e, "Server logout failed, clearing local session anyway"),
            }
        }
        self.tokens.end(SessionEvent::LoggedOut);
        info!("Logged out");
        Ok(())
    }

    pub async fn get_user_profile(&self) -> Result<UserProfile, ApiError> {
        self.send_data(&ApiRequest::get("/user")).await
    }

    // ===== Posts =====

    /// Fetch one page of the public feed
    pub async fn get_posts(&self, query: &PostQuery) -> Result<PostPage, ApiError> {
        let request = ApiRequest::get("/posts").query_pairs(query.to_query_pairs());
        self.send_data(&request).await
    }

    pub async fn get_post(&self, id: &str) -> Result<Post, ApiError> {
        self.send_data(&ApiRequest::get(format!("/posts/{}", id))).await
    }

    /// Drafts of the signed-in user
    pub async fn get_drafts(&self) -> Result<Vec<Post>, ApiError> {
        self.send_data(&ApiRequest::get("/posts/drafts")).await
    }

    /// Drafts and published posts of the signed-in user
    pub async fn get_user_posts(&self) -> Result<Vec<Post>, ApiError> {
        self.send_data(&ApiRequest::get("/posts/user")).await
    }

    pub async fn get_featured_posts(&self) -> Result<Vec<Post>, ApiError> {
        self.send_data(&ApiRequest::get("/posts/featured")).await
    }

    pub async fn get_trending_posts(&self) -> Result<Vec<Post>, ApiError> {
        self.send_data(&ApiRequest::get("/posts/trending")).await
    }

    pub async fn create_post(
        &self,
        draft: &PostDraft,
        cover: Option<CoverImage>,
    ) -> Result<Post, ApiError> {
        let request = ApiRequest::post("/posts").multipart(draft, cover)?;
        self.send_data(&request).await
    }

    pub async fn update_post(
        &self,
        update: &PostUpdate,
        cover: Option<CoverImage>,
        remove_cover: bool,
    ) -> Result<Post, ApiError> {
        let mut request = ApiRequest::put("/posts").multipart(update, cover)?;
        if remove_cover {
            request = request.query_pairs(vec![("removeCoverImage".to_string(), "true".to_string())]);
        }
        self.send_data(&request).await
    }

    pub async fn delete_post(&self, id: &str) -> Result<(), ApiError> {
        self.send_empty(&ApiRequest::delete(format!("/posts/{}", id))).await
    }

    // ===== Categories =====

    pub async fn get_categories(&self) -> Result<Vec<Category>, ApiError> {
        self.send_data(&ApiRequest::get("/categories")).await
    }

    pub async fn create_category(&self, name: &str) -> Result<Category, ApiError> {
        let request = ApiRequest::post("/categories").json(&CategoryRequest {
            id: None,
            name: name.trim().to_string(),
        })?;
        self.send_data(&request).await
    }

    pub async fn update_category(&self, id: &str, name: &str) -> Result<Category, ApiError> {
        let request = ApiRequest::put(format!("/categories/{}", id)).json(&CategoryRequest {
            id: Some(id.to_string()),
            name: name.trim().to_string(),
        })?;
        self.send_data(&request).await
    }

    pub async fn delete_category(&self, id: &str) -> Result<(), ApiError> {
        self.send_empty(&ApiRequest::delete(format!("/categories/{}", id))).await
    }

    // ===== Tags =====

    pub async fn get_tags(&self) -> Result<Vec<Tag>, ApiError> {
        self.send_data(&ApiRequest::get("/tags")).await
    }

    pub async fn create_tags<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Tag>, ApiError> {
        let body = CreateTagsRequest::new(names);
        if body.names.is_empty() {
            return Err(ApiError::InvalidRequest("no tag names given".to_string()));
        }
        let request = ApiRequest::post("/tags").json(&body)?;
        self.send_data(&request).await
    }

    pub async fn delete_tag(&self, id: &str) -> Result<(), ApiError> {
        self.send_empty(&ApiRequest::delete(format!("/tags/{}", id))).await
    }

    // ===== Comments =====

    pub async fn get_post_comments(&self, post_id: &str) -> Result<Vec<Comment>, ApiError> {
        self.send_data(&ApiRequest::get(format!("/posts/{}/comments", post_id))).await
    }

    pub async fn create_comment(&self, post_id: &str, content: &str) -> Result<Comment, ApiError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::InvalidRequest(
                "Comment content cannot be empty".to_string(),
            ));
        }
        let request = ApiRequest::post(format!("/posts/{}/comments", post_id))
            .json(&CreateCommentRequest {
                content: content.to_string(),
            })?;
        self.send_data(&request).await
    }

    pub async fn delete_comment(&self, comment_id: &str) -> Result<(), ApiError> {
        self.send_empty(&ApiRequest::delete(format!("/comments/{}", comment_id))).await
    }
}

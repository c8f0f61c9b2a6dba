//! Data models for ContentHub REST payloads.
//!
//! This module contains the structures exchanged with the backend:
//!
//! - `Envelope`, `Payload`: the `{message, data, status, ...}` wrapper
//! - `Post`, `PostPage`, `PostDraft`, `PostUpdate`, `PostQuery`
//! - `Category`, `Tag`: taxonomy used to browse posts
//! - `Comment`, `Author`
//! - `UserProfile`, `Role`
//! - Auth request/response bodies (`LoginRequest`, `LoginResponse`, ...)

pub mod auth;
pub mod comment;
pub mod envelope;
pub mod post;
pub mod taxonomy;
pub mod user;

pub use auth::{
    LoginRequest, LoginResponse, LogoutResponse, RefreshTokenRequest, RefreshTokenResponse,
    RegisterRequest, RegisterResponse,
};
pub use comment::{Author, Comment, CreateCommentRequest};
pub use envelope::{Envelope, Payload};
pub use post::{CoverImage, Post, PostDraft, PostPage, PostQuery, PostStatus, PostUpdate};
pub use taxonomy::{Category, CategoryRequest, CreateTagsRequest, Tag};
pub use user::{Role, UserProfile};

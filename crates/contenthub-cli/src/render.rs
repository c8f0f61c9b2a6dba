//! Plain-text rendering of API payloads.

use std::collections::BTreeMap;

use chrono::Utc;
use contenthub_core::models::{Category, Comment, Post, Tag, UserProfile};
use contenthub_core::utils::{excerpt, format_date, strip_html, truncate};
use contenthub_core::SessionData;

/// Width of the title column in list views
const TITLE_WIDTH: usize = 48;

/// Length of the plain-text preview under each feed entry
const EXCERPT_LEN: usize = 120;

pub fn post_line(post: &Post) -> String {
    let status = if post.is_draft() { " [draft]" } else { "" };
    format!(
        "{:<24}  {:<width$}  {} · {} · {}{}",
        post.id,
        truncate(&post.title, TITLE_WIDTH),
        post.category_name(),
        post.author_name(),
        format_date(post.created_at),
        status,
        width = TITLE_WIDTH,
    )
}

/// Feed entry: the list line plus an indented preview of the content.
pub fn feed_entry(post: &Post) -> String {
    let preview = excerpt(&post.content, EXCERPT_LEN);
    if preview.is_empty() {
        post_line(post)
    } else {
        format!("{}\n    {}", post_line(post), preview)
    }
}

pub fn post_detail(post: &Post) -> String {
    let mut out = String::new();
    out.push_str(&post.title);
    out.push('\n');
    out.push_str(&"=".repeat(post.title.chars().count().min(80)));
    out.push('\n');
    out.push_str(&format!(
        "{} · {} · {} · {}\n",
        post.author_name(),
        post.category_name(),
        format_date(post.created_at),
        post.reading_time_display()
    ));
    if let Some(status) = post.status {
        out.push_str(&format!("Status: {}\n", status.label()));
    }
    let tags = post.tag_names();
    if !tags.is_empty() {
        out.push_str(&format!("Tags: {}\n", tags.join(", ")));
    }
    if let Some(ref cover) = post.cover_image_url {
        out.push_str(&format!("Cover: {}\n", cover));
    }
    out.push('\n');
    out.push_str(&strip_html(&post.content));
    out.push('\n');
    out
}

pub fn comment_line(comment: &Comment) -> String {
    format!(
        "[{}] {} ({}): {}",
        comment.comment_id,
        comment.author_name(),
        format_date(comment.created_at),
        comment.content
    )
}

pub fn category_line(category: &Category) -> String {
    format!("{:<24}  {:<32}  {}", category.id, category.name, category.display_post_count())
}

pub fn tag_line(tag: &Tag) -> String {
    match tag.post_count {
        Some(count) => format!("{:<24}  #{} ({})", tag.id, tag.name, count),
        None => format!("{:<24}  #{}", tag.id, tag.name),
    }
}

pub fn profile(user: &UserProfile) -> String {
    let role = if user.is_admin() { "admin" } else { "user" };
    let mut out = format!("{} <{}>\nRole: {}\nID: {}\n", user.name, user.email, role, user.id);
    if let Some(joined) = user.created_at {
        out.push_str(&format!("Joined: {}\n", format_date(Some(joined))));
    }
    out
}

/// One line per rejected field, in field order.
pub fn field_errors(errors: &BTreeMap<String, String>) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("  {}: {}\n", field, message))
        .collect()
}

pub fn session_summary(session: Option<&SessionData>) -> String {
    let Some(session) = session else {
        return "Not signed in".to_string();
    };
    let access = if session.is_expired() {
        "access token expired".to_string()
    } else {
        format!("access token valid for {} min", session.minutes_until_expiry())
    };
    let refresh = match session.refresh_expires_at {
        Some(at) if at <= Utc::now() => "refresh token expired".to_string(),
        Some(at) => format!("refresh token valid until {}", at.format("%b %d, %Y %H:%M UTC")),
        None => "refresh token present".to_string(),
    };
    format!("Signed in ({}, {})", access, refresh)
}

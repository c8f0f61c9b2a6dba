use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::comment::Author;
use super::taxonomy::{Category, Tag};

/// Title length accepted by the backend (inclusive, in characters)
const TITLE_MIN: usize = 10;
const TITLE_MAX: usize = 200;

/// Content length accepted by the backend (inclusive, in characters)
const CONTENT_MIN: usize = 20;
const CONTENT_MAX: usize = 2000;

const MAX_TAGS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "UPPERCASE")]
pub enum PostStatus {
    Draft,
    Published,
}

impl PostStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PostStatus::Draft => "Draft",
            PostStatus::Published => "Published",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "coverImage")]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub reading_time: Option<u32>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,
    /// `/posts/user` reports this as `postStatus`.
    #[serde(default, alias = "postStatus")]
    pub status: Option<PostStatus>,
}

impl Post {
    pub fn is_draft(&self) -> bool {
        self.status == Some(PostStatus::Draft)
    }

    pub fn reading_time_display(&self) -> String {
        match self.reading_time {
            Some(minutes) if minutes > 0 => format!("{} min read", minutes),
            _ => "< 1 min read".to_string(),
        }
    }

    pub fn category_name(&self) -> &str {
        self.category.as_ref().map(|c| c.name.as_str()).unwrap_or("Uncategorized")
    }

    pub fn author_name(&self) -> &str {
        self.author.as_ref().map(|a| a.name.as_str()).unwrap_or("Unknown author")
    }

    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.name.as_str()).collect()
    }
}

/// One page of the cursor-paginated feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

/// Filters and paging for `GET /posts`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostQuery {
    pub page_size: Option<u32>,
    pub cursor: Option<String>,
    pub category_id: Option<String>,
    pub tag_id: Option<String>,
    pub author_id: Option<String>,
}

impl PostQuery {
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(size) = self.page_size {
            pairs.push(("pageSize".to_string(), size.to_string()));
        }
        let optional = [
            ("cursor", &self.cursor),
            ("categoryId", &self.category_id),
            ("tagId", &self.tag_id),
            ("authorId", &self.author_id),
        ];
        for (key, value) in optional {
            if let Some(v) = value.as_ref().filter(|v| !v.is_empty()) {
                pairs.push((key.to_string(), v.clone()));
            }
        }
        pairs
    }
}

/// New post as sent in the `post` part of the multipart body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub category_id: String,
    #[serde(default)]
    pub tag_ids: Vec<String>,
    pub status: PostStatus,
}

impl PostDraft {
    /// Check the same constraints the backend enforces, returning the field
    /// errors keyed by the JSON field name.
    pub fn validate(&self) -> Result<(), BTreeMap<String, String>> {
        let mut errors = BTreeMap::new();

        let title_len = self.title.trim().chars().count();
        if title_len == 0 {
            errors.insert("title".to_string(), "title is required.".to_string());
        } else if !(TITLE_MIN..=TITLE_MAX).contains(&title_len) {
            errors.insert(
                "title".to_string(),
                format!("length of title should be in between {} and {}", TITLE_MIN, TITLE_MAX),
            );
        }

        let content_len = self.content.trim().chars().count();
        if content_len == 0 {
            errors.insert("content".to_string(), "content is required.".to_string());
        } else if !(CONTENT_MIN..=CONTENT_MAX).contains(&content_len) {
            errors.insert(
                "content".to_string(),
                format!(
                    "length of content should be in between {} and {}",
                    CONTENT_MIN, CONTENT_MAX
                ),
            );
        }

        if self.category_id.trim().is_empty() {
            errors.insert("categoryId".to_string(), "Category ID is required".to_string());
        }

        if self.tag_ids.len() > MAX_TAGS {
            errors.insert(
                "tagIds".to_string(),
                format!("Maximum {} tags allowed", MAX_TAGS),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Edit of an existing post.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostUpdate {
    pub id: String,
    #[serde(flatten)]
    pub draft: PostDraft,
}

impl PostUpdate {
    pub fn validate(&self) -> Result<(), BTreeMap<String, String>> {
        let mut errors = match self.draft.validate() {
            Ok(()) => BTreeMap::new(),
            Err(errors) => errors,
        };
        if self.id.trim().is_empty() {
            errors.insert("id".to_string(), "id is required.".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Cover image uploaded in the `file` part of a post form.
#[derive(Debug, Clone)]
pub struct CoverImage {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl CoverImage {
    /// Guess the content type from the file extension.
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let mime_type = match extension.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
            _ => "application/octet-stream",
        }
        .to_string();
        Self {
            file_name,
            mime_type,
            bytes,
        }
    }
}

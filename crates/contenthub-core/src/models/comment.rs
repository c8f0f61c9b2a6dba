use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::user::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub user_role: Option<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(alias = "id")]
    pub comment_id: String,
    pub content: String,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

impl Comment {
    pub fn author_name(&self) -> &str {
        self.author.as_ref().map(|a| a.name.as_str()).unwrap_or("Anonymous")
    }

    pub fn is_by(&self, user_id: &str) -> bool {
        self.author.as_ref().map(|a| a.id == user_id).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub post_count: Option<u32>,
    #[serde(default)]
    pub published_post_count: Option<u32>,
}

impl Category {
    pub fn display_post_count(&self) -> String {
        match self.published_post_count.or(self.post_count) {
            Some(1) => "1 post".to_string(),
            Some(count) => format!("{} posts", count),
            None => "-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub post_count: Option<u32>,
}

/// Body for creating or renaming a category.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateTagsRequest {
    pub names: Vec<String>,
}

impl CreateTagsRequest {
    /// Trim, drop empties and de-duplicate (case-insensitively) while keeping
    /// the first spelling the user typed.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = std::collections::HashSet::new();
        let names = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_string())
            .filter(|n| !n.is_empty())
            .filter(|n| seen.insert(n.to_lowercase()))
            .collect();
        Self { names }
    }
}

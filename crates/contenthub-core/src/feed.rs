//! Cursor-paginated post lists.
//!
//! `FeedState` holds what a list view shows: the posts loaded so far, the
//! cursor for the next page and whether there is one. Deletions are applied
//! optimistically and rolled back if the backend refuses them.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::{Post, PostPage, PostQuery};

/// Page size used when the caller doesn't pick one
pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone)]
pub struct FeedState {
    pub posts: Vec<Post>,
    pub cursor: Option<String>,
    pub has_more: bool,
    filter: PostQuery,
    loaded: bool,
}

/// A post taken out of the list ahead of server confirmation.
#[derive(Debug, Clone)]
pub struct Removal {
    index: usize,
    post: Post,
}

impl Removal {
    pub fn post(&self) -> &Post {
        &self.post
    }
}

impl FeedState {
    /// `filter`'s cursor is ignored; paging is driven by the state.
    pub fn new(mut filter: PostQuery) -> Self {
        filter.cursor = None;
        filter.page_size.get_or_insert(DEFAULT_PAGE_SIZE);
        Self {
            posts: Vec::new(),
            cursor: None,
            has_more: true,
            filter,
            loaded: false,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.filter.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn can_load_more(&self) -> bool {
        self.loaded && self.has_more && self.cursor.is_some()
    }

    fn query(&self, cursor: Option<String>) -> PostQuery {
        PostQuery {
            cursor,
            ..self.filter.clone()
        }
    }

    /// Merge a fetched page. Appended pages skip posts already shown, since
    /// timestamp cursors can repeat the boundary post.
    pub fn apply_page(&mut self, page: PostPage, append: bool) -> usize {
        let added = if append {
            let seen: HashSet<String> = self.posts.iter().map(|p| p.id.clone()).collect();
            let fresh: Vec<Post> = page
                .posts
                .into_iter()
                .filter(|p| !seen.contains(&p.id))
                .collect();
            let count = fresh.len();
            self.posts.extend(fresh);
            count
        } else {
            self.posts = page.posts;
            self.posts.len()
        };
        self.cursor = page.cursor.filter(|c| !c.is_empty());
        self.has_more = page.has_more;
        self.loaded = true;
        added
    }

    pub async fn load_first(&mut self, client: &ApiClient) -> Result<usize, ApiError> {
        let page = client.get_posts(&self.query(None)).await?;
        let count = self.apply_page(page, false);
        debug!(count, has_more = self.has_more, "Loaded first feed page");
        Ok(count)
    }

    /// Fetch the next page. Returns 0 without a request when there is none.
    pub async fn load_more(&mut self, client: &ApiClient) -> Result<usize, ApiError> {
        if !self.can_load_more() {
            return Ok(0);
        }
        let page = client.get_posts(&self.query(self.cursor.clone())).await?;
        let count = self.apply_page(page, true);
        debug!(count, total = self.posts.len(), has_more = self.has_more, "Loaded more posts");
        Ok(count)
    }

    pub fn remove_optimistic(&mut self, id: &str) -> Option<Removal> {
        let index = self.posts.iter().position(|p| p.id == id)?;
        let post = self.posts.remove(index);
        Some(Removal { index, post })
    }

    pub fn rollback(&mut self, removal: Removal) {
        let index = removal.index.min(self.posts.len());
        self.posts.insert(index, removal.post);
    }

    /// Remove the post from the list immediately and delete it on the
    /// server, restoring it if the server refuses.
    pub async fn delete_post(&mut self, client: &ApiClient, id: &str) -> Result<(), ApiError> {
        let removal = self.remove_optimistic(id);
        match client.delete_post(id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(post_id = id, error = %e, "Delete failed, restoring post");
                if let Some(removal) = removal {
                    self.rollback(removal);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::auth::session::sample_session;
    use crate::auth::MemoryTokenStore;

    fn post(id: &str) -> Post {
        serde_json::from_value(json!({"id": id, "title": format!("Post {}", id)})).unwrap()
    }

    fn page(ids: &[&str], cursor: Option<&str>, has_more: bool) -> PostPage {
        PostPage {
            posts: ids.iter().map(|id| post(id)).collect(),
            cursor: cursor.map(str::to_string),
            has_more,
        }
    }

    fn ids(feed: &FeedState) -> Vec<&str> {
        feed.posts.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_new_ignores_cursor_and_defaults_page_size() {
        let feed = FeedState::new(PostQuery {
            cursor: Some("stale".into()),
            ..Default::default()
        });
        assert_eq!(feed.filter.page_size, Some(DEFAULT_PAGE_SIZE));
        assert!(feed.filter.cursor.is_none());
        assert!(!feed.can_load_more());
    }

    #[test]
    fn test_apply_page_appends_without_duplicates() {
        let mut feed = FeedState::new(PostQuery::default());
        assert_eq!(feed.apply_page(page(&["a", "b"], Some("c1"), true), false), 2);
        assert!(feed.can_load_more());

        assert_eq!(feed.apply_page(page(&["b", "c"], None, false), true), 1);
        assert_eq!(ids(&feed), vec!["a", "b", "c"]);
        assert!(!feed.can_load_more());
    }

    #[test]
    fn test_optimistic_remove_and_rollback() {
        let mut feed = FeedState::new(PostQuery::default());
        feed.apply_page(page(&["a", "b", "c"], None, false), false);

        let removal = feed.remove_optimistic("b").unwrap();
        assert_eq!(removal.post().id, "b");
        assert_eq!(ids(&feed), vec!["a", "c"]);

        feed.rollback(removal);
        assert_eq!(ids(&feed), vec!["a", "b", "c"]);
        assert!(feed.remove_optimistic("zzz").is_none());
    }

    #[tokio::test]
    async fn test_paging_follows_cursor() {
        let server = MockServer::start_async().await;

        let first = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/posts")
                    .query_param("pageSize", "2")
                    .query_param("categoryId", "c1")
                    .query_param_missing("cursor");
                then.status(200).json_body(json!({
                    "data": {"posts": [{"id": "a", "title": "A"}, {"id": "b", "title": "B"}], "cursor": "next-1", "hasMore": true}
                }));
            })
            .await;
        let second = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/posts")
                    .query_param("cursor", "next-1");
                then.status(200).json_body(json!({
                    "data": {"posts": [{"id": "c", "title": "C"}], "cursor": null, "hasMore": false}
                }));
            })
            .await;

        let client = ApiClient::new(server.url("/api/v1"), Arc::new(MemoryTokenStore::new())).unwrap();
        let mut feed = FeedState::new(PostQuery {
            page_size: Some(2),
            category_id: Some("c1".into()),
            ..Default::default()
        });

        assert_eq!(feed.load_first(&client).await.unwrap(), 2);
        assert_eq!(feed.load_more(&client).await.unwrap(), 1);
        assert_eq!(feed.load_more(&client).await.unwrap(), 0);
        assert_eq!(ids(&feed), vec!["a", "b", "c"]);

        first.assert_hits_async(1).await;
        second.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_failed_delete_restores_post() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/api/v1/posts/b");
                then.status(403)
                    .json_body(json!({"message": "You are not allowed to delete this post", "status": 403}));
            })
            .await;

        let store = Arc::new(MemoryTokenStore::with_session(sample_session("acc", "ref")));
        let client = ApiClient::new(server.url("/api/v1"), store).unwrap();
        let mut feed = FeedState::new(PostQuery::default());
        feed.apply_page(page(&["a", "b"], None, false), false);

        let err = feed.delete_post(&client, "b").await.unwrap_err();
        assert!(matches!(err, ApiError::AccessDenied(_)));
        assert_eq!(ids(&feed), vec!["a", "b"]);
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::models::{Category, Post, PostPage, Tag};

/// Consider cache stale after 1 hour.
const CACHE_STALE_MINUTES: i64 = 60;

const CATEGORIES: &str = "categories";
const TAGS: &str = "tags";
const FEATURED: &str = "featured_posts";
const FEED_FIRST_PAGE: &str = "feed_first_page";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Includes clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = (minutes + 30) / 60;
            format!("{}h ago", hours)
        } else {
            let days = (minutes + 720) / 1440;
            format!("{}d ago", days)
        }
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > CACHE_STALE_MINUTES
    }
}

/// JSON snapshots of slow-changing listings for offline display.
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name))
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>> {
        let path = self.cache_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", name))?;
        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", name))?;

        Ok(Some(cached))
    }

    fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let cached = CachedData::new(data);
        let contents = serde_json::to_string_pretty(&cached)?;
        std::fs::write(self.cache_path(name), contents)
            .with_context(|| format!("Failed to write cache file: {}", name))?;
        debug!(cache = name, "Cache updated");
        Ok(())
    }

    pub fn load_categories(&self) -> Result<Option<CachedData<Vec<Category>>>> {
        self.load(CATEGORIES)
    }

    pub fn save_categories(&self, categories: &[Category]) -> Result<()> {
        self.save(CATEGORIES, &categories)
    }

    pub fn load_tags(&self) -> Result<Option<CachedData<Vec<Tag>>>> {
        self.load(TAGS)
    }

    pub fn save_tags(&self, tags: &[Tag]) -> Result<()> {
        self.save(TAGS, &tags)
    }

    pub fn load_featured(&self) -> Result<Option<CachedData<Vec<Post>>>> {
        self.load(FEATURED)
    }

    pub fn save_featured(&self, posts: &[Post]) -> Result<()> {
        self.save(FEATURED, &posts)
    }

    /// Only the unfiltered first page is kept; later pages need the cursor
    /// to still be valid on the server.
    pub fn load_feed_first_page(&self) -> Result<Option<CachedData<PostPage>>> {
        self.load(FEED_FIRST_PAGE)
    }

    pub fn save_feed_first_page(&self, page: &PostPage) -> Result<()> {
        self.save(FEED_FIRST_PAGE, page)
    }

    /// Drop every cached listing, e.g. after logout.
    pub fn clear(&self) -> Result<()> {
        for name in [CATEGORIES, TAGS, FEATURED, FEED_FIRST_PAGE] {
            let path = self.cache_path(name);
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove cache file: {}", name))?;
            }
        }
        Ok(())
    }

    fn load_age<T: DeserializeOwned>(&self, name: &str) -> Option<String> {
        match self.load::<T>(name) {
            Ok(Some(cached)) => Some(cached.age_display()),
            Ok(None) => None,
            Err(e) => {
                debug!(cache = name, error = %e, "Failed to load cache for age display");
                None
            }
        }
    }

    pub fn get_cache_ages(&self) -> CacheAges {
        CacheAges {
            categories: self.load_age::<Vec<Category>>(CATEGORIES),
            tags: self.load_age::<Vec<Tag>>(TAGS),
            featured: self.load_age::<Vec<Post>>(FEATURED),
            feed: self.load_age::<PostPage>(FEED_FIRST_PAGE),
        }
    }
}

#[derive(Debug, Default)]
pub struct CacheAges {
    pub categories: Option<String>,
    pub tags: Option<String>,
    pub featured: Option<String>,
    pub feed: Option<String>,
}

impl CacheAges {
    pub fn rows(&self) -> [(&'static str, String); 4] {
        let show = |age: &Option<String>| age.clone().unwrap_or_else(|| "never".to_string());
        [
            ("Categories", show(&self.categories)),
            ("Tags", show(&self.tags)),
            ("Featured", show(&self.featured)),
            ("Feed", show(&self.feed)),
        ]
    }
}

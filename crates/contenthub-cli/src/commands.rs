//! Command handlers. Each subcommand maps onto one or a few `ApiClient`
//! calls plus rendering.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use contenthub_core::config::Config;
use contenthub_core::models::{
    Category, CoverImage, Post, PostDraft, PostPage, PostQuery, PostStatus, PostUpdate, Tag,
};
use contenthub_core::utils::contains_ignore_case;
use contenthub_core::{ApiError, FeedState};
use tracing::{debug, warn};

use crate::app::{from_cache, is_offline_error, App};
use crate::cli::{
    CategoryCommand, Command, CommentCommand, ConfigCommand, EditArgs, FeedArgs, PublishArgs,
    TagCommand,
};
use crate::render;

impl App {
    pub async fn run(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Login { email, password } => self.login(email, password).await,
            Command::Register { name, email } => self.register(&name, &email).await,
            Command::Logout => self.logout().await,
            Command::Whoami => self.whoami().await,
            Command::Status => self.status(),
            Command::Posts(args) => self.posts(args).await,
            Command::Post { id, comments } => self.show_post(&id, comments).await,
            Command::Drafts => {
                self.require_login()?;
                let posts = self.client.get_drafts().await?;
                self.print_posts(&posts, "You have no drafts.")
            }
            Command::Mine => {
                self.require_login()?;
                let posts = self.client.get_user_posts().await?;
                self.print_posts(&posts, "You haven't written any posts yet.")
            }
            Command::Featured { offline } => self.featured(offline).await,
            Command::Trending => {
                let posts = self.client.get_trending_posts().await?;
                self.print_posts(&posts, "Nothing is trending right now.")
            }
            Command::Publish(args) => self.publish(args).await,
            Command::Edit(args) => self.edit(args).await,
            Command::Delete { id } => {
                self.require_login()?;
                self.client.delete_post(&id).await?;
                println!("Deleted post {}", id);
                Ok(())
            }
            Command::Categories { offline } => {
                let categories = self.categories(offline).await?;
                self.emit(&categories, || {
                    categories.iter().map(render::category_line).collect::<Vec<_>>().join("\n")
                })
            }
            Command::Category(cmd) => self.manage_category(cmd).await,
            Command::Tags { offline } => {
                let tags = self.tags(offline).await?;
                self.emit(&tags, || tags.iter().map(render::tag_line).collect::<Vec<_>>().join("\n"))
            }
            Command::Tag(cmd) => self.manage_tag(cmd).await,
            Command::Comments { post_id } => {
                let comments = self.client.get_post_comments(&post_id).await?;
                self.emit(&comments, || {
                    if comments.is_empty() {
                        "No comments yet.".to_string()
                    } else {
                        comments.iter().map(render::comment_line).collect::<Vec<_>>().join("\n")
                    }
                })
            }
            Command::Comment(cmd) => self.manage_comment(cmd).await,
            Command::Sync => self.sync_cache().await,
            Command::Config(cmd) => self.configure(cmd),
        }
    }

    // ===== Session =====

    async fn login(&mut self, email: Option<String>, password: Option<String>) -> Result<()> {
        self.login_interactive(email, password).await?;
        println!("Signed in as {}", self.auth.display_name());
        Ok(())
    }

    async fn register(&mut self, name: &str, email: &str) -> Result<()> {
        let password = Self::prompt_password("Password: ")?;
        let confirm = Self::prompt_password("Confirm password: ")?;
        if password != confirm {
            anyhow::bail!("Passwords do not match");
        }
        let account = self.client.register(name.trim(), email.trim(), &password).await?;
        println!("Account created for {}. Run `contenthub login` to sign in.", account.email);
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        if !self.client.is_authenticated() {
            println!("Not signed in.");
            return Ok(());
        }
        self.auth.logout(&self.client).await?;
        println!("Signed out.");
        Ok(())
    }

    async fn whoami(&mut self) -> Result<()> {
        self.require_login()?;
        self.auth.initialize(&self.client).await;
        if !self.auth.authenticated {
            return Err(ApiError::SessionEnded {
                reason: "stored session is no longer valid".to_string(),
            }
            .into());
        }
        match self.auth.user.clone() {
            Some(user) => self.emit(&user, || render::profile(&user)),
            None => {
                println!("Signed in, but the profile could not be loaded.");
                Ok(())
            }
        }
    }

    fn status(&self) -> Result<()> {
        println!("API:      {}", self.client.base_url());
        println!("Tokens:   {:?}", self.config.token_backend);
        println!("Session:  {}", render::session_summary(self.client.session().as_ref()));
        println!();
        println!("Cache:");
        for (name, age) in self.cache.get_cache_ages().rows() {
            println!("  {:<12}{}", name, age);
        }
        Ok(())
    }

    // ===== Posts =====

    async fn posts(&mut self, args: FeedArgs) -> Result<()> {
        let filtered = args.category.is_some() || args.tag.is_some() || args.author.is_some();
        if args.offline {
            if filtered {
                anyhow::bail!("Only the unfiltered feed is available offline");
            }
            let page = from_cache(self.cache.load_feed_first_page(), "feed")?;
            return self.print_posts(&page.posts, "No posts cached.");
        }

        let category_id = match args.category {
            Some(ref category) => Some(self.resolve_category(category).await?.id),
            None => None,
        };
        let mut feed = FeedState::new(PostQuery {
            page_size: args.page_size,
            cursor: None,
            category_id,
            tag_id: args.tag.clone(),
            author_id: args.author.clone(),
        });

        match feed.load_first(&self.client).await {
            Ok(_) => {}
            Err(e) if is_offline_error(&e) && !filtered => {
                warn!(error = %e, "Feed unavailable, falling back to cache");
                let page = from_cache(self.cache.load_feed_first_page(), "feed")?;
                return self.print_posts(&page.posts, "No posts cached.");
            }
            Err(e) => return Err(e.into()),
        }

        if !filtered && args.page_size.is_none() {
            let first_page = PostPage {
                posts: feed.posts.clone(),
                cursor: feed.cursor.clone(),
                has_more: feed.has_more,
            };
            self.remember("feed", self.cache.save_feed_first_page(&first_page));
        }

        if args.all {
            while feed.can_load_more() {
                let added = feed.load_more(&self.client).await?;
                debug!(added, total = feed.posts.len(), "Followed feed cursor");
                if added == 0 {
                    break;
                }
            }
        }

        if self.json() {
            return self.emit(&feed.posts, String::new);
        }
        if feed.posts.is_empty() {
            println!("No posts found.");
            return Ok(());
        }
        for post in &feed.posts {
            println!("{}", render::feed_entry(post));
        }
        if feed.can_load_more() {
            println!("\n{} posts shown; more available with --all", feed.posts.len());
        }
        Ok(())
    }

    async fn show_post(&self, id: &str, with_comments: bool) -> Result<()> {
        if !with_comments {
            let post = self.client.get_post(id).await?;
            return self.emit(&post, || render::post_detail(&post));
        }

        let (post, comments) =
            futures::try_join!(self.client.get_post(id), self.client.get_post_comments(id))?;
        if self.json() {
            let value = serde_json::json!({ "post": post, "comments": comments });
            return self.emit(&value, String::new);
        }
        print!("{}", render::post_detail(&post));
        println!("\nComments ({})", comments.len());
        for comment in &comments {
            println!("  {}", render::comment_line(comment));
        }
        Ok(())
    }

    async fn featured(&self, offline: bool) -> Result<()> {
        let posts = if offline {
            from_cache(self.cache.load_featured(), "featured posts")?
        } else {
            match self.client.get_featured_posts().await {
                Ok(posts) => {
                    self.remember("featured", self.cache.save_featured(&posts));
                    posts
                }
                Err(e) if is_offline_error(&e) => {
                    warn!(error = %e, "Featured posts unavailable, falling back to cache");
                    from_cache(self.cache.load_featured(), "featured posts")?
                }
                Err(e) => return Err(e.into()),
            }
        };
        self.print_posts(&posts, "No featured posts.")
    }

    fn print_posts(&self, posts: &[Post], empty: &str) -> Result<()> {
        self.emit(&posts, || {
            if posts.is_empty() {
                empty.to_string()
            } else {
                posts.iter().map(render::post_line).collect::<Vec<_>>().join("\n")
            }
        })
    }

    async fn publish(&mut self, args: PublishArgs) -> Result<()> {
        self.require_login()?;
        let content = read_content(args.content, args.content_file.as_deref())?
            .context("Post content is required")?;
        let category = self.resolve_category(&args.category).await?;
        let tag_ids = self.resolve_tags(&args.tags).await?;

        let draft = PostDraft {
            title: args.title.trim().to_string(),
            content,
            category_id: category.id,
            tag_ids,
            status: if args.draft { PostStatus::Draft } else { PostStatus::Published },
        };
        reject_invalid(draft.validate())?;

        let cover = args.cover.as_deref().map(read_cover).transpose()?;
        let post = self.client.create_post(&draft, cover).await?;
        let verb = if post.is_draft() { "Saved draft" } else { "Published" };
        self.emit(&post, || format!("{} {}: {}", verb, post.id, post.title))
    }

    async fn edit(&mut self, args: EditArgs) -> Result<()> {
        self.require_login()?;
        let existing = self.client.get_post(&args.id).await?;

        let content = read_content(args.content, args.content_file.as_deref())?;
        let category_id = match args.category {
            Some(ref category) => self.resolve_category(category).await?.id,
            None => existing.category.as_ref().map(|c| c.id.clone()).unwrap_or_default(),
        };
        let tag_ids = if args.tags.is_empty() {
            existing.tags.iter().map(|t| t.id.clone()).collect()
        } else {
            self.resolve_tags(&args.tags).await?
        };
        let status = edited_status(args.draft, args.publish, existing.status);

        let update = PostUpdate {
            id: existing.id.clone(),
            draft: PostDraft {
                title: args.title.map(|t| t.trim().to_string()).unwrap_or(existing.title),
                content: content.unwrap_or(existing.content),
                category_id,
                tag_ids,
                status,
            },
        };
        reject_invalid(update.validate())?;

        let cover = args.cover.as_deref().map(read_cover).transpose()?;
        let post = self.client.update_post(&update, cover, args.remove_cover).await?;
        self.emit(&post, || format!("Updated {}: {}", post.id, post.title))
    }

    // ===== Categories & tags =====

    async fn categories(&self, offline: bool) -> Result<Vec<Category>> {
        if offline {
            return from_cache(self.cache.load_categories(), "categories");
        }
        match self.client.get_categories().await {
            Ok(categories) => {
                self.remember("categories", self.cache.save_categories(&categories));
                Ok(categories)
            }
            Err(e) if is_offline_error(&e) => {
                warn!(error = %e, "Categories unavailable, falling back to cache");
                from_cache(self.cache.load_categories(), "categories")
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn tags(&self, offline: bool) -> Result<Vec<Tag>> {
        if offline {
            return from_cache(self.cache.load_tags(), "tags");
        }
        match self.client.get_tags().await {
            Ok(tags) => {
                self.remember("tags", self.cache.save_tags(&tags));
                Ok(tags)
            }
            Err(e) if is_offline_error(&e) => {
                warn!(error = %e, "Tags unavailable, falling back to cache");
                from_cache(self.cache.load_tags(), "tags")
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Match a category by ID or (case-insensitive) name.
    async fn resolve_category(&self, needle: &str) -> Result<Category> {
        let categories = self.categories(false).await?;
        find_category(&categories, needle)
            .cloned()
            .with_context(|| format!("No category matches '{}'", needle))
    }

    /// Map tag names or IDs to IDs, creating the names that don't exist yet.
    async fn resolve_tags(&self, wanted: &[String]) -> Result<Vec<String>> {
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let known = self.tags(false).await?;
        let (mut ids, missing) = split_known_tags(&known, wanted);
        if !missing.is_empty() {
            debug!(?missing, "Creating tags");
            let created = self.client.create_tags(&missing).await?;
            ids.extend(created.into_iter().map(|t| t.id));
        }
        Ok(ids)
    }

    async fn manage_category(&self, cmd: CategoryCommand) -> Result<()> {
        self.require_login()?;
        match cmd {
            CategoryCommand::Add { name } => {
                let category = self.client.create_category(&name).await?;
                self.emit(&category, || format!("Created category {} ({})", category.name, category.id))
            }
            CategoryCommand::Rename { id, name } => {
                let category = self.client.update_category(&id, &name).await?;
                self.emit(&category, || format!("Renamed category {} to {}", category.id, category.name))
            }
            CategoryCommand::Delete { id } => {
                self.client.delete_category(&id).await?;
                println!("Deleted category {}", id);
                Ok(())
            }
        }
    }

    async fn manage_tag(&self, cmd: TagCommand) -> Result<()> {
        self.require_login()?;
        match cmd {
            TagCommand::Add { names } => {
                let tags = self.client.create_tags(&names).await?;
                self.emit(&tags, || {
                    let names: Vec<String> = tags.iter().map(|t| format!("#{}", t.name)).collect();
                    format!("Created {}", names.join(", "))
                })
            }
            TagCommand::Delete { id } => {
                self.client.delete_tag(&id).await?;
                println!("Deleted tag {}", id);
                Ok(())
            }
        }
    }

    // ===== Comments =====

    async fn manage_comment(&self, cmd: CommentCommand) -> Result<()> {
        self.require_login()?;
        match cmd {
            CommentCommand::Add { post_id, content } => {
                let comment = self.client.create_comment(&post_id, &content).await?;
                self.emit(&comment, || render::comment_line(&comment))
            }
            CommentCommand::Delete { id } => {
                self.client.delete_comment(&id).await?;
                println!("Deleted comment {}", id);
                Ok(())
            }
        }
    }

    // ===== Cache & config =====

    /// Fetch every cached listing concurrently and store what arrives.
    async fn sync_cache(&self) -> Result<()> {
        let feed_query = PostQuery::default();
        let (categories, tags, featured, feed) = futures::join!(
            self.client.get_categories(),
            self.client.get_tags(),
            self.client.get_featured_posts(),
            self.client.get_posts(&feed_query),
        );

        let mut failures = 0;
        let mut report = |what: &str, saved: Result<usize>| match saved {
            Ok(count) => println!("  {:<12}{} cached", what, count),
            Err(e) => {
                failures += 1;
                println!("  {:<12}failed: {:#}", what, e);
            }
        };

        report(
            "Categories",
            categories
                .map_err(anyhow::Error::from)
                .and_then(|c| self.cache.save_categories(&c).map(|_| c.len())),
        );
        report(
            "Tags",
            tags.map_err(anyhow::Error::from)
                .and_then(|t| self.cache.save_tags(&t).map(|_| t.len())),
        );
        report(
            "Featured",
            featured
                .map_err(anyhow::Error::from)
                .and_then(|p| self.cache.save_featured(&p).map(|_| p.len())),
        );
        report(
            "Feed",
            feed.map_err(anyhow::Error::from)
                .and_then(|p| self.cache.save_feed_first_page(&p).map(|_| p.posts.len())),
        );

        if failures > 0 {
            anyhow::bail!("{} listing(s) could not be cached", failures);
        }
        Ok(())
    }

    fn configure(&self, cmd: ConfigCommand) -> Result<()> {
        let path = Config::config_path()?;
        match cmd {
            ConfigCommand::Show => {
                println!("# {}", path.display());
                println!("{}", serde_json::to_string_pretty(&self.config)?);
                Ok(())
            }
            ConfigCommand::Set {
                api_url,
                token_backend,
                request_timeout_secs,
                refresh_timeout_secs,
            } => {
                // Edit the file as written, without environment overrides.
                let mut config = Config::load_from(&path)?;
                if let Some(url) = api_url {
                    config.api_base_url = Some(url);
                }
                if let Some(backend) = token_backend {
                    config.token_backend = backend;
                }
                if let Some(secs) = request_timeout_secs {
                    config.request_timeout_secs = Some(secs);
                }
                if let Some(secs) = refresh_timeout_secs {
                    config.refresh_timeout_secs = Some(secs);
                }
                config.save_to(&path)?;
                println!("Saved {}", path.display());
                Ok(())
            }
        }
    }
}

fn find_category<'a>(categories: &'a [Category], needle: &str) -> Option<&'a Category> {
    let needle = needle.trim();
    categories
        .iter()
        .find(|c| c.id == needle)
        .or_else(|| categories.iter().find(|c| c.name.eq_ignore_ascii_case(needle)))
        .or_else(|| {
            let mut partial = categories.iter().filter(|c| contains_ignore_case(&c.name, needle));
            match (partial.next(), partial.next()) {
                (Some(only), None) => Some(only),
                _ => None,
            }
        })
}

/// Split requested tags into IDs of known tags and names still to create.
fn split_known_tags(known: &[Tag], wanted: &[String]) -> (Vec<String>, Vec<String>) {
    let mut ids = Vec::new();
    let mut missing = Vec::new();
    for raw in wanted {
        let name = raw.trim().trim_start_matches('#');
        if name.is_empty() {
            continue;
        }
        match known
            .iter()
            .find(|t| t.id == name || t.name.eq_ignore_ascii_case(name))
        {
            Some(tag) if !ids.contains(&tag.id) => ids.push(tag.id.clone()),
            Some(_) => {}
            None => missing.push(name.to_string()),
        }
    }
    (ids, missing)
}

fn read_content(inline: Option<String>, file: Option<&Path>) -> Result<Option<String>> {
    match (inline, file) {
        (Some(text), _) => Ok(Some(text)),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))
            .map(Some),
        (None, None) => Ok(None),
    }
}

fn read_cover(path: &Path) -> Result<CoverImage> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cover".to_string());
    Ok(CoverImage::from_bytes(name, bytes))
}

/// Turn local validation failures into the same error the backend would send.
/// Status to send with an edit. Without an explicit flag the post keeps its
/// status; an unknown status stays a draft so an edit never publishes.
fn edited_status(draft: bool, publish: bool, current: Option<PostStatus>) -> PostStatus {
    if draft {
        PostStatus::Draft
    } else if publish {
        PostStatus::Published
    } else {
        current.unwrap_or(PostStatus::Draft)
    }
}

fn reject_invalid(result: std::result::Result<(), BTreeMap<String, String>>) -> Result<()> {
    result.map_err(|errors| {
        ApiError::Validation {
            status: 400,
            message: "Please fix the following fields".to_string(),
            errors,
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: &str, name: &str) -> Category {
        Category {
            id: id.to_string(),
            name: name.to_string(),
            post_count: None,
            published_post_count: None,
        }
    }

    fn tag(id: &str, name: &str) -> Tag {
        Tag {
            id: id.to_string(),
            name: name.to_string(),
            post_count: None,
        }
    }

    #[test]
    fn test_find_category() {
        let categories = [
            category("c1", "Rust"),
            category("c2", "Databases"),
            category("c3", "Distributed Databases"),
        ];
        assert_eq!(find_category(&categories, "c2").unwrap().name, "Databases");
        assert_eq!(find_category(&categories, "rust").unwrap().id, "c1");
        assert_eq!(find_category(&categories, "distributed").unwrap().id, "c3");
        // Ambiguous partial match
        assert!(find_category(&categories, "data").is_none());
    }

    #[test]
    fn test_split_known_tags() {
        let known = [tag("t1", "async"), tag("t2", "tokio")];
        let wanted: Vec<String> = ["#Async", "t2", "serde", "  ", "async"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (ids, missing) = split_known_tags(&known, &wanted);
        assert_eq!(ids, vec!["t1", "t2"]);
        assert_eq!(missing, vec!["serde"]);
    }

    #[test]
    fn test_read_content_prefers_inline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("post.html");
        std::fs::write(&path, "<p>from file</p>").unwrap();

        assert_eq!(read_content(Some("inline".into()), Some(&path)).unwrap().unwrap(), "inline");
        assert_eq!(read_content(None, Some(&path)).unwrap().unwrap(), "<p>from file</p>");
        assert!(read_content(None, None).unwrap().is_none());
        assert!(read_content(None, Some(&dir.path().join("missing.html"))).is_err());
    }

    #[test]
    fn test_read_cover_guesses_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.PNG");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let cover = read_cover(&path).unwrap();
        assert_eq!(cover.file_name, "cover.PNG");
        assert_eq!(cover.mime_type, "image/png");
        assert_eq!(cover.bytes.len(), 4);
    }

    #[test]
    fn test_edited_status() {
        assert_eq!(edited_status(false, false, None), PostStatus::Draft);
        assert_eq!(
            edited_status(false, false, Some(PostStatus::Published)),
            PostStatus::Published
        );
        assert_eq!(edited_status(false, false, Some(PostStatus::Draft)), PostStatus::Draft);
        assert_eq!(edited_status(false, true, None), PostStatus::Published);
        assert_eq!(
            edited_status(true, false, Some(PostStatus::Published)),
            PostStatus::Draft
        );
    }

    #[test]
    fn test_reject_invalid_produces_validation_error() {
        let draft = PostDraft {
            title: "short".into(),
            content: "too short".into(),
            category_id: String::new(),
            tag_ids: Vec::new(),
            status: PostStatus::Draft,
        };
        let err = reject_invalid(draft.validate()).unwrap_err();
        let api = err.downcast_ref::<ApiError>().unwrap();
        let fields = api.validation_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("content"));
        assert!(fields.contains_key("categoryId"));
    }
}

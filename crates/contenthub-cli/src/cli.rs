use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use contenthub_core::config::{ENV_API_URL, ENV_EMAIL, ENV_PASSWORD};
use contenthub_core::TokenBackend;

#[derive(Parser, Debug)]
#[command(name = "contenthub")]
#[command(about = "Read, write and manage ContentHub posts from the terminal")]
#[command(version)]
pub struct Cli {
    /// API root, e.g. https://blog.example.com/api/v1
    #[arg(long, global = true, env = ENV_API_URL)]
    pub api_url: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long, env = ENV_EMAIL)]
        email: Option<String>,
        #[arg(long, env = ENV_PASSWORD, hide_env_values = true)]
        password: Option<String>,
    },

    /// Create an account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show the signed-in user's profile
    Whoami,

    /// Show session, configuration and cache state without contacting the server
    Status,

    /// Browse the public feed
    #[command(after_help = "\
Examples:
  contenthub posts
  contenthub posts --category Rust --page-size 20
  contenthub posts --all
  contenthub posts --offline")]
    Posts(FeedArgs),

    /// Show one post
    Post {
        id: String,
        /// Also list the post's comments
        #[arg(long)]
        comments: bool,
    },

    /// List your drafts
    Drafts,

    /// List all of your posts, drafts included
    Mine,

    /// List featured posts
    Featured {
        #[arg(long)]
        offline: bool,
    },

    /// List trending posts
    Trending,

    /// Write a new post
    #[command(after_help = "\
Examples:
  contenthub publish --title \"Token refresh in Rust\" --content-file post.html --category Rust --tag async --tag tokio
  contenthub publish --title \"Work in progress\" --content \"Notes for later, at least twenty chars\" --category Rust --draft")]
    Publish(PublishArgs),

    /// Change an existing post
    Edit(EditArgs),

    /// Delete one of your posts
    Delete { id: String },

    /// List categories
    Categories {
        #[arg(long)]
        offline: bool,
    },

    /// Manage categories (admin)
    #[command(subcommand)]
    Category(CategoryCommand),

    /// List tags
    Tags {
        #[arg(long)]
        offline: bool,
    },

    /// Manage tags
    #[command(subcommand)]
    Tag(TagCommand),

    /// List the comments on a post
    Comments { post_id: String },

    /// Add or remove comments
    #[command(subcommand)]
    Comment(CommentCommand),

    /// Refresh the offline cache (categories, tags, featured posts, first feed page)
    Sync,

    /// Show or change the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug, Default)]
pub struct FeedArgs {
    /// Category name or ID
    #[arg(long)]
    pub category: Option<String>,

    /// Tag ID
    #[arg(long)]
    pub tag: Option<String>,

    /// Author ID
    #[arg(long)]
    pub author: Option<String>,

    #[arg(long)]
    pub page_size: Option<u32>,

    /// Keep following the cursor until the feed is exhausted
    #[arg(long, conflicts_with = "offline")]
    pub all: bool,

    /// Show the cached first page
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    #[arg(long)]
    pub title: String,

    #[arg(long, conflicts_with = "content_file", required_unless_present = "content_file")]
    pub content: Option<String>,

    /// Read the content from a file
    #[arg(long, value_name = "PATH")]
    pub content_file: Option<PathBuf>,

    /// Category name or ID
    #[arg(long)]
    pub category: String,

    /// Tag name or ID; unknown names are created (repeatable)
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Save as a draft instead of publishing
    #[arg(long)]
    pub draft: bool,

    /// Cover image file
    #[arg(long, value_name = "PATH")]
    pub cover: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long, conflicts_with = "content_file")]
    pub content: Option<String>,

    #[arg(long, value_name = "PATH")]
    pub content_file: Option<PathBuf>,

    #[arg(long)]
    pub category: Option<String>,

    /// Replace the post's tags (repeatable)
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Move the post back to drafts
    #[arg(long, conflicts_with = "publish")]
    pub draft: bool,

    /// Publish a draft
    #[arg(long)]
    pub publish: bool,

    #[arg(long, value_name = "PATH", conflicts_with = "remove_cover")]
    pub cover: Option<PathBuf>,

    #[arg(long)]
    pub remove_cover: bool,
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    Add { name: String },
    Rename { id: String, name: String },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum TagCommand {
    /// Create one or more tags
    Add {
        #[arg(required = true)]
        names: Vec<String>,
    },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum CommentCommand {
    Add { post_id: String, content: String },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    Show,
    Set {
        #[arg(long)]
        api_url: Option<String>,
        #[arg(long)]
        token_backend: Option<TokenBackend>,
        #[arg(long)]
        request_timeout_secs: Option<u64>,
        #[arg(long)]
        refresh_timeout_secs: Option<u64>,
    },
}

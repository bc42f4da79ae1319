//! Crosspost - publish one post to many social networks
//!
//! This library holds the publish orchestrator, one adapter per platform
//! (Twitter, Facebook, Instagram, TikTok, YouTube, LinkedIn), the due-post
//! scheduler, and the SQLite store they share.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod poster;
pub mod scheduler;
pub mod store;
pub mod token;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{CrosspostError, PlatformError, Result};
pub use platforms::{create_platforms, Platform, PlatformRegistry};
pub use poster::MultiPlatformPoster;
pub use scheduler::Scheduler;
pub use store::{CredentialStore, PostStore};
pub use types::{PlatformCredentials, Post, PostStatus, PostType, PublishOutcome, PublishResult};

//! Persistence seams used by the orchestrator and scheduler
//!
//! [`Database`](crate::db::Database) implements both traits on SQLite.
//! Tests and embedders can supply their own implementations.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{PlatformCredentials, Post, PublishResult};

/// Per-(user, platform) OAuth credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch the credential for `user_id` on `platform`, if one exists
    async fn get_credentials(
        &self,
        user_id: &str,
        platform: &str,
    ) -> Result<Option<PlatformCredentials>>;

    /// Insert or replace the credential for its (user, platform) pair
    async fn save_credentials(&self, credentials: &PlatformCredentials) -> Result<()>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create_post(&self, post: &Post) -> Result<()>;

    /// Load a post with its media resolved
    async fn get_post(&self, post_id: &str) -> Result<Option<Post>>;

    /// Persist status, timestamps, and content of an existing post
    async fn update_post(&self, post: &Post) -> Result<()>;

    /// Append one audit row for a publish attempt
    async fn create_publish_result(&self, post_id: &str, result: &PublishResult) -> Result<()>;

    async fn get_publish_results(&self, post_id: &str) -> Result<Vec<PublishResult>>;

    /// Atomically move every scheduled post due at `now` to `publishing`
    /// and return exactly the posts that this call moved.
    ///
    /// Two overlapping calls never return the same post.
    async fn claim_due_posts(&self, now: i64) -> Result<Vec<Post>>;
}

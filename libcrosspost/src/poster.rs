//! Multi-platform publish orchestration
//!
//! [`MultiPlatformPoster`] fans one post out to every platform it targets,
//! one task per platform, and joins them before deciding the post's final
//! status. Results come back in the post's platform order no matter which
//! platform finishes first.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::platforms::{Platform, PlatformRegistry};
use crate::store::{CredentialStore, PostStore};
use crate::types::{PlatformCredentials, Post, PostStatus, PublishOutcome, PublishResult};

pub const UNSUPPORTED_PLATFORM: &str = "Platform not supported";

/// Orchestrates publishing a post to all of its target platforms
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use libcrosspost::config::Config;
/// use libcrosspost::db::Database;
/// use libcrosspost::platforms::create_platforms;
/// use libcrosspost::poster::MultiPlatformPoster;
///
/// # async fn example() -> libcrosspost::error::Result<()> {
/// let config = Config::load()?;
/// let db = Arc::new(Database::new(&config.database.path).await?);
/// let poster = MultiPlatformPoster::new(create_platforms(&config)?, db.clone(), db);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MultiPlatformPoster {
    registry: PlatformRegistry,
    credentials: Arc<dyn CredentialStore>,
    posts: Arc<dyn PostStore>,
}

/// One spawned platform attempt, with the credential it started from
struct Attempt {
    platform: String,
    handle: JoinHandle<(PublishResult, Option<PlatformCredentials>)>,
}

impl MultiPlatformPoster {
    pub fn new(
        registry: PlatformRegistry,
        credentials: Arc<dyn CredentialStore>,
        posts: Arc<dyn PostStore>,
    ) -> Self {
        Self {
            registry,
            credentials,
            posts,
        }
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    /// Publish `post` everywhere it targets
    ///
    /// Returns exactly one result per entry in `post.platforms`, in the same
    /// order. The post is marked published only when every result
    /// succeeded; any failure, or an empty platform list, marks it failed.
    /// Results and the updated post are persisted best-effort.
    pub async fn publish(&self, post: &mut Post) -> Vec<PublishResult> {
        info!(
            post_id = %post.id,
            platforms = ?post.platforms,
            "Publishing post"
        );

        let shared = Arc::new(post.clone());
        let mut slots: Vec<Option<PublishResult>> = vec![None; post.platforms.len()];
        let mut attempts: Vec<(usize, Attempt)> = Vec::with_capacity(post.platforms.len());

        for (index, name) in post.platforms.iter().enumerate() {
            match self.registry.get(name) {
                Some(adapter) => {
                    let credentials = self.lookup_credentials(&post.user_id, name).await;
                    attempts.push((index, spawn_attempt(adapter, shared.clone(), credentials)));
                }
                None => {
                    warn!(post_id = %post.id, platform = %name, "No adapter registered");
                    slots[index] = Some(PublishResult::failure(name, UNSUPPORTED_PLATFORM));
                }
            }
        }

        for (index, attempt) in attempts {
            let result = match attempt.handle.await {
                Ok((result, refreshed)) => {
                    if let Some(creds) = refreshed {
                        self.save_refreshed(&post.id, &creds).await;
                    }
                    result
                }
                Err(e) => {
                    error!(
                        post_id = %post.id,
                        platform = %attempt.platform,
                        error = %e,
                        "Platform task aborted"
                    );
                    PublishResult::failure(
                        &attempt.platform,
                        format!("Error publishing to {}: task failed: {}", attempt.platform, e),
                    )
                }
            };
            slots[index] = Some(result);
        }

        let results: Vec<PublishResult> = slots.into_iter().flatten().collect();
        self.finalize(post, &results).await;
        results
    }

    /// [`publish`](Self::publish), packaged with the post id
    pub async fn publish_outcome(&self, post: &mut Post) -> PublishOutcome {
        let results = self.publish(post).await;
        PublishOutcome {
            post_id: post.id.clone(),
            results,
        }
    }

    async fn lookup_credentials(&self, user_id: &str, platform: &str) -> Option<PlatformCredentials> {
        match self.credentials.get_credentials(user_id, platform).await {
            Ok(found) => found,
            Err(e) => {
                warn!(user_id, platform, error = %e, "Credential lookup failed");
                None
            }
        }
    }

    async fn save_refreshed(&self, post_id: &str, creds: &PlatformCredentials) {
        match self.credentials.save_credentials(creds).await {
            Ok(()) => debug!(post_id, platform = %creds.platform, "Saved refreshed credentials"),
            Err(e) => error!(
                post_id,
                platform = %creds.platform,
                error = %e,
                "Failed to save refreshed credentials"
            ),
        }
    }

    /// Apply the all-or-nothing status rule and persist
    async fn finalize(&self, post: &mut Post, results: &[PublishResult]) {
        let now = chrono::Utc::now().timestamp();
        let all_succeeded = !results.is_empty() && results.iter().all(|r| r.success);

        if all_succeeded {
            post.status = PostStatus::Published;
            post.published_at = Some(now);
        } else {
            post.status = PostStatus::Failed;
            post.published_at = None;
        }
        post.updated_at = now;

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            post_id = %post.id,
            status = %post.status,
            succeeded,
            total = results.len(),
            "Publish finished"
        );

        for result in results {
            if let Err(e) = self.posts.create_publish_result(&post.id, result).await {
                error!(
                    post_id = %post.id,
                    platform = %result.platform,
                    error = %e,
                    "Failed to record publish result"
                );
            }
        }

        if let Err(e) = self.posts.update_post(post).await {
            error!(post_id = %post.id, error = %e, "Failed to update post status");
        }
    }
}

/// Run one adapter on its own task
///
/// The task hands back the credential only when the adapter changed it.
fn spawn_attempt(
    adapter: Arc<dyn Platform>,
    post: Arc<Post>,
    credentials: Option<PlatformCredentials>,
) -> Attempt {
    let platform = adapter.name().to_string();
    let handle = tokio::spawn(async move {
        let original = credentials.clone();
        let mut credentials = credentials;
        let result = adapter.publish(&post, credentials.as_mut()).await;

        let refreshed = match (original, credentials) {
            (Some(before), Some(after)) if before != after => Some(after),
            _ => None,
        };
        (result, refreshed)
    });

    Attempt { platform, handle }
}

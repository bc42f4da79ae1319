//! Due-post scheduler
//!
//! Each tick claims every scheduled post whose time has come, in one atomic
//! store operation, and publishes the claimed posts concurrently through
//! the [`MultiPlatformPoster`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info};

use crate::poster::MultiPlatformPoster;
use crate::store::PostStore;
use crate::types::{Post, PostStatus};

/// Longest stretch between shutdown-flag checks
const SHUTDOWN_CHECK: Duration = Duration::from_secs(1);

pub struct Scheduler {
    store: Arc<dyn PostStore>,
    poster: Arc<MultiPlatformPoster>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn PostStore>,
        poster: Arc<MultiPlatformPoster>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            poster,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Claim and publish everything due now
    ///
    /// Returns the number of posts claimed. A failed claim is logged and
    /// counts as zero; a post whose publish task panics is marked failed
    /// without affecting the rest of the batch.
    pub async fn tick(&self) -> usize {
        let now = chrono::Utc::now().timestamp();
        let claimed = match self.store.claim_due_posts(now).await {
            Ok(posts) => posts,
            Err(e) => {
                error!(error = %e, "Failed to claim due posts, skipping tick");
                return 0;
            }
        };

        if claimed.is_empty() {
            debug!("No posts due");
            return 0;
        }

        let count = claimed.len();
        info!(count, "Claimed due posts");

        let mut tasks = JoinSet::new();
        for post in claimed {
            let poster = self.poster.clone();
            let store = self.store.clone();
            tasks.spawn(publish_claimed(poster, store, post));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Scheduled publish task failed");
            }
        }

        count
    }

    /// Tick every interval until `shutdown` is set
    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        info!(
            interval = %humantime::format_duration(self.interval),
            "Scheduler started"
        );

        while !shutdown.load(Ordering::Relaxed) {
            self.tick().await;

            let deadline = Instant::now() + self.interval;
            while !shutdown.load(Ordering::Relaxed) {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                sleep(remaining.min(SHUTDOWN_CHECK)).await;
            }
        }

        info!("Scheduler stopped");
    }
}

/// Publish one claimed post, failing it if the publish task dies
///
/// A claimed post is in `publishing`, which no later claim matches, so an
/// aborted publish must still leave it in a terminal status.
async fn publish_claimed(poster: Arc<MultiPlatformPoster>, store: Arc<dyn PostStore>, post: Post) {
    let mut fallback = post.clone();
    let mut post = post;

    let publish = tokio::spawn(async move {
        let results = poster.publish(&mut post).await;
        (post.status, results.len())
    });

    match publish.await {
        Ok((status, platforms)) => {
            info!(post_id = %fallback.id, %status, platforms, "Scheduled post processed");
        }
        Err(e) => {
            error!(post_id = %fallback.id, error = %e, "Scheduled publish task failed, marking post failed");
            fallback.status = PostStatus::Failed;
            fallback.published_at = None;
            fallback.updated_at = chrono::Utc::now().timestamp();
            if let Err(e) = store.update_post(&fallback).await {
                error!(post_id = %fallback.id, error = %e, "Failed to mark post failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::platforms::mock::MockPlatform;
    use crate::platforms::PlatformRegistry;

    async fn scheduler(registry: PlatformRegistry) -> (Scheduler, Arc<Database>) {
        let db = Arc::new(Database::new(":memory:").await.unwrap());
        let poster = Arc::new(MultiPlatformPoster::new(registry, db.clone(), db.clone()));
        (
            Scheduler::new(db.clone(), poster, Duration::from_millis(20)),
            db,
        )
    }

    #[tokio::test]
    async fn test_tick_publishes_due_posts_only() {
        let registry = PlatformRegistry::new().with(MockPlatform::success("twitter"));
        let (scheduler, db) = scheduler(registry).await;
        let now = chrono::Utc::now().timestamp();

        let due = Post::new("u", "due", &["twitter"]).scheduled_at(now - 10);
        let later = Post::new("u", "later", &["twitter"]).scheduled_at(now + 3600);
        db.create_post(&due).await.unwrap();
        db.create_post(&later).await.unwrap();

        assert_eq!(scheduler.tick().await, 1);

        let due = db.get_post(&due.id).await.unwrap().unwrap();
        assert_eq!(due.status, PostStatus::Published);
        let later = db.get_post(&later.id).await.unwrap().unwrap();
        assert_eq!(later.status, PostStatus::Scheduled);

        assert_eq!(scheduler.tick().await, 0);
    }

    /// Delegates to the database but panics while recording results
    struct PanickingResults(Arc<Database>);

    #[async_trait::async_trait]
    impl PostStore for PanickingResults {
        async fn create_post(&self, post: &Post) -> crate::error::Result<()> {
            self.0.create_post(post).await
        }

        async fn get_post(&self, post_id: &str) -> crate::error::Result<Option<Post>> {
            self.0.get_post(post_id).await
        }

        async fn update_post(&self, post: &Post) -> crate::error::Result<()> {
            self.0.update_post(post).await
        }

        async fn create_publish_result(
            &self,
            _post_id: &str,
            _result: &crate::types::PublishResult,
        ) -> crate::error::Result<()> {
            panic!("results table unavailable");
        }

        async fn get_publish_results(
            &self,
            post_id: &str,
        ) -> crate::error::Result<Vec<crate::types::PublishResult>> {
            self.0.get_publish_results(post_id).await
        }

        async fn claim_due_posts(&self, now: i64) -> crate::error::Result<Vec<Post>> {
            self.0.claim_due_posts(now).await
        }
    }

    #[tokio::test]
    async fn test_aborted_publish_marks_post_failed() {
        let db = Arc::new(Database::new(":memory:").await.unwrap());
        let store: Arc<dyn PostStore> = Arc::new(PanickingResults(db.clone()));
        let registry = PlatformRegistry::new().with(MockPlatform::success("twitter"));
        let poster = Arc::new(MultiPlatformPoster::new(registry, db.clone(), store.clone()));
        let scheduler = Scheduler::new(store, poster, Duration::from_millis(20));

        let now = chrono::Utc::now().timestamp();
        let post = Post::new("u", "doomed", &["twitter"]).scheduled_at(now - 5);
        db.create_post(&post).await.unwrap();

        assert_eq!(scheduler.tick().await, 1);

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert!(stored.published_at.is_none());
    }

    #[tokio::test]
    async fn test_run_stops_when_flag_set() {
        let (scheduler, _db) = scheduler(PlatformRegistry::new()).await;
        let shutdown = Arc::new(AtomicBool::new(false));

        let flag = shutdown.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(60)).await;
            flag.store(true, Ordering::Relaxed);
        });

        tokio::time::timeout(Duration::from_secs(5), scheduler.run(shutdown))
            .await
            .expect("scheduler should stop after shutdown is requested");
    }
}

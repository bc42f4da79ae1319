//! Scheduler integration tests
//!
//! Claims run against a file-backed database so that overlapping claims use
//! separate pooled connections.

use anyhow::Result;
use libcrosspost::db::Database;
use libcrosspost::platforms::mock::MockPlatform;
use libcrosspost::platforms::PlatformRegistry;
use libcrosspost::poster::MultiPlatformPoster;
use libcrosspost::scheduler::Scheduler;
use libcrosspost::store::PostStore;
use libcrosspost::types::{Post, PostStatus};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn create_test_db() -> Result<(TempDir, Arc<Database>)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("scheduler.db");
    let db = Database::new(&db_path.to_string_lossy()).await?;
    Ok((temp_dir, Arc::new(db)))
}

fn scheduler_for(registry: PlatformRegistry, db: &Arc<Database>) -> Scheduler {
    let poster = Arc::new(MultiPlatformPoster::new(registry, db.clone(), db.clone()));
    Scheduler::new(db.clone(), poster, Duration::from_millis(10))
}

#[tokio::test]
async fn test_overlapping_claims_never_share_a_post() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let now = chrono::Utc::now().timestamp();

    let mut ids = HashSet::new();
    for i in 0..20 {
        let post = Post::new("user-1", &format!("post {}", i), &["twitter"]).scheduled_at(now - i);
        db.create_post(&post).await?;
        ids.insert(post.id);
    }

    let (first, second) = tokio::join!(db.claim_due_posts(now), db.claim_due_posts(now));
    let (first, second) = (first?, second?);

    let first_ids: HashSet<String> = first.iter().map(|p| p.id.clone()).collect();
    let second_ids: HashSet<String> = second.iter().map(|p| p.id.clone()).collect();

    assert!(first_ids.is_disjoint(&second_ids));
    assert_eq!(first.len() + second.len(), 20);
    let union: HashSet<String> = first_ids.union(&second_ids).cloned().collect();
    assert_eq!(union, ids);

    for post in first.iter().chain(second.iter()) {
        assert_eq!(post.status, PostStatus::Publishing);
    }

    // Nothing left to claim
    assert!(db.claim_due_posts(now).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_claim_ignores_drafts_and_future_posts() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let now = chrono::Utc::now().timestamp();

    let draft = Post::new("user-1", "draft", &["twitter"]);
    let future = Post::new("user-1", "future", &["twitter"]).scheduled_at(now + 600);
    let due = Post::new("user-1", "due", &["twitter"]).scheduled_at(now);
    db.create_post(&draft).await?;
    db.create_post(&future).await?;
    db.create_post(&due).await?;

    let claimed = db.claim_due_posts(now).await?;
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, due.id);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_ticks_publish_each_post_once() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let twitter = MockPlatform::with_delay("twitter", Duration::from_millis(20));
    let registry = PlatformRegistry::new().with(twitter.clone());
    let scheduler_a = scheduler_for(registry.clone(), &db);
    let scheduler_b = scheduler_for(registry, &db);

    let now = chrono::Utc::now().timestamp();
    for i in 0..5 {
        let post = Post::new("user-1", &format!("post {}", i), &["twitter"]).scheduled_at(now - 5);
        db.create_post(&post).await?;
    }

    let (a, b) = tokio::join!(scheduler_a.tick(), scheduler_b.tick());
    assert_eq!(a + b, 5);
    assert_eq!(twitter.call_count(), 5);

    Ok(())
}

#[tokio::test]
async fn test_one_failing_post_does_not_block_others() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let registry = PlatformRegistry::new()
        .with(MockPlatform::success("twitter"))
        .with(MockPlatform::panicking("tiktok"))
        .with(MockPlatform::failure("youtube", "YouTube requires a video attachment"));
    let scheduler = scheduler_for(registry, &db);

    let now = chrono::Utc::now().timestamp();
    let good = Post::new("user-1", "good", &["twitter"]).scheduled_at(now - 30);
    let panics = Post::new("user-1", "panics", &["tiktok"]).scheduled_at(now - 20);
    let fails = Post::new("user-1", "fails", &["youtube"]).scheduled_at(now - 10);
    for post in [&good, &panics, &fails] {
        db.create_post(post).await?;
    }

    assert_eq!(scheduler.tick().await, 3);

    let status = |id: String| {
        let db = db.clone();
        async move { db.get_post(&id).await.map(|p| p.map(|p| p.status)) }
    };
    assert_eq!(status(good.id.clone()).await?, Some(PostStatus::Published));
    assert_eq!(status(panics.id.clone()).await?, Some(PostStatus::Failed));
    assert_eq!(status(fails.id.clone()).await?, Some(PostStatus::Failed));

    Ok(())
}

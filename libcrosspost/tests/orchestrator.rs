//! End-to-end tests for the publish orchestrator
//!
//! These tests verify complete workflows including:
//! - Result ordering under uneven platform latency
//! - The all-or-nothing post status rule
//! - Isolation of panicking adapters
//! - Persistence of results and refreshed credentials

use anyhow::Result;
use libcrosspost::db::Database;
use libcrosspost::platforms::mock::MockPlatform;
use libcrosspost::platforms::{LinkedInPlatform, PlatformRegistry};
use libcrosspost::poster::MultiPlatformPoster;
use libcrosspost::store::{CredentialStore, PostStore};
use libcrosspost::token;
use libcrosspost::types::{PlatformCredentials, Post, PostStatus};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> Result<(TempDir, Arc<Database>)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path.to_string_lossy()).await?;
    Ok((temp_dir, Arc::new(db)))
}

fn poster_for(registry: PlatformRegistry, db: &Arc<Database>) -> MultiPlatformPoster {
    MultiPlatformPoster::new(registry, db.clone(), db.clone())
}

#[tokio::test]
async fn test_results_match_platform_order_regardless_of_latency() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let registry = PlatformRegistry::new()
        .with(MockPlatform::with_delay("a", Duration::from_millis(200)))
        .with(MockPlatform::with_delay("b", Duration::from_millis(10)))
        .with(MockPlatform::with_delay("c", Duration::from_millis(100)))
        .with(MockPlatform::success("d"));
    let poster = poster_for(registry, &db);

    let mut post = Post::new("user-1", "ordering", &["c", "a", "d", "b"]);
    db.create_post(&post).await?;

    let started = std::time::Instant::now();
    let results = poster.publish(&mut post).await;

    let names: Vec<&str> = results.iter().map(|r| r.platform.as_str()).collect();
    assert_eq!(names, vec!["c", "a", "d", "b"]);
    assert!(results.iter().all(|r| r.success));
    // Platforms run concurrently, not back to back
    assert!(started.elapsed() < Duration::from_millis(300));

    Ok(())
}

#[tokio::test]
async fn test_all_success_marks_published() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let registry = PlatformRegistry::new()
        .with(MockPlatform::success("twitter"))
        .with(MockPlatform::success("facebook"));
    let poster = poster_for(registry, &db);

    let mut post = Post::new("user-1", "all good", &["twitter", "facebook"]);
    db.create_post(&post).await?;
    let outcome = poster.publish_outcome(&mut post).await;

    assert!(outcome.all_succeeded());
    assert_eq!(outcome.post_id, post.id);

    let stored = db.get_post(&post.id).await?.expect("post exists");
    assert_eq!(stored.status, PostStatus::Published);
    assert!(stored.published_at.is_some());

    let audit = db.get_publish_results(&post.id).await?;
    assert_eq!(audit.len(), 2);
    assert!(audit.iter().all(|r| r.external_post_id.is_some()));

    Ok(())
}

#[tokio::test]
async fn test_partial_success_marks_failed() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let registry = PlatformRegistry::new()
        .with(MockPlatform::success("facebook"))
        .with(MockPlatform::failure("youtube", "YouTube requires a video attachment"));
    let poster = poster_for(registry, &db);

    let mut post = Post::new("user-1", "half", &["facebook", "youtube"]);
    db.create_post(&post).await?;
    let results = poster.publish(&mut post).await;

    assert!(results[0].success);
    assert!(!results[1].success);
    assert_eq!(results[1].message, "YouTube requires a video attachment");

    let stored = db.get_post(&post.id).await?.expect("post exists");
    assert_eq!(stored.status, PostStatus::Failed);
    assert!(stored.published_at.is_none());

    // Individual successes stay visible in the audit trail
    let audit = db.get_publish_results(&post.id).await?;
    assert_eq!(audit.iter().filter(|r| r.success).count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_panicking_adapter_is_isolated() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let registry = PlatformRegistry::new()
        .with(MockPlatform::panicking("instagram"))
        .with(MockPlatform::with_delay("twitter", Duration::from_millis(30)));
    let poster = poster_for(registry, &db);

    let mut post = Post::new("user-1", "boom", &["instagram", "twitter"]);
    db.create_post(&post).await?;
    let results = poster.publish(&mut post).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].platform, "instagram");
    assert!(!results[0].success);
    assert!(results[0].message.starts_with("Error publishing to instagram"));
    assert!(results[1].success);
    assert_eq!(post.status, PostStatus::Failed);

    Ok(())
}

#[tokio::test]
async fn test_credentials_are_looked_up_per_user_and_platform() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let twitter = MockPlatform::success("twitter").requiring_credentials();
    let facebook = MockPlatform::success("facebook").requiring_credentials();
    let registry = PlatformRegistry::new()
        .with(twitter.clone())
        .with(facebook.clone());
    let poster = poster_for(registry, &db);

    db.save_credentials(&PlatformCredentials::new("user-1", "twitter", "tw-token"))
        .await?;
    db.save_credentials(&PlatformCredentials::new("user-2", "facebook", "other-user"))
        .await?;

    let mut post = Post::new("user-1", "creds", &["twitter", "facebook"]);
    db.create_post(&post).await?;
    let results = poster.publish(&mut post).await;

    assert!(results[0].success);
    assert_eq!(results[1].message, "Missing credentials");

    let seen = twitter.seen_credentials();
    assert_eq!(seen[0].as_ref().map(|c| c.access_token.as_str()), Some("tw-token"));
    assert_eq!(facebook.seen_credentials(), vec![None]);

    Ok(())
}

#[tokio::test]
async fn test_refreshed_credentials_are_persisted() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let new_expiry = token::now() + token::LONG_LIVED_TOKEN_SECS;
    let registry =
        PlatformRegistry::new().with(MockPlatform::success("facebook").refreshing_to(new_expiry));
    let poster = poster_for(registry, &db);

    let mut creds = PlatformCredentials::new("user-1", "facebook", "fb-token");
    creds.expires_at = Some(token::now() - 10);
    db.save_credentials(&creds).await?;

    let mut post = Post::new("user-1", "refresh", &["facebook"]);
    db.create_post(&post).await?;
    poster.publish(&mut post).await;

    let stored = db
        .get_credentials("user-1", "facebook")
        .await?
        .expect("credential exists");
    assert_eq!(stored.access_token, "fb-token-refreshed");
    assert_eq!(stored.expires_at, Some(new_expiry));

    Ok(())
}

#[tokio::test]
async fn test_expired_twitter_fails_whole_post() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let config = libcrosspost::config::TwitterConfig::default();
    let registry = PlatformRegistry::new()
        .with(MockPlatform::success("facebook"))
        .with(libcrosspost::platforms::TwitterPlatform::new(&config)?);
    let poster = poster_for(registry, &db);

    let mut expired = PlatformCredentials::new("user-1", "twitter", "tw-token");
    expired.expires_at = Some(token::now() - 3600);
    db.save_credentials(&expired).await?;

    let mut post = Post::new("user-1", "two networks", &["facebook", "twitter"]);
    db.create_post(&post).await?;
    let results = poster.publish(&mut post).await;

    assert_eq!(results.len(), 2);
    assert!(results[0].success);
    assert!(!results[1].success);
    assert_eq!(
        results[1].message,
        "Twitter token has expired. Please reconnect your account via OAuth"
    );

    let stored = db.get_post(&post.id).await?.expect("post exists");
    assert_eq!(stored.status.as_str(), "failed");

    Ok(())
}

#[tokio::test]
async fn test_linkedin_through_orchestrator() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let registry = PlatformRegistry::new().with(LinkedInPlatform::new());
    let poster = poster_for(registry, &db);

    db.save_credentials(&PlatformCredentials::new("user-1", "linkedin", "li-token"))
        .await?;

    let mut post = Post::new("user-1", "Open roles", &["linkedin"]);
    db.create_post(&post).await?;
    let results = poster.publish(&mut post).await;

    assert!(results[0].success);
    assert!(results[0]
        .external_post_id
        .as_deref()
        .is_some_and(|id| id.starts_with("li_")));
    assert_eq!(post.status, PostStatus::Published);

    Ok(())
}

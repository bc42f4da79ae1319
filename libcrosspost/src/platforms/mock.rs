//! Mock platform implementation for testing
//!
//! A configurable [`Platform`] that can succeed, fail, stall, panic, or
//! rewrite the credentials it is handed. Integration tests use it to drive
//! the orchestrator and scheduler without network access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::platforms::Platform;
use crate::types::{PlatformCredentials, Post, PublishResult};

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Registry name (e.g. "twitter", "mock-a")
    pub name: String,

    /// Whether publishing should succeed
    pub succeeds: bool,

    /// Message reported on failure
    pub failure_message: String,

    /// Delay before completing (simulates network latency)
    pub delay: Duration,

    /// Panic inside `publish` instead of returning
    pub panics: bool,

    /// Require credentials the way real adapters do
    pub requires_credentials: bool,

    /// Overwrite the credential expiry with this value, as a token refresh would
    pub refresh_expiry_to: Option<i64>,

    /// Number of times publish has been called
    pub call_count: Arc<Mutex<usize>>,

    /// Credentials seen by each call, in call order
    pub seen_credentials: Arc<Mutex<Vec<Option<PlatformCredentials>>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            succeeds: true,
            failure_message: "Mock publishing failed".to_string(),
            delay: Duration::from_millis(0),
            panics: false,
            requires_credentials: false,
            refresh_expiry_to: None,
            call_count: Arc::new(Mutex::new(0)),
            seen_credentials: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock platform for testing
#[derive(Debug, Clone)]
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock platform that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock platform that always fails with `message`
    pub fn failure(name: &str, message: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            succeeds: false,
            failure_message: message.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock platform with a delay
    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    /// Create a mock platform whose publish panics
    pub fn panicking(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            panics: true,
            ..Default::default()
        })
    }

    /// Fail with "Missing credentials" when none are passed
    pub fn requiring_credentials(mut self) -> Self {
        self.config.requires_credentials = true;
        self
    }

    /// Rewrite `expires_at` on the passed credentials before succeeding
    pub fn refreshing_to(mut self, expires_at: i64) -> Self {
        self.config.refresh_expiry_to = Some(expires_at);
        self
    }

    /// Get the number of times publish was called
    pub fn call_count(&self) -> usize {
        *self.config.call_count.lock().unwrap()
    }

    /// Get the credentials passed to each publish call
    pub fn seen_credentials(&self) -> Vec<Option<PlatformCredentials>> {
        self.config.seen_credentials.lock().unwrap().clone()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn publish(
        &self,
        post: &Post,
        credentials: Option<&mut PlatformCredentials>,
    ) -> PublishResult {
        *self.config.call_count.lock().unwrap() += 1;
        self.config
            .seen_credentials
            .lock()
            .unwrap()
            .push(credentials.as_deref().cloned());

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if self.config.panics {
            panic!("mock platform {} panicked", self.config.name);
        }

        let credentials = match credentials {
            Some(creds) => Some(creds),
            None if self.config.requires_credentials => {
                return PublishResult::failure(&self.config.name, "Missing credentials");
            }
            None => None,
        };

        if let (Some(creds), Some(expires_at)) = (credentials, self.config.refresh_expiry_to) {
            creds.access_token = format!("{}-refreshed", creds.access_token);
            creds.expires_at = Some(expires_at);
        }

        if self.config.succeeds {
            let external_id = format!("{}:mock-{}", self.config.name, post.id);
            PublishResult::success(&self.config.name, "Published successfully", external_id)
        } else {
            PublishResult::failure(&self.config.name, self.config.failure_message.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_success() {
        let platform = MockPlatform::success("test");
        let post = Post::new("u", "Test content", &["test"]);

        let result = platform.publish(&post, None).await;
        assert!(result.success);
        assert_eq!(result.platform, "test");
        assert_eq!(
            result.external_post_id,
            Some(format!("test:mock-{}", post.id))
        );
        assert_eq!(platform.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let platform = MockPlatform::failure("test", "Network error");
        let post = Post::new("u", "Test", &["test"]);

        let result = platform.publish(&post, None).await;
        assert!(!result.success);
        assert_eq!(result.message, "Network error");
        assert!(result.external_post_id.is_none());
    }

    #[tokio::test]
    async fn test_mock_with_delay() {
        let platform = MockPlatform::with_delay("test", Duration::from_millis(50));
        let post = Post::new("u", "Test", &["test"]);

        let start = std::time::Instant::now();
        platform.publish(&post, None).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_mock_requiring_credentials() {
        let platform = MockPlatform::success("test").requiring_credentials();
        let post = Post::new("u", "Test", &["test"]);

        let result = platform.publish(&post, None).await;
        assert_eq!(result.message, "Missing credentials");
    }

    #[tokio::test]
    async fn test_mock_refresh_rewrites_credentials() {
        let platform = MockPlatform::success("test").refreshing_to(4_000_000_000);
        let post = Post::new("u", "Test", &["test"]);
        let mut creds = PlatformCredentials::new("u", "test", "tok");

        let result = platform.publish(&post, Some(&mut creds)).await;
        assert!(result.success);
        assert_eq!(creds.access_token, "tok-refreshed");
        assert_eq!(creds.expires_at, Some(4_000_000_000));

        let seen = platform.seen_credentials();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].as_ref().unwrap().access_token, "tok");
    }
}

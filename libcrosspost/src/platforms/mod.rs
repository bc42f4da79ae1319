//! Platform adapters
//!
//! Every social network is reached through one [`Platform`] implementation
//! that owns that network's whole publish protocol: credential checks,
//! content rules, uploads, and any asynchronous completion polling. The
//! orchestrator only ever sees the uniform [`PublishResult`].
//!
//! Adapters are looked up by name in a [`PlatformRegistry`], so adding a
//! network means adding one type and one registration.
//!
//! # Examples
//!
//! ```no_run
//! use libcrosspost::config::Config;
//! use libcrosspost::platforms::create_platforms;
//! use libcrosspost::types::{PlatformCredentials, Post};
//!
//! # async fn example() -> libcrosspost::error::Result<()> {
//! let registry = create_platforms(&Config::load()?)?;
//! let post = Post::new("user-1", "Hello from everywhere", &["linkedin"]);
//! let mut creds = PlatformCredentials::new("user-1", "linkedin", "token");
//!
//! if let Some(linkedin) = registry.get("linkedin") {
//!     let result = linkedin.publish(&post, Some(&mut creds)).await;
//!     println!("{}: {}", result.platform, result.message);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::token;
use crate::types::{PlatformCredentials, Post, PublishResult};

pub mod facebook;
pub(crate) mod http;
pub mod instagram;
pub mod linkedin;
pub mod tiktok;
pub mod twitter;
pub mod youtube;

// Available outside tests so integration tests can drive the orchestrator
pub mod mock;

pub use facebook::FacebookPlatform;
pub use instagram::InstagramPlatform;
pub use linkedin::LinkedInPlatform;
pub use tiktok::TikTokPlatform;
pub use twitter::TwitterPlatform;
pub use youtube::YouTubePlatform;

/// A single social network's publish protocol
#[async_trait]
pub trait Platform: Send + Sync {
    /// Lowercase registry key, e.g. `"twitter"`
    fn name(&self) -> &str;

    /// Publish `post` and report the outcome
    ///
    /// Never returns an error: every failure, from missing credentials to a
    /// platform-side processing error, becomes a failed [`PublishResult`].
    /// Adapters that refresh tokens update `credentials` in place, and the
    /// caller persists the new value.
    async fn publish(
        &self,
        post: &Post,
        credentials: Option<&mut PlatformCredentials>,
    ) -> PublishResult;
}

/// Name-to-adapter lookup consulted by the orchestrator
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    adapters: HashMap<String, Arc<dyn Platform>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own name, replacing any previous one
    pub fn register(&mut self, adapter: Arc<dyn Platform>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn with(mut self, adapter: impl Platform + 'static) -> Self {
        self.register(Arc::new(adapter));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Platform>> {
        self.adapters.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Build a registry holding every platform enabled in `config`
pub fn create_platforms(config: &Config) -> Result<PlatformRegistry> {
    let platforms = &config.platforms;
    let mut registry = PlatformRegistry::new();

    if platforms.twitter.enabled {
        registry.register(Arc::new(TwitterPlatform::new(&platforms.twitter)?));
    }
    if platforms.facebook.enabled {
        registry.register(Arc::new(FacebookPlatform::new(&platforms.facebook)?));
    }
    if platforms.instagram.enabled {
        registry.register(Arc::new(InstagramPlatform::new(&platforms.instagram)?));
    }
    if platforms.tiktok.enabled {
        registry.register(Arc::new(TikTokPlatform::new(&platforms.tiktok)?));
    }
    if platforms.youtube.enabled {
        registry.register(Arc::new(YouTubePlatform::new(&platforms.youtube)?));
    }
    if platforms.linkedin.enabled {
        registry.register(Arc::new(LinkedInPlatform::new()));
    }

    tracing::debug!(platforms = ?registry.names(), "Platform adapters registered");
    Ok(registry)
}

/// Credentials that are present and carry a non-blank access token
pub(crate) fn usable(
    credentials: Option<&mut PlatformCredentials>,
) -> Option<&mut PlatformCredentials> {
    credentials.filter(|c| c.has_access_token())
}

pub(crate) fn missing_credentials(display_name: &str) -> String {
    format!("Missing {} credentials", display_name)
}

pub(crate) fn token_expired(display_name: &str) -> String {
    format!(
        "{} token has expired. Please reconnect your account via OAuth",
        display_name
    )
}

/// Standard credential gate: present, non-blank, and not about to expire
pub(crate) fn check_credentials<'a>(
    platform: &str,
    display_name: &str,
    credentials: Option<&'a mut PlatformCredentials>,
) -> std::result::Result<&'a mut PlatformCredentials, PublishResult> {
    let Some(creds) = usable(credentials) else {
        tracing::warn!(platform, "No usable credentials");
        return Err(PublishResult::failure(
            platform,
            missing_credentials(display_name),
        ));
    };

    if token::is_expired(creds, token::now()) {
        tracing::warn!(platform, expires_at = ?creds.expires_at, "Access token expired");
        return Err(PublishResult::failure(platform, token_expired(display_name)));
    }

    Ok(creds)
}

pub const UNTITLED: &str = "Untitled";

/// Build a title of at most `limit` characters
///
/// The text is truncated to `limit` Unicode scalar values first. `suffix`
/// is appended only when it still fits. Text that is empty after trimming
/// falls back to [`UNTITLED`].
pub fn fit_title(text: &str, limit: usize, suffix: Option<&str>) -> String {
    let truncated: String = text.chars().take(limit).collect();
    let trimmed = truncated.trim();

    let mut title = if trimmed.is_empty() {
        UNTITLED.chars().take(limit).collect()
    } else {
        trimmed.to_string()
    };

    if let Some(suffix) = suffix {
        if title.chars().count() + suffix.chars().count() <= limit {
            title.push_str(suffix);
        }
    }

    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockPlatform;

    #[test]
    fn test_fit_title_short_text_gets_suffix() {
        assert_eq!(fit_title("Launch", 100, Some(" #Shorts")), "Launch #Shorts");
    }

    #[test]
    fn test_fit_title_drops_suffix_when_it_would_overflow() {
        let text = "a".repeat(100);
        let title = fit_title(&text, 100, Some(" #Shorts"));
        assert_eq!(title, text);
    }

    #[test]
    fn test_fit_title_counts_characters_not_bytes() {
        let text = "é".repeat(120);
        let title = fit_title(&text, 100, None);
        assert_eq!(title.chars().count(), 100);
        assert!(title.len() > 100);
    }

    #[test]
    fn test_fit_title_empty_and_whitespace_fall_back() {
        assert_eq!(fit_title("", 100, None), "Untitled");
        assert_eq!(fit_title("   \n\t", 150, None), "Untitled");
        assert_eq!(fit_title("", 100, Some(" #Shorts")), "Untitled #Shorts");
    }

    #[test]
    fn test_fit_title_never_exceeds_limit() {
        let long = "x y z ".repeat(40);
        let inputs = [
            "",
            " ",
            "short",
            "日本語のタイトルです。とても長いタイトルになるかもしれません",
            "emoji 🎬🎬🎬🎬🎬🎬🎬🎬🎬🎬🎬🎬",
            long.as_str(),
        ];
        for text in inputs {
            for limit in [0usize, 1, 5, 8, 9, 16, 100, 150] {
                for suffix in [None, Some(" #Shorts")] {
                    let title = fit_title(text, limit, suffix);
                    assert!(
                        title.chars().count() <= limit,
                        "{:?} with limit {} produced {:?}",
                        text,
                        limit,
                        title
                    );
                }
            }
        }
    }

    #[test]
    fn test_registry_lookup_by_name() {
        let registry = PlatformRegistry::new()
            .with(MockPlatform::success("twitter"))
            .with(MockPlatform::success("facebook"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["facebook", "twitter"]);
        assert!(registry.get("twitter").is_some());
        assert!(registry.get("myspace").is_none());
    }

    #[test]
    fn test_create_platforms_honors_enabled_flags() {
        let mut config = Config::default_config();
        config.platforms.tiktok.enabled = false;

        let registry = create_platforms(&config).unwrap();
        assert_eq!(
            registry.names(),
            vec!["facebook", "instagram", "linkedin", "twitter", "youtube"]
        );
    }

    #[test]
    fn test_check_credentials_gates() {
        let mut blank = PlatformCredentials::new("u", "twitter", "");
        let err = check_credentials("twitter", "Twitter", Some(&mut blank)).unwrap_err();
        assert_eq!(err.message, "Missing Twitter credentials");

        let err = check_credentials("twitter", "Twitter", None).unwrap_err();
        assert_eq!(err.message, "Missing Twitter credentials");

        let mut expired = PlatformCredentials::new("u", "twitter", "tok");
        expired.expires_at = Some(token::now() + 30);
        let err = check_credentials("twitter", "Twitter", Some(&mut expired)).unwrap_err();
        assert_eq!(
            err.message,
            "Twitter token has expired. Please reconnect your account via OAuth"
        );

        let mut fresh = PlatformCredentials::new("u", "twitter", "tok");
        assert!(check_credentials("twitter", "Twitter", Some(&mut fresh)).is_ok());
    }
}

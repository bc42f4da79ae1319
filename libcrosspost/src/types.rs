//! Core types for Crosspost

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Shape of a post, which decides the protocol path each platform takes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    #[default]
    Normal,
    /// Short-form vertical video (Reels, Shorts, TikTok)
    Short,
    Story,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Short => "short",
            Self::Story => "story",
        }
    }
}

impl FromStr for PostType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "short" => Ok(Self::Short),
            "story" => Ok(Self::Story),
            _ => Err(format!(
                "Invalid post type: '{}'. Valid options: normal, short, story",
                s
            )),
        }
    }
}

impl std::fmt::Display for PostType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a post
///
/// `scheduled -> publishing -> published | failed`. Drafts never leave
/// the draft state on their own.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Publishing,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Publishing => "publishing",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "scheduled" => Ok(Self::Scheduled),
            "publishing" => Ok(Self::Publishing),
            "published" => Ok(Self::Published),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Unknown post status: '{}'", other)),
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a declared MIME type. Anything that is not `video/*` is
    /// treated as an image.
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.to_ascii_lowercase().starts_with("video/") {
            Self::Video
        } else {
            Self::Image
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(format!("Unknown media kind: '{}'", other)),
        }
    }
}

/// A media file already stored on local disk
///
/// Media is immutable once created; posts reference it by id. The
/// declared MIME type and size are trusted as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Media {
    pub id: String,
    pub user_id: String,
    /// Absolute path to the file on disk
    pub path: PathBuf,
    /// Publicly reachable URL, needed by platforms that fetch media themselves
    pub url: Option<String>,
    pub mime_type: String,
    /// File size in bytes
    pub size: u64,
    pub kind: MediaKind,
    pub created_at: i64,
}

impl Media {
    pub fn new(user_id: &str, path: impl Into<PathBuf>, mime_type: &str, size: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            path: path.into(),
            url: None,
            mime_type: mime_type.to_string(),
            size,
            kind: MediaKind::from_mime(mime_type),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    pub fn is_image(&self) -> bool {
        self.kind == MediaKind::Image
    }

    /// File name used for multipart uploads
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub post_type: PostType,
    /// Target platform names, in the order results are reported
    pub platforms: Vec<String>,
    /// Attached media, resolved from media ids by the store
    pub media: Vec<Media>,
    pub status: PostStatus,
    pub scheduled_for: Option<i64>,
    pub published_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Post {
    pub fn new(user_id: &str, content: &str, platforms: &[&str]) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            post_type: PostType::Normal,
            platforms: platforms.iter().map(|p| p.to_string()).collect(),
            media: Vec::new(),
            status: PostStatus::Draft,
            scheduled_for: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_post_type(mut self, post_type: PostType) -> Self {
        self.post_type = post_type;
        self
    }

    pub fn with_media(mut self, media: Vec<Media>) -> Self {
        self.media = media;
        self
    }

    /// Mark the post as scheduled for the given unix timestamp
    pub fn scheduled_at(mut self, when: i64) -> Self {
        self.status = PostStatus::Scheduled;
        self.scheduled_for = Some(when);
        self
    }

    pub fn images(&self) -> impl Iterator<Item = &Media> {
        self.media.iter().filter(|m| m.is_image())
    }

    pub fn videos(&self) -> impl Iterator<Item = &Media> {
        self.media.iter().filter(|m| m.is_video())
    }

    pub fn first_video(&self) -> Option<&Media> {
        self.videos().next()
    }

    pub fn media_ids(&self) -> Vec<String> {
        self.media.iter().map(|m| m.id.clone()).collect()
    }
}

/// OAuth credential for one (user, platform) pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PlatformCredentials {
    pub user_id: String,
    pub platform: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    /// Expiry as a unix timestamp; `None` means the token does not expire
    pub expires_at: Option<i64>,
    /// Platform-side account id (Instagram Business Account, etc.)
    pub platform_user_id: Option<String>,
    /// Facebook Page or YouTube channel id
    pub platform_page_id: Option<String>,
}

impl PlatformCredentials {
    pub fn new(user_id: &str, platform: &str, access_token: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            platform: platform.to_string(),
            access_token: access_token.to_string(),
            token_type: "Bearer".to_string(),
            ..Default::default()
        }
    }

    pub fn has_access_token(&self) -> bool {
        !self.access_token.trim().is_empty()
    }
}

/// Outcome of one publish attempt on one platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishResult {
    pub platform: String,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_post_id: Option<String>,
}

impl PublishResult {
    pub fn success(platform: &str, message: impl Into<String>, external_post_id: String) -> Self {
        Self {
            platform: platform.to_string(),
            success: true,
            message: message.into(),
            external_post_id: Some(external_post_id),
        }
    }

    pub fn failure(platform: &str, message: impl Into<String>) -> Self {
        Self {
            platform: platform.to_string(),
            success: false,
            message: message.into(),
            external_post_id: None,
        }
    }
}

/// What a caller sees after publishing one post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishOutcome {
    pub post_id: String,
    pub results: Vec<PublishResult>,
}

impl PublishOutcome {
    pub fn all_succeeded(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.success)
    }
}

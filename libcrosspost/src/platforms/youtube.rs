//! YouTube adapter using the resumable upload protocol
//!
//! The metadata POST opens an upload session whose URI comes back in the
//! `Location` header; the video bytes are then PUT to that URI and the
//! response carries the final video resource.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info};

use super::http;
use super::{check_credentials, fit_title, Platform};
use crate::config::YouTubeConfig;
use crate::error::{PlatformError, Result};
use crate::types::{Media, PlatformCredentials, Post, PostType, PublishResult};

const NAME: &str = "youtube";
const DISPLAY_NAME: &str = "YouTube";
pub const TITLE_LIMIT: usize = 100;
pub const SHORTS_SUFFIX: &str = " #Shorts";

pub struct YouTubePlatform {
    http: Client,
    config: YouTubeConfig,
}

#[derive(Debug, Deserialize)]
struct VideoResource {
    id: String,
}

impl YouTubePlatform {
    pub fn new(config: &YouTubeConfig) -> Result<Self> {
        Ok(Self {
            http: http::build_client(config.timeout_secs)?,
            config: config.clone(),
        })
    }

    /// Snippet/status body for the upload session
    fn video_metadata(&self, post: &Post) -> serde_json::Value {
        let is_short = post.post_type == PostType::Short;
        let title = fit_title(
            &post.content,
            TITLE_LIMIT,
            is_short.then_some(SHORTS_SUFFIX),
        );
        let tags: Vec<&str> = if is_short { vec!["Shorts"] } else { Vec::new() };

        serde_json::json!({
            "snippet": {
                "title": title,
                "description": post.content,
                "tags": tags,
                "categoryId": self.config.category_id
            },
            "status": {
                "privacyStatus": self.config.privacy_status,
                "selfDeclaredMadeForKids": false
            }
        })
    }

    async fn start_session(
        &self,
        token: &str,
        post: &Post,
        video: &Media,
        size: u64,
    ) -> std::result::Result<String, PlatformError> {
        let resp = self
            .http
            .post(format!(
                "{}/upload/youtube/v3/videos",
                self.config.upload_base
            ))
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(token)
            .header("X-Upload-Content-Type", video.mime_type.as_str())
            .header("X-Upload-Content-Length", size)
            .json(&self.video_metadata(post))
            .send()
            .await?;

        let location = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        http::success_body(resp, error_envelope).await?;

        location.ok_or_else(|| {
            PlatformError::InvalidResponse(
                "YouTube did not return an upload session URI".to_string(),
            )
        })
    }

    async fn run(
        &self,
        post: &Post,
        token: &str,
        video: &Media,
    ) -> std::result::Result<String, PlatformError> {
        let (file, size) = http::open_media(&video.path).await?;
        let session_uri = self.start_session(token, post, video, size).await?;
        debug!(%session_uri, size, "YouTube upload session opened");

        let resp = self
            .http
            .put(&session_uri)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, video.mime_type.as_str())
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(reqwest::Body::from(file))
            .send()
            .await?;
        let uploaded: VideoResource = http::read_json(resp, error_envelope).await?;
        Ok(uploaded.id)
    }
}

/// `error.message`, then `error.errors[0].message`
fn error_envelope(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| {
            error
                .get("errors")
                .and_then(|e| e.get(0))
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
        })
        .map(str::to_string)
}

#[async_trait]
impl Platform for YouTubePlatform {
    fn name(&self) -> &str {
        NAME
    }

    async fn publish(
        &self,
        post: &Post,
        credentials: Option<&mut PlatformCredentials>,
    ) -> PublishResult {
        let creds = match check_credentials(NAME, DISPLAY_NAME, credentials) {
            Ok(creds) => creds,
            Err(result) => return result,
        };

        let Some(video) = post.first_video() else {
            return PublishResult::failure(NAME, "YouTube requires a video attachment");
        };

        match self.run(post, &creds.access_token, video).await {
            Ok(video_id) => {
                info!(post_id = %post.id, %video_id, "Published to YouTube");
                let message = if post.post_type == PostType::Short {
                    "Published successfully as YouTube Short"
                } else {
                    "Published successfully on YouTube"
                };
                PublishResult::success(NAME, message, video_id)
            }
            Err(e) => {
                error!(post_id = %post.id, error = %e, "YouTube publish failed");
                PublishResult::failure(NAME, format!("Error publishing to YouTube: {}", e))
            }
        }
    }
}

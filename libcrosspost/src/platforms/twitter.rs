//! Twitter/X adapter
//!
//! Images go through the simple multipart upload. Video uses the chunked
//! INIT / APPEND / FINALIZE protocol, then polls STATUS until the media is
//! processed. The tweet itself is created through the v2 API.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

use super::http::{self, PollState};
use super::{check_credentials, Platform};
use crate::config::TwitterConfig;
use crate::error::{PlatformError, Result};
use crate::types::{Media, PlatformCredentials, Post, PostType, PublishResult};

const NAME: &str = "twitter";
const DISPLAY_NAME: &str = "Twitter";
const MAX_IMAGES: usize = 4;

pub struct TwitterPlatform {
    http: Client,
    config: TwitterConfig,
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    media_id_string: String,
    #[serde(default)]
    processing_info: Option<ProcessingInfo>,
}

#[derive(Debug, Deserialize)]
struct ProcessingInfo {
    state: String,
    #[serde(default)]
    check_after_secs: Option<u64>,
    #[serde(default)]
    error: Option<ProcessingError>,
}

#[derive(Debug, Deserialize)]
struct ProcessingError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

impl TwitterPlatform {
    pub fn new(config: &TwitterConfig) -> Result<Self> {
        Ok(Self {
            http: http::build_client(config.timeout_secs)?,
            config: config.clone(),
        })
    }

    fn upload_url(&self) -> String {
        format!("{}/1.1/media/upload.json", self.config.upload_base)
    }

    fn check_content(post: &Post) -> std::result::Result<(), String> {
        if post.post_type == PostType::Short {
            return Err(
                "Twitter does not support short-form video posts. Use post_type 'normal' instead"
                    .to_string(),
            );
        }

        let images = post.images().count();
        let videos = post.videos().count();
        if (videos > 0 && images > 0) || videos > 1 || images > MAX_IMAGES {
            return Err(format!(
                "Twitter supports up to {} images or a single video per post",
                MAX_IMAGES
            ));
        }

        Ok(())
    }

    async fn upload_image(
        &self,
        token: &str,
        media: &Media,
    ) -> std::result::Result<String, PlatformError> {
        let bytes = http::read_media(&media.path).await?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(media.file_name())
            .mime_str(&media.mime_type)
            .map_err(|e| PlatformError::Media(format!("Invalid mime type: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("media", part);

        let resp = self
            .http
            .post(self.upload_url())
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;

        let uploaded: MediaUploadResponse = http::read_json(resp, error_envelope).await?;
        debug!(media_id = %uploaded.media_id_string, "Uploaded image to Twitter");
        Ok(uploaded.media_id_string)
    }

    async fn upload_video(
        &self,
        token: &str,
        media: &Media,
    ) -> std::result::Result<String, PlatformError> {
        let (mut file, total_bytes) = http::open_media(&media.path).await?;

        // INIT
        let total = total_bytes.to_string();
        let resp = self
            .http
            .post(self.upload_url())
            .bearer_auth(token)
            .form(&[
                ("command", "INIT"),
                ("media_type", media.mime_type.as_str()),
                ("total_bytes", total.as_str()),
                ("media_category", "tweet_video"),
            ])
            .send()
            .await?;
        let init: MediaUploadResponse = http::read_json(resp, error_envelope).await?;
        let media_id = init.media_id_string;
        debug!(%media_id, total_bytes, "Twitter chunked upload initialized");

        // APPEND
        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        let mut segment_index = 0u32;
        loop {
            let n = http::read_chunk(&mut file, &mut buf).await?;
            if n == 0 {
                break;
            }
            let encoded = base64::engine::general_purpose::STANDARD.encode(&buf[..n]);
            let segment = segment_index.to_string();
            let resp = self
                .http
                .post(self.upload_url())
                .bearer_auth(token)
                .form(&[
                    ("command", "APPEND"),
                    ("media_id", media_id.as_str()),
                    ("segment_index", segment.as_str()),
                    ("media_data", encoded.as_str()),
                ])
                .send()
                .await?;
            http::success_body(resp, error_envelope).await?;
            debug!(%media_id, segment_index, bytes = n, "Appended segment");
            segment_index += 1;
        }
        drop(file);

        // FINALIZE
        let resp = self
            .http
            .post(self.upload_url())
            .bearer_auth(token)
            .form(&[("command", "FINALIZE"), ("media_id", media_id.as_str())])
            .send()
            .await?;
        let finalized: MediaUploadResponse = http::read_json(resp, error_envelope).await?;

        match classify(finalized.processing_info) {
            PollState::Ready(()) => {}
            PollState::Failed(message) => return Err(PlatformError::Processing(message)),
            PollState::Pending { retry_after } => {
                if let Some(wait) = retry_after {
                    tokio::time::sleep(wait).await;
                }
                self.await_processing(token, &media_id).await?;
            }
        }

        Ok(media_id)
    }

    async fn check_status(
        &self,
        token: &str,
        media_id: &str,
    ) -> std::result::Result<PollState<()>, PlatformError> {
        let resp = self
            .http
            .get(self.upload_url())
            .bearer_auth(token)
            .query(&[("command", "STATUS"), ("media_id", media_id)])
            .send()
            .await?;
        let status: MediaUploadResponse = http::read_json(resp, error_envelope).await?;
        Ok(classify(status.processing_info))
    }

    async fn await_processing(
        &self,
        token: &str,
        media_id: &str,
    ) -> std::result::Result<(), PlatformError> {
        http::poll_until(
            &self.config.status_poll,
            "Twitter media processing",
            |_| self.check_status(token, media_id),
        )
        .await
    }

    async fn create_tweet(
        &self,
        token: &str,
        text: &str,
        media_ids: &[String],
    ) -> std::result::Result<String, PlatformError> {
        let mut body = serde_json::json!({ "text": text });
        if !media_ids.is_empty() {
            body["media"] = serde_json::json!({ "media_ids": media_ids });
        }

        let resp = self
            .http
            .post(format!("{}/2/tweets", self.config.api_base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let tweet: TweetResponse = http::read_json(resp, error_envelope).await?;
        Ok(tweet.data.id)
    }

    async fn run(
        &self,
        post: &Post,
        credentials: &PlatformCredentials,
    ) -> std::result::Result<String, PlatformError> {
        let token = credentials.access_token.as_str();
        let mut media_ids = Vec::with_capacity(post.media.len());

        for media in &post.media {
            let id = if media.is_video() {
                self.upload_video(token, media).await?
            } else {
                self.upload_image(token, media).await?
            };
            media_ids.push(id);
        }

        self.create_tweet(token, &post.content, &media_ids).await
    }
}

/// Map `processing_info` onto a poll state. Missing info means done.
fn classify(info: Option<ProcessingInfo>) -> PollState<()> {
    let Some(info) = info else {
        return PollState::Ready(());
    };

    match info.state.as_str() {
        "succeeded" => PollState::Ready(()),
        "failed" => PollState::Failed(
            info.error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "Twitter media processing failed".to_string()),
        ),
        _ => PollState::Pending {
            retry_after: info
                .check_after_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        },
    }
}

/// `detail`, then `title`, then `errors[0].message`
fn error_envelope(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["detail", "title"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .or_else(|| {
            value
                .get("errors")
                .and_then(|e| e.get(0))
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
        })
        .map(str::to_string)
}

#[async_trait]
impl Platform for TwitterPlatform {
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

        if let Err(message) = Self::check_content(post) {
            return PublishResult::failure(NAME, message);
        }

        match self.run(post, creds).await {
            Ok(tweet_id) => {
                info!(post_id = %post.id, %tweet_id, "Published to Twitter");
                PublishResult::success(NAME, "Published successfully on Twitter", tweet_id)
            }
            Err(e) => {
                error!(post_id = %post.id, error = %e, "Twitter publish failed");
                PublishResult::failure(NAME, format!("Error publishing to Twitter: {}", e))
            }
        }
    }
}

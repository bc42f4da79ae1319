//! TikTok direct-post adapter
//!
//! Flow: query the creator's allowed privacy levels, init a single-chunk
//! file upload, PUT the bytes to the returned URL, then poll the publish
//! status until TikTok reports completion or failure.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::http::{self, PollState};
use super::{check_credentials, fit_title, Platform};
use crate::config::TikTokConfig;
use crate::error::{PlatformError, Result};
use crate::types::{Media, PlatformCredentials, Post, PostType, PublishResult};

const NAME: &str = "tiktok";
const DISPLAY_NAME: &str = "TikTok";
pub const TITLE_LIMIT: usize = 150;

/// Privacy levels from most to least private
const PRIVACY_LEVELS: [&str; 4] = [
    "SELF_ONLY",
    "FOLLOWER_OF_CREATOR",
    "MUTUAL_FOLLOW_FRIENDS",
    "PUBLIC_TO_EVERYONE",
];

pub struct TikTokPlatform {
    http: Client,
    config: TikTokConfig,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CreatorInfo {
    #[serde(default)]
    privacy_level_options: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct InitData {
    publish_id: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    status: String,
    #[serde(default)]
    fail_reason: Option<String>,
    #[serde(default)]
    publicaly_available_post_id: Vec<serde_json::Value>,
}

impl<T> Envelope<T> {
    /// TikTok answers 200 with `error.code != "ok"` for logical failures
    fn into_data(self) -> std::result::Result<T, PlatformError> {
        if let Some(err) = self.error {
            if !err.code.is_empty() && err.code != "ok" {
                return Err(PlatformError::Api {
                    status: 200,
                    message: if err.message.is_empty() {
                        err.code
                    } else {
                        err.message
                    },
                });
            }
        }
        self.data
            .ok_or_else(|| PlatformError::InvalidResponse("TikTok response had no data".to_string()))
    }
}

/// Pick the privacy level to post with
///
/// The requested level is used when the creator may use it. Otherwise the
/// most private level on offer wins, and `SELF_ONLY` when nothing usable is
/// offered.
pub fn choose_privacy_level(requested: &str, options: &[String]) -> String {
    if options.iter().any(|o| o == requested) {
        return requested.to_string();
    }

    PRIVACY_LEVELS
        .iter()
        .find(|level| options.iter().any(|o| o == *level))
        .unwrap_or(&PRIVACY_LEVELS[0])
        .to_string()
}

impl TikTokPlatform {
    pub fn new(config: &TikTokConfig) -> Result<Self> {
        Ok(Self {
            http: http::build_client(config.timeout_secs)?,
            config: config.clone(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v2/post/publish/{}/", self.config.api_base, path)
    }

    fn check_content(post: &Post) -> std::result::Result<&Media, String> {
        if post.post_type != PostType::Short {
            return Err(
                "TikTok only supports short-form video posts (post_type must be 'short')"
                    .to_string(),
            );
        }
        post.first_video()
            .ok_or_else(|| "TikTok requires a video attachment".to_string())
    }

    async fn creator_privacy_options(
        &self,
        token: &str,
    ) -> std::result::Result<Vec<String>, PlatformError> {
        let resp = self
            .http
            .post(self.api_url("creator_info/query"))
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let envelope: Envelope<CreatorInfo> = http::read_json(resp, error_envelope).await?;
        Ok(envelope.into_data()?.privacy_level_options)
    }

    async fn privacy_level(&self, token: &str) -> String {
        match self.creator_privacy_options(token).await {
            Ok(options) => {
                let chosen = choose_privacy_level(&self.config.privacy_level, &options);
                if chosen != self.config.privacy_level {
                    warn!(
                        requested = %self.config.privacy_level,
                        %chosen,
                        "Requested TikTok privacy level unavailable"
                    );
                }
                chosen
            }
            Err(e) => {
                warn!(error = %e, "TikTok creator info query failed, posting privately");
                PRIVACY_LEVELS[0].to_string()
            }
        }
    }

    async fn check_status(
        &self,
        token: &str,
        publish_id: &str,
    ) -> std::result::Result<PollState<String>, PlatformError> {
        let resp = self
            .http
            .post(self.api_url("status/fetch"))
            .bearer_auth(token)
            .json(&serde_json::json!({ "publish_id": publish_id }))
            .send()
            .await?;
        let envelope: Envelope<StatusData> = http::read_json(resp, error_envelope).await?;
        let status = envelope.into_data()?;

        Ok(match status.status.as_str() {
            "PUBLISH_COMPLETE" => {
                let post_id = status
                    .publicaly_available_post_id
                    .first()
                    .map(|id| match id {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| publish_id.to_string());
                PollState::Ready(post_id)
            }
            "FAILED" => PollState::Failed(format!(
                "TikTok publish failed: {}",
                status.fail_reason.as_deref().unwrap_or("unknown reason")
            )),
            _ => PollState::Pending { retry_after: None },
        })
    }

    async fn run(
        &self,
        post: &Post,
        token: &str,
        video: &Media,
    ) -> std::result::Result<String, PlatformError> {
        let privacy_level = self.privacy_level(token).await;
        let (file, size) = http::open_media(&video.path).await?;

        let init_body = serde_json::json!({
            "post_info": {
                "title": fit_title(&post.content, TITLE_LIMIT, None),
                "privacy_level": privacy_level,
                "disable_duet": false,
                "disable_comment": false,
                "disable_stitch": false,
                "video_cover_timestamp_ms": 1000
            },
            "source_info": {
                "source": "FILE_UPLOAD",
                "video_size": size,
                "chunk_size": size,
                "total_chunk_count": 1
            }
        });
        let resp = self
            .http
            .post(self.api_url("video/init"))
            .bearer_auth(token)
            .json(&init_body)
            .send()
            .await?;
        let envelope: Envelope<InitData> = http::read_json(resp, error_envelope).await?;
        let init = envelope.into_data()?;
        debug!(publish_id = %init.publish_id, %privacy_level, "TikTok upload initialized");

        let last_byte = size.saturating_sub(1);
        let resp = self
            .http
            .put(&init.upload_url)
            .header(reqwest::header::CONTENT_TYPE, video.mime_type.as_str())
            .header(
                reqwest::header::CONTENT_RANGE,
                format!("bytes 0-{}/{}", last_byte, size),
            )
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(reqwest::Body::from(file))
            .send()
            .await?;
        http::success_body(resp, error_envelope).await?;

        http::poll_until(&self.config.status_poll, "TikTok publish", |_| {
            self.check_status(token, &init.publish_id)
        })
        .await
    }
}

fn error_envelope(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Platform for TikTokPlatform {
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

        let video = match Self::check_content(post) {
            Ok(video) => video,
            Err(message) => return PublishResult::failure(NAME, message),
        };

        match self.run(post, &creds.access_token, video).await {
            Ok(post_id) => {
                info!(post_id = %post.id, tiktok_id = %post_id, "Published to TikTok");
                PublishResult::success(NAME, "Published successfully on TikTok", post_id)
            }
            Err(e) => {
                error!(post_id = %post.id, error = %e, "TikTok publish failed");
                PublishResult::failure(NAME, format!("Error publishing to TikTok: {}", e))
            }
        }
    }
}

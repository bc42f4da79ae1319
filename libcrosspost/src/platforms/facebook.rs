//! Facebook Page adapter
//!
//! Posts are made as the Page, so the user token is first traded for the
//! Page access token via `/me/accounts`. From there:
//!
//! - text goes to `/{page}/feed`
//! - a single image goes to `/{page}/photos`
//! - several images are uploaded unpublished (bounded parallelism) and then
//!   attached to one feed post
//! - `short` posts become Reels through the start / upload / finish flow
//!
//! Expired user tokens are refreshed in place rather than rejected; see
//! [`FacebookPlatform::refresh_token`].

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::http;
use super::{missing_credentials, usable, Platform};
use crate::config::FacebookConfig;
use crate::error::{PlatformError, Result};
use crate::token;
use crate::types::{Media, PlatformCredentials, Post, PostType, PublishResult};

const NAME: &str = "facebook";
const DISPLAY_NAME: &str = "Facebook";

/// Graph error codes meaning the access token is expired or revoked
const EXPIRED_TOKEN_CODES: [i64; 2] = [190, 192];

pub struct FacebookPlatform {
    http: Client,
    config: FacebookConfig,
}

#[derive(Debug, Deserialize)]
struct PageList {
    #[serde(default)]
    data: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    id: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
    #[serde(default)]
    post_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ReelStart {
    video_id: String,
    upload_url: String,
}

impl FacebookPlatform {
    pub fn new(config: &FacebookConfig) -> Result<Self> {
        Ok(Self {
            http: http::build_client(config.timeout_secs)?,
            config: config.clone(),
        })
    }

    fn graph_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.graph_base,
            self.config.api_version,
            path.trim_start_matches('/')
        )
    }

    fn check_content(post: &Post) -> std::result::Result<(), String> {
        let has_video = post.first_video().is_some();
        match post.post_type {
            PostType::Short if !has_video => {
                Err("Facebook Reels require a video attachment".to_string())
            }
            PostType::Short => Ok(()),
            _ if has_video => Err(
                "Facebook video posts must use post_type 'short' to publish as a Reel".to_string(),
            ),
            _ => Ok(()),
        }
    }

    /// Keep an expiring user token usable
    ///
    /// The token is first validated against `/me`; a rejection there is
    /// final. When app credentials are configured the token is exchanged
    /// for a long-lived one. If the exchange is not possible or fails, the
    /// still-valid token gets a 24 hour extension instead.
    pub async fn refresh_token(
        &self,
        credentials: &mut PlatformCredentials,
    ) -> std::result::Result<(), PlatformError> {
        let resp = self
            .http
            .get(self.graph_url("me"))
            .query(&[("access_token", credentials.access_token.as_str())])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PlatformError::Authentication(
                "token is no longer valid and cannot be refreshed".to_string(),
            ));
        }

        let now = token::now();
        match self.exchange_token(&credentials.access_token).await {
            Ok(exchanged) => {
                credentials.access_token = exchanged.access_token;
                credentials.expires_at = Some(
                    now + exchanged
                        .expires_in
                        .filter(|secs| *secs > 0)
                        .unwrap_or(token::LONG_LIVED_TOKEN_SECS),
                );
                info!(user_id = %credentials.user_id, "Exchanged Facebook token for a long-lived token");
            }
            Err(e) => {
                warn!(
                    user_id = %credentials.user_id,
                    error = %e,
                    "Facebook token exchange failed, extending expiry by 24h"
                );
                credentials.expires_at = Some(now + token::OPTIMISTIC_EXTENSION_SECS);
            }
        }

        Ok(())
    }

    async fn exchange_token(
        &self,
        access_token: &str,
    ) -> std::result::Result<ExchangeResponse, PlatformError> {
        let (Some(app_id), Some(app_secret)) = (&self.config.app_id, &self.config.app_secret)
        else {
            return Err(PlatformError::Authentication(
                "Facebook app credentials are not configured".to_string(),
            ));
        };

        let resp = self
            .http
            .get(self.graph_url("oauth/access_token"))
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", app_id.as_str()),
                ("client_secret", app_secret.as_str()),
                ("fb_exchange_token", access_token),
            ])
            .send()
            .await?;

        http::read_json(resp, error_envelope).await
    }

    /// Page access token for the configured page, or the first page
    async fn page_token(
        &self,
        credentials: &PlatformCredentials,
    ) -> std::result::Result<Page, PlatformError> {
        let resp = self
            .http
            .get(self.graph_url("me/accounts"))
            .query(&[
                ("fields", "id,access_token"),
                ("access_token", credentials.access_token.as_str()),
            ])
            .send()
            .await?;
        let pages: PageList = http::read_json(resp, error_envelope).await?;

        let wanted = credentials.platform_page_id.as_deref();
        let mut pages = pages.data.into_iter();
        let page = match wanted {
            Some(id) => pages.find(|p| p.id == id),
            None => pages.next(),
        };

        page.ok_or_else(|| match wanted {
            Some(id) => PlatformError::Validation(format!(
                "Facebook Page {} is not managed by this account",
                id
            )),
            None => PlatformError::Validation(
                "No Facebook Page found for this account".to_string(),
            ),
        })
    }

    async fn post_text(
        &self,
        page: &Page,
        message: &str,
    ) -> std::result::Result<String, PlatformError> {
        let resp = self
            .http
            .post(self.graph_url(&format!("{}/feed", page.id)))
            .form(&[
                ("message", message),
                ("access_token", page.access_token.as_str()),
            ])
            .send()
            .await?;
        let created: IdResponse = http::read_json(resp, error_envelope).await?;
        Ok(created.id)
    }

    async fn upload_photo(
        &self,
        page: &Page,
        media: &Media,
        caption: Option<&str>,
        published: bool,
    ) -> std::result::Result<IdResponse, PlatformError> {
        let bytes = http::read_media(&media.path).await?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(media.file_name())
            .mime_str(&media.mime_type)
            .map_err(|e| PlatformError::Media(format!("Invalid mime type: {}", e)))?;

        let mut form = reqwest::multipart::Form::new()
            .text("access_token", page.access_token.clone())
            .text("published", published.to_string())
            .part("source", part);
        if let Some(caption) = caption {
            form = form.text("message", caption.to_string());
        }

        let resp = self
            .http
            .post(self.graph_url(&format!("{}/photos", page.id)))
            .multipart(form)
            .send()
            .await?;
        http::read_json(resp, error_envelope).await
    }

    async fn post_album(
        &self,
        page: &Page,
        message: &str,
        images: &[&Media],
    ) -> std::result::Result<String, PlatformError> {
        // `buffered` keeps the photo order while capping in-flight uploads
        let uploads: Vec<_> = images
            .iter()
            .map(|media| self.upload_photo(page, media, None, false))
            .collect();
        let photos: Vec<IdResponse> = stream::iter(uploads)
            .buffered(self.config.max_concurrent_uploads.max(1))
            .try_collect()
            .await?;
        let photo_ids: Vec<String> = photos.into_iter().map(|photo| photo.id).collect();
        debug!(count = photo_ids.len(), "Uploaded unpublished Facebook photos");

        let attached: Vec<serde_json::Value> = photo_ids
            .iter()
            .map(|id| serde_json::json!({ "media_fbid": id }))
            .collect();

        let resp = self
            .http
            .post(self.graph_url(&format!("{}/feed", page.id)))
            .json(&serde_json::json!({
                "message": message,
                "attached_media": attached,
                "access_token": page.access_token,
            }))
            .send()
            .await?;
        let created: IdResponse = http::read_json(resp, error_envelope).await?;
        Ok(created.id)
    }

    async fn post_reel(
        &self,
        page: &Page,
        description: &str,
        video: &Media,
    ) -> std::result::Result<String, PlatformError> {
        let reels_url = self.graph_url(&format!("{}/video_reels", page.id));

        let resp = self
            .http
            .post(&reels_url)
            .form(&[
                ("upload_phase", "start"),
                ("access_token", page.access_token.as_str()),
            ])
            .send()
            .await?;
        let start: ReelStart = http::read_json(resp, error_envelope).await?;
        debug!(video_id = %start.video_id, "Facebook Reel upload session started");

        let (file, size) = http::open_media(&video.path).await?;
        let resp = self
            .http
            .post(&start.upload_url)
            .header("Authorization", format!("OAuth {}", page.access_token))
            .header("offset", "0")
            .header("file_size", size.to_string())
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(reqwest::Body::from(file))
            .send()
            .await?;
        http::success_body(resp, error_envelope).await?;

        let resp = self
            .http
            .post(&reels_url)
            .form(&[
                ("upload_phase", "finish"),
                ("video_id", start.video_id.as_str()),
                ("video_state", "PUBLISHED"),
                ("description", description),
                ("access_token", page.access_token.as_str()),
            ])
            .send()
            .await?;
        http::success_body(resp, error_envelope).await?;

        Ok(start.video_id)
    }

    async fn run(
        &self,
        post: &Post,
        credentials: &PlatformCredentials,
    ) -> std::result::Result<String, PlatformError> {
        let page = self.page_token(credentials).await?;
        debug!(page_id = %page.id, "Resolved Facebook Page");

        if post.post_type == PostType::Short {
            let video = post.first_video().ok_or_else(|| {
                PlatformError::Validation("Facebook Reels require a video attachment".to_string())
            })?;
            return self.post_reel(&page, &post.content, video).await;
        }

        let images: Vec<&Media> = post.images().collect();
        match images.as_slice() {
            [] => self.post_text(&page, &post.content).await,
            [single] => {
                let photo = self
                    .upload_photo(&page, single, Some(&post.content), true)
                    .await?;
                Ok(photo.post_id.unwrap_or(photo.id))
            }
            many => self.post_album(&page, &post.content, many).await,
        }
    }
}

/// `error.message`, flagging expired-token codes
fn error_envelope(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let message = error.get("message")?.as_str()?.to_string();

    match error.get("code").and_then(|c| c.as_i64()) {
        Some(code) if EXPIRED_TOKEN_CODES.contains(&code) => {
            Some(format!("access token has expired: {}", message))
        }
        _ => Some(message),
    }
}

#[async_trait]
impl Platform for FacebookPlatform {
    fn name(&self) -> &str {
        NAME
    }

    async fn publish(
        &self,
        post: &Post,
        credentials: Option<&mut PlatformCredentials>,
    ) -> PublishResult {
        let Some(creds) = usable(credentials) else {
            warn!(platform = NAME, "No usable credentials");
            return PublishResult::failure(NAME, missing_credentials(DISPLAY_NAME));
        };

        // Content rules come before any refresh so violations stay offline
        if let Err(message) = Self::check_content(post) {
            return PublishResult::failure(NAME, message);
        }

        if token::is_expired(creds, token::now()) {
            if let Err(e) = self.refresh_token(creds).await {
                warn!(post_id = %post.id, error = %e, "Facebook token refresh failed");
                return PublishResult::failure(
                    NAME,
                    format!("Facebook token has expired and cannot be refreshed: {}", e),
                );
            }
        }

        match self.run(post, creds).await {
            Ok(external_id) => {
                info!(post_id = %post.id, %external_id, "Published to Facebook");
                let message = if post.post_type == PostType::Short {
                    "Published successfully as Facebook Reel"
                } else {
                    "Published successfully on Facebook"
                };
                PublishResult::success(NAME, message, external_id)
            }
            Err(e) => {
                error!(post_id = %post.id, error = %e, "Facebook publish failed");
                PublishResult::failure(NAME, format!("Error publishing to Facebook: {}", e))
            }
        }
    }
}

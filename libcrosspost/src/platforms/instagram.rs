//! Instagram (Business Account) adapter
//!
//! Instagram fetches media itself, so every image needs a public URL.
//! Publishing is container based: create a container per image (plus a
//! parent for carousels), wait for each to finish processing, then publish
//! the top-level container.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info};

use super::http::{self, PollState};
use super::{check_credentials, Platform};
use crate::config::InstagramConfig;
use crate::error::{PlatformError, Result};
use crate::types::{PlatformCredentials, Post, PublishResult};

const NAME: &str = "instagram";
const DISPLAY_NAME: &str = "Instagram";
const MAX_CAROUSEL_ITEMS: usize = 10;

pub struct InstagramPlatform {
    http: Client,
    config: InstagramConfig,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    #[serde(default)]
    status_code: Option<String>,
}

impl InstagramPlatform {
    pub fn new(config: &InstagramConfig) -> Result<Self> {
        Ok(Self {
            http: http::build_client(config.timeout_secs)?,
            config: config.clone(),
        })
    }

    fn graph_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.graph_base, self.config.api_version, path
        )
    }

    /// Public image URLs in post order, or the reason they can't be used
    fn image_urls(post: &Post) -> std::result::Result<Vec<String>, String> {
        let images: Vec<_> = post.images().collect();
        if images.is_empty() {
            return Err("Instagram requires at least one image".to_string());
        }
        if images.len() > MAX_CAROUSEL_ITEMS {
            return Err(format!(
                "Instagram carousels support at most {} images",
                MAX_CAROUSEL_ITEMS
            ));
        }

        images
            .into_iter()
            .map(|media| match media.url.as_deref() {
                None => Err(format!(
                    "Instagram requires a publicly accessible URL for media {}",
                    media.id
                )),
                Some(url) if http::is_local_url(url) => Err(format!(
                    "Instagram cannot fetch media from a local URL: {}",
                    url
                )),
                Some(url) => Ok(url.to_string()),
            })
            .collect()
    }

    async fn create_container(
        &self,
        ig_user: &str,
        token: &str,
        params: &[(&str, &str)],
    ) -> std::result::Result<String, PlatformError> {
        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("access_token", token));

        let resp = self
            .http
            .post(self.graph_url(&format!("{}/media", ig_user)))
            .form(&form)
            .send()
            .await?;
        let created: IdResponse = http::read_json(resp, error_envelope).await?;
        debug!(container_id = %created.id, "Created Instagram media container");
        Ok(created.id)
    }

    async fn container_status(
        &self,
        container_id: &str,
        token: &str,
    ) -> std::result::Result<PollState<()>, PlatformError> {
        let resp = self
            .http
            .get(self.graph_url(container_id))
            .query(&[("fields", "status_code"), ("access_token", token)])
            .send()
            .await?;
        let status: ContainerStatus = http::read_json(resp, error_envelope).await?;

        Ok(match status.status_code.as_deref().unwrap_or("") {
            "" | "FINISHED" | "PUBLISHED" => PollState::Ready(()),
            "ERROR" => PollState::Failed("Instagram media processing failed".to_string()),
            _ => PollState::Pending { retry_after: None },
        })
    }

    async fn wait_for_container(
        &self,
        container_id: &str,
        token: &str,
    ) -> std::result::Result<(), PlatformError> {
        let what = format!("Instagram media container {}", container_id);
        http::poll_until(&self.config.container_poll, &what, |_| {
            self.container_status(container_id, token)
        })
        .await
    }

    async fn run(
        &self,
        post: &Post,
        ig_user: &str,
        token: &str,
        image_urls: &[String],
    ) -> std::result::Result<String, PlatformError> {
        let container_id = match image_urls {
            [single] => {
                let id = self
                    .create_container(
                        ig_user,
                        token,
                        &[("image_url", single.as_str()), ("caption", post.content.as_str())],
                    )
                    .await?;
                self.wait_for_container(&id, token).await?;
                id
            }
            many => {
                let mut children = Vec::with_capacity(many.len());
                for url in many {
                    let child = self
                        .create_container(
                            ig_user,
                            token,
                            &[("image_url", url.as_str()), ("is_carousel_item", "true")],
                        )
                        .await?;
                    self.wait_for_container(&child, token).await?;
                    children.push(child);
                }

                let children = children.join(",");
                let parent = self
                    .create_container(
                        ig_user,
                        token,
                        &[
                            ("media_type", "CAROUSEL"),
                            ("children", children.as_str()),
                            ("caption", post.content.as_str()),
                        ],
                    )
                    .await?;
                self.wait_for_container(&parent, token).await?;
                parent
            }
        };

        let resp = self
            .http
            .post(self.graph_url(&format!("{}/media_publish", ig_user)))
            .form(&[("creation_id", container_id.as_str()), ("access_token", token)])
            .send()
            .await?;
        let published: IdResponse = http::read_json(resp, error_envelope).await?;
        Ok(published.id)
    }
}

fn error_envelope(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl Platform for InstagramPlatform {
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

        let Some(ig_user) = creds
            .platform_user_id
            .as_deref()
            .filter(|id| !id.is_empty())
        else {
            return PublishResult::failure(
                NAME,
                "Instagram account not connected correctly. Reconnect via OAuth to fetch Instagram Business Account ID",
            );
        };

        let image_urls = match Self::image_urls(post) {
            Ok(urls) => urls,
            Err(message) => return PublishResult::failure(NAME, message),
        };

        match self
            .run(post, ig_user, &creds.access_token, &image_urls)
            .await
        {
            Ok(media_id) => {
                info!(post_id = %post.id, %media_id, "Published to Instagram");
                PublishResult::success(NAME, "Published successfully on Instagram", media_id)
            }
            Err(e) => {
                error!(post_id = %post.id, error = %e, "Instagram publish failed");
                PublishResult::failure(NAME, format!("Error publishing to Instagram: {}", e))
            }
        }
    }
}

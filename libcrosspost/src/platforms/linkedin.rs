//! LinkedIn adapter
//!
//! Only the credential and post-type rules are enforced; no request is
//! made and the returned id is synthesized.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::{check_credentials, Platform};
use crate::types::{PlatformCredentials, Post, PostType, PublishResult};

const NAME: &str = "linkedin";
const DISPLAY_NAME: &str = "LinkedIn";

#[derive(Debug, Default)]
pub struct LinkedInPlatform;

impl LinkedInPlatform {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Platform for LinkedInPlatform {
    fn name(&self) -> &str {
        NAME
    }

    async fn publish(
        &self,
        post: &Post,
        credentials: Option<&mut PlatformCredentials>,
    ) -> PublishResult {
        if let Err(result) = check_credentials(NAME, DISPLAY_NAME, credentials) {
            return result;
        }

        if post.post_type == PostType::Story {
            return PublishResult::failure(
                NAME,
                "LinkedIn does not support stories. Use post_type 'normal' instead",
            );
        }

        let simple = Uuid::new_v4().simple().to_string();
        let external_id = format!("li_{}", &simple[..8]);
        info!(post_id = %post.id, %external_id, "Published to LinkedIn");
        PublishResult::success(NAME, "Published successfully on LinkedIn", external_id)
    }
}

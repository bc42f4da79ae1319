//! SQLite persistence for posts, media, credentials, and publish results

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::{Path, PathBuf};

use crate::error::{DbError, Result};
use crate::store::{CredentialStore, PostStore};
use crate::types::{Media, PlatformCredentials, Post, PublishResult};

const POST_COLUMNS: &str = "id, user_id, content, post_type, platforms, media_ids, status, \
     scheduled_for, published_at, created_at, updated_at";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    ///
    /// `":memory:"` opens a private in-memory database on a single pooled
    /// connection, so every query sees the same data.
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = if db_path == ":memory:" {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .map_err(DbError::SqlxError)?
        } else {
            let expanded_path = shellexpand::tilde(db_path).to_string();
            let path = Path::new(&expanded_path);

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }

            // mode=rwc creates the file on first use
            let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));
            SqlitePool::connect(&db_url)
                .await
                .map_err(DbError::SqlxError)?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub async fn create_media(&self, media: &Media) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO media (id, user_id, path, url, mime_type, size, kind, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&media.id)
        .bind(&media.user_id)
        .bind(media.path.to_string_lossy().into_owned())
        .bind(&media.url)
        .bind(&media.mime_type)
        .bind(media.size as i64)
        .bind(media.kind.as_str())
        .bind(media.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_media(&self, media_id: &str) -> Result<Option<Media>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, path, url, mime_type, size, kind, created_at
            FROM media WHERE id = ?
            "#,
        )
        .bind(media_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(|r| media_from_row(&r)).transpose()
    }

    /// Resolve media ids in order. An id with no matching row is an error.
    async fn resolve_media(&self, media_ids: &[String]) -> Result<Vec<Media>> {
        let mut media = Vec::with_capacity(media_ids.len());
        for id in media_ids {
            match self.get_media(id).await? {
                Some(m) => media.push(m),
                None => {
                    return Err(DbError::Decode {
                        column: "media_ids",
                        message: format!("unknown media {}", id),
                    }
                    .into())
                }
            }
        }
        Ok(media)
    }

    /// Fail a claimed row that could not be loaded
    async fn fail_claimed(&self, post_id: &str, now: i64) {
        let marked = sqlx::query(
            "UPDATE posts SET status = 'failed', updated_at = ? WHERE id = ? AND status = 'publishing'",
        )
        .bind(now)
        .bind(post_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = marked {
            tracing::error!(%post_id, error = %e, "Failed to mark unreadable post as failed");
        }
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<Post> {
        let (mut post, media_ids) = post_from_row(row)?;
        post.media = self.resolve_media(&media_ids).await?;
        Ok(post)
    }
}

#[async_trait]
impl PostStore for Database {
    async fn create_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, user_id, content, post_type, platforms, media_ids, status,
                               scheduled_for, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.content)
        .bind(post.post_type.as_str())
        .bind(encode_list("platforms", &post.platforms)?)
        .bind(encode_list("media_ids", &post.media_ids())?)
        .bind(post.status.as_str())
        .bind(post.scheduled_for)
        .bind(post.published_at)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let query = format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS);
        let row = sqlx::query(&query)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        match row {
            Some(r) => Ok(Some(self.hydrate(&r).await?)),
            None => Ok(None),
        }
    }

    async fn update_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE posts
            SET content = ?, post_type = ?, platforms = ?, media_ids = ?, status = ?,
                scheduled_for = ?, published_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&post.content)
        .bind(post.post_type.as_str())
        .bind(encode_list("platforms", &post.platforms)?)
        .bind(encode_list("media_ids", &post.media_ids())?)
        .bind(post.status.as_str())
        .bind(post.scheduled_for)
        .bind(post.published_at)
        .bind(post.updated_at)
        .bind(&post.id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn create_publish_result(&self, post_id: &str, result: &PublishResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO publish_results (post_id, platform, success, message, external_post_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(post_id)
        .bind(&result.platform)
        .bind(result.success)
        .bind(&result.message)
        .bind(&result.external_post_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn get_publish_results(&self, post_id: &str) -> Result<Vec<PublishResult>> {
        let rows = sqlx::query(
            r#"
            SELECT platform, success, message, external_post_id
            FROM publish_results WHERE post_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .into_iter()
            .map(|r| PublishResult {
                platform: r.get("platform"),
                success: r.get("success"),
                message: r.get("message"),
                external_post_id: r.get("external_post_id"),
            })
            .collect())
    }

    async fn claim_due_posts(&self, now: i64) -> Result<Vec<Post>> {
        // Single statement: the status predicate stops a second claimer
        // from matching rows this one already flipped.
        let query = format!(
            r#"
            UPDATE posts
            SET status = 'publishing', updated_at = ?
            WHERE status = 'scheduled'
              AND scheduled_for IS NOT NULL
              AND scheduled_for <= ?
            RETURNING {}
            "#,
            POST_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(now)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let mut posts = Vec::with_capacity(rows.len());
        for row in &rows {
            match self.hydrate(row).await {
                Ok(post) => posts.push(post),
                Err(e) => {
                    let post_id: String = row.get("id");
                    tracing::error!(%post_id, error = %e, "Claimed post is unreadable, marking failed");
                    self.fail_claimed(&post_id, now).await;
                }
            }
        }
        posts.sort_by_key(|p| (p.scheduled_for, p.created_at));
        Ok(posts)
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn get_credentials(
        &self,
        user_id: &str,
        platform: &str,
    ) -> Result<Option<PlatformCredentials>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, platform, access_token, refresh_token, token_type, expires_at,
                   platform_user_id, platform_page_id
            FROM credentials WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(user_id)
        .bind(platform)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| PlatformCredentials {
            user_id: r.get("user_id"),
            platform: r.get("platform"),
            access_token: r.get("access_token"),
            refresh_token: r.get("refresh_token"),
            token_type: r.get("token_type"),
            expires_at: r.get("expires_at"),
            platform_user_id: r.get("platform_user_id"),
            platform_page_id: r.get("platform_page_id"),
        }))
    }

    async fn save_credentials(&self, credentials: &PlatformCredentials) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials (user_id, platform, access_token, refresh_token, token_type,
                                     expires_at, platform_user_id, platform_page_id, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, platform) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_type = excluded.token_type,
                expires_at = excluded.expires_at,
                platform_user_id = excluded.platform_user_id,
                platform_page_id = excluded.platform_page_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&credentials.user_id)
        .bind(&credentials.platform)
        .bind(&credentials.access_token)
        .bind(&credentials.refresh_token)
        .bind(&credentials.token_type)
        .bind(credentials.expires_at)
        .bind(&credentials.platform_user_id)
        .bind(&credentials.platform_page_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }
}

fn encode_list(column: &'static str, values: &[String]) -> Result<String> {
    serde_json::to_string(values).map_err(|e| {
        DbError::Decode {
            column,
            message: e.to_string(),
        }
        .into()
    })
}

fn decode_list(column: &'static str, raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).map_err(|e| {
        DbError::Decode {
            column,
            message: e.to_string(),
        }
        .into()
    })
}

fn decode_enum<T: std::str::FromStr<Err = String>>(column: &'static str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|message| DbError::Decode { column, message }.into())
}

/// Map a posts row, returning the unresolved media ids alongside
fn post_from_row(row: &SqliteRow) -> Result<(Post, Vec<String>)> {
    let platforms: String = row.get("platforms");
    let media_ids: String = row.get("media_ids");
    let post_type: String = row.get("post_type");
    let status: String = row.get("status");

    let post = Post {
        id: row.get("id"),
        user_id: row.get("user_id"),
        content: row.get("content"),
        post_type: decode_enum("post_type", &post_type)?,
        platforms: decode_list("platforms", &platforms)?,
        media: Vec::new(),
        status: decode_enum("status", &status)?,
        scheduled_for: row.get("scheduled_for"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    };

    Ok((post, decode_list("media_ids", &media_ids)?))
}

fn media_from_row(row: &SqliteRow) -> Result<Media> {
    let path: String = row.get("path");
    let size: i64 = row.get("size");
    let kind: String = row.get("kind");

    Ok(Media {
        id: row.get("id"),
        user_id: row.get("user_id"),
        path: PathBuf::from(path),
        url: row.get("url"),
        mime_type: row.get("mime_type"),
        size: size.max(0) as u64,
        kind: decode_enum("kind", &kind)?,
        created_at: row.get("created_at"),
    })
}

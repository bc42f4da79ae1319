//! HTTP plumbing shared by the platform adapters

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::PollConfig;
use crate::error::{PlatformError, Result};

/// Extracts a human-readable message from a platform's error body
pub(crate) type ErrorEnvelope = fn(&str) -> Option<String>;

pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)).into())
}

/// Return the body of a successful response, or an `Api` error carrying the
/// best message the envelope parser can find.
pub(crate) async fn success_body(
    resp: Response,
    envelope: ErrorEnvelope,
) -> std::result::Result<String, PlatformError> {
    let status = resp.status();
    let text = resp.text().await?;

    if !status.is_success() {
        let message = envelope(&text).unwrap_or_else(|| {
            if text.trim().is_empty() {
                status.to_string()
            } else {
                text.clone()
            }
        });
        return Err(PlatformError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(text)
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    resp: Response,
    envelope: ErrorEnvelope,
) -> std::result::Result<T, PlatformError> {
    let text = success_body(resp, envelope).await?;
    serde_json::from_str(&text).map_err(|e| {
        PlatformError::InvalidResponse(format!("{} - body: {}", e, text))
    })
}

/// Open a media file for streaming, returning the handle and its byte length.
///
/// The handle is closed when the returned body (or the file) is dropped.
pub(crate) async fn open_media(
    path: &Path,
) -> std::result::Result<(tokio::fs::File, u64), PlatformError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| PlatformError::Media(format!("{}: {}", path.display(), e)))?;
    let len = file.metadata().await?.len();
    Ok((file, len))
}

pub(crate) async fn read_media(path: &Path) -> std::result::Result<Vec<u8>, PlatformError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| PlatformError::Media(format!("{}: {}", path.display(), e)))
}

/// Fill `buf` from `reader` until it is full or the reader is exhausted.
/// Returns the number of bytes read; zero means end of file.
pub(crate) async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> std::result::Result<usize, PlatformError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// One observation of an asynchronous platform job
#[derive(Debug)]
pub(crate) enum PollState<T> {
    Ready(T),
    /// Not finished; wait `retry_after` (or the policy interval) and ask again
    Pending { retry_after: Option<Duration> },
    Failed(String),
}

/// Poll `check` until it reports a terminal state or the attempt budget
/// in `policy` runs out.
pub(crate) async fn poll_until<T, F, Fut>(
    policy: &PollConfig,
    what: &str,
    mut check: F,
) -> std::result::Result<T, PlatformError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<PollState<T>, PlatformError>>,
{
    for attempt in 1..=policy.max_attempts {
        match check(attempt).await? {
            PollState::Ready(value) => return Ok(value),
            PollState::Failed(message) => return Err(PlatformError::Processing(message)),
            PollState::Pending { retry_after } => {
                tracing::debug!(attempt, what, "Still processing");
                if attempt < policy.max_attempts {
                    tokio::time::sleep(retry_after.unwrap_or_else(|| policy.interval())).await;
                }
            }
        }
    }

    Err(PlatformError::Timeout(format!(
        "{} did not finish after {} attempts",
        what, policy.max_attempts
    )))
}

/// Reject media URLs that a remote platform cannot fetch
pub(crate) fn is_local_url(url: &str) -> bool {
    let Some(rest) = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
    else {
        return true;
    };
    let host = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .rsplit('@')
        .next()
        .unwrap_or_default();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.split(']').next())
        .unwrap_or_else(|| host.split(':').next().unwrap_or_default());

    host.is_empty()
        || host.eq_ignore_ascii_case("localhost")
        || host.starts_with("127.")
        || host == "0.0.0.0"
        || host == "::1"
}

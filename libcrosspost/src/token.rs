//! Access-token expiry rules

use crate::types::PlatformCredentials;

/// Tokens expiring within this window are treated as already expired
pub const EXPIRY_BUFFER_SECS: i64 = 5 * 60;

/// Lifetime assumed for an exchanged long-lived Meta token when the
/// exchange response does not state one
pub const LONG_LIVED_TOKEN_SECS: i64 = 60 * 24 * 60 * 60;

/// Extension granted when the refresh endpoints are unreachable but the
/// token itself still validates
pub const OPTIMISTIC_EXTENSION_SECS: i64 = 24 * 60 * 60;

/// Whether the credential should be considered expired at `now`.
///
/// A credential without an expiry never expires.
pub fn is_expired(credentials: &PlatformCredentials, now: i64) -> bool {
    match credentials.expires_at {
        Some(expires_at) => now + EXPIRY_BUFFER_SECS > expires_at,
        None => false,
    }
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(expires_at: Option<i64>) -> PlatformCredentials {
        PlatformCredentials {
            expires_at,
            ..PlatformCredentials::new("u", "twitter", "tok")
        }
    }

    #[test]
    fn test_no_expiry_never_expires() {
        assert!(!is_expired(&creds(None), 4_000_000_000));
    }

    #[test]
    fn test_expiry_inside_buffer_counts_as_expired() {
        let now = 1_700_000_000;
        assert!(is_expired(&creds(Some(now + 60)), now));
        assert!(is_expired(&creds(Some(now - 1)), now));
    }

    #[test]
    fn test_expiry_outside_buffer_is_valid() {
        let now = 1_700_000_000;
        assert!(!is_expired(&creds(Some(now + EXPIRY_BUFFER_SECS)), now));
        assert!(!is_expired(&creds(Some(now + 3600)), now));
    }
}

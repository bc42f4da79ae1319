//! Error types for Crosspost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosspostError>;

#[derive(Error, Debug)]
pub enum CrosspostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CrosspostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosspostError::InvalidInput(_) => 3,
            CrosspostError::Config(_) => 2,
            CrosspostError::Platform(_) => 1,
            CrosspostError::Database(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt column {column}: {message}")]
    Decode { column: &'static str, message: String },
}

/// Failures raised while driving a platform's publish protocol.
///
/// Adapters never let these escape: each one is folded into a failed
/// [`PublishResult`](crate::types::PublishResult) whose message is the
/// `Display` form of the error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status, with the message pulled out of the
    /// platform's error envelope (or the raw body).
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The platform reported an explicit failure state while polling.
    #[error("Processing failed: {0}")]
    Processing(String),

    /// A poll loop ran out of attempts without a terminal state.
    #[error("Processing timeout: {0}")]
    Timeout(String),

    #[error("Media error: {0}")]
    Media(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PlatformError::InvalidResponse(err.to_string())
        } else {
            PlatformError::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for PlatformError {
    fn from(err: std::io::Error) -> Self {
        PlatformError::Media(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = CrosspostError::InvalidInput("Post not found".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_config_error() {
        let config_error = ConfigError::MissingField("database.path".to_string());
        let error = CrosspostError::Config(config_error);
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_platform_and_database_errors() {
        let platform = CrosspostError::Platform(PlatformError::Network("refused".to_string()));
        assert_eq!(platform.exit_code(), 1);

        let db = CrosspostError::Database(DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        )));
        assert_eq!(db.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting_invalid_input() {
        let error = CrosspostError::InvalidInput("Post abc not found".to_string());
        assert_eq!(format!("{}", error), "Invalid input: Post abc not found");
    }

    #[test]
    fn test_timeout_is_distinguishable_from_rejection() {
        let timeout = PlatformError::Timeout("twitter media processing".to_string());
        let rejected = PlatformError::Processing("twitter media processing".to_string());

        assert!(timeout.to_string().starts_with("Processing timeout"));
        assert!(!rejected.to_string().contains("timeout"));
    }

    #[test]
    fn test_api_error_includes_status_and_message() {
        let error = PlatformError::Api {
            status: 403,
            message: "You are not permitted to perform this action.".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "API error (403): You are not permitted to perform this action."
        );
    }

    #[test]
    fn test_io_error_becomes_media_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: PlatformError = io.into();
        assert!(matches!(err, PlatformError::Media(_)));
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let platform_error = PlatformError::Validation("test".to_string());
        let error: CrosspostError = platform_error.into();
        assert!(matches!(error, CrosspostError::Platform(_)));
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Network("Connection failed".to_string());
        let cloned = original.clone();
        assert_eq!(original, cloned);
    }
}

//! Error types for Autopilot

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AutopilotError>;

#[derive(Error, Debug)]
pub enum AutopilotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AutopilotError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            AutopilotError::InvalidInput(_) => 3,
            AutopilotError::Config(_) => 2,
            AutopilotError::Database(_) => 2,
            AutopilotError::Publish(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid duration '{value}' for {field}: {message}")]
    InvalidDuration {
        field: String,
        value: String,
        message: String,
    },

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

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Failures at the publisher boundary.
///
/// These never escape into job logic as raw errors: the pre-flight wrapper
/// converts them into failure `PublishResult`s. They exist as a typed
/// taxonomy so per-platform stubs and the token boundary can signal what
/// went wrong.
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("token expired, reconnect account")]
    TokenExpired,

    #[error("account inactive")]
    AccountInactive,

    #[error("No publisher registered for platform: {0}")]
    UnknownPlatform(String),

    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Platform rejected the post: {0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = AutopilotError::InvalidInput("bad schedule id".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_config_error() {
        let error = AutopilotError::Config(ConfigError::MissingField("database.path".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_database_error() {
        let error = AutopilotError::Database(DbError::NotFound("schedule abc".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_publish_error() {
        let error = AutopilotError::Publish(PublishError::Network("timeout".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_token_expired_message() {
        // The jobs persist this message verbatim on the schedule row.
        let error = PublishError::TokenExpired;
        assert_eq!(format!("{}", error), "token expired, reconnect account");
    }

    #[test]
    fn test_account_inactive_message() {
        let error = PublishError::AccountInactive;
        assert_eq!(format!("{}", error), "account inactive");
    }

    #[test]
    fn test_error_conversion_from_publish_error() {
        let publish_error = PublishError::Rejected("duplicate content".to_string());
        let error: AutopilotError = publish_error.into();

        match error {
            AutopilotError::Publish(_) => {}
            _ => panic!("Expected AutopilotError::Publish"),
        }
    }

    #[test]
    fn test_publish_error_clone() {
        let original = PublishError::Network("connection reset".to_string());
        let cloned = original.clone();
        assert_eq!(format!("{}", original), format!("{}", cloned));
    }

    #[test]
    fn test_error_message_formatting() {
        let error = AutopilotError::Publish(PublishError::Rejected("media too large".to_string()));
        assert_eq!(
            format!("{}", error),
            "Publish error: Platform rejected the post: media too large"
        );
    }
}

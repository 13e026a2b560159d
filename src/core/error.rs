use thiserror::Error;

/// Centralized error types for the framework
///
/// Most variants are configuration errors (see [`AppError::is_configuration`]):
/// they are raised while the application is being assembled and abort startup.
/// Errors raised by user handlers at runtime are not represented here, they
/// travel as [`HandlerError`](crate::routing::HandlerError) to the error handlers.
///
/// # Example
///
/// ```no_run
/// use screenflow::core::error::AppError;
///
/// fn report(err: AppError) {
///     eprintln!("Startup failed: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Bot token is empty or absent
    #[error("Bot token is not specified (set BOT_TOKEN or TELOXIDE_TOKEN)")]
    TokenIsNotSpecified,

    /// A screen member carries a handler type tag nobody understands
    #[error("Unknown handler type '{tag}' on member '{member}' of screen {screen}")]
    UnknownHandlerType { screen: String, member: String, tag: String },

    /// Two distinct handlers produced the same callback identifier
    #[error("Checksum collision: '{first}' and '{second}' both map to identifier {identifier}")]
    ChecksumCollision {
        identifier: String,
        first: String,
        second: String,
    },

    /// Two different callables registered under one handler id
    #[error("Handler id '{id}' is used by two different callables; give one of them its own id with Handler::named")]
    DuplicateHandlerId { id: String },

    /// A state was registered twice within one build pass
    #[error("State {0} is already registered")]
    DuplicateState(i32),

    /// Command member declared without a command name
    #[error("Command member '{member}' of screen {screen} has no command name")]
    MissingCommandName { screen: String, member: String },

    /// Command name that can never be typed by a user
    #[error("Invalid command name '{0}' (expected 1-32 latin letters, digits or underscores)")]
    InvalidCommandName(String),

    /// Input member declared without a message filter
    #[error("Input member '{member}' of screen {screen} has no message filter")]
    MissingFilter { screen: String, member: String },

    /// Permission name not present in the registry
    #[error("Unknown permission policy '{0}'")]
    UnknownPermission(String),

    /// Callback payload does not fit into Telegram's callback_data budget
    #[error("Callback payload is {len} bytes, the limit is {max}")]
    PayloadTooLong { len: usize, max: usize },

    /// Webhook mode requested without a public URL
    #[error("Webhook mode requires WEBHOOK_URL")]
    WebhookUrlMissing,

    /// Malformed configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Telegram API errors
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// Metrics registry errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Anyhow errors (for general error handling)
    #[error("Application error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the error was raised while assembling the application.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AppError::TokenIsNotSpecified
                | AppError::UnknownHandlerType { .. }
                | AppError::ChecksumCollision { .. }
                | AppError::DuplicateHandlerId { .. }
                | AppError::DuplicateState(_)
                | AppError::MissingCommandName { .. }
                | AppError::InvalidCommandName(_)
                | AppError::MissingFilter { .. }
                | AppError::UnknownPermission(_)
                | AppError::WebhookUrlMissing
                | AppError::Config(_)
        )
    }
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_flagged() {
        assert!(AppError::TokenIsNotSpecified.is_configuration());
        assert!(AppError::DuplicateState(3).is_configuration());
        assert!(AppError::UnknownPermission("x".into()).is_configuration());
    }

    #[test]
    fn test_io_error_is_not_configuration() {
        let err: AppError = std::io::Error::other("disk").into();
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("disk"));
    }

    #[test]
    fn test_collision_message_names_both_handlers() {
        let err = AppError::ChecksumCollision {
            identifier: "ab".into(),
            first: "app::a".into(),
            second: "app::b".into(),
        };
        let text = err.to_string();
        assert!(text.contains("app::a"));
        assert!(text.contains("app::b"));
        assert!(text.contains("ab"));
    }
}

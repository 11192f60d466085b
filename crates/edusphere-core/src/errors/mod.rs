use std::error::Error;

/// Base trait for all application errors
pub trait EduError: Error + Send + Sync + 'static {
    /// Error code for programmatic handling
    fn error_code(&self) -> &'static str;

    /// Whether this error should be logged as an error or warning
    fn is_user_error(&self) -> bool {
        false
    }
}

/// Common result type for the application
pub type EduResult<T> = Result<T, Box<dyn EduError>>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found at '{path}'")]
    ConfigNotFound { path: String },

    #[error("Failed to parse config file '{path}': {message}")]
    ConfigParseError { path: String, message: String },

    #[error("Invalid theme '{theme}'. Supported themes: light, dark")]
    InvalidTheme { theme: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("IO error reading config: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl EduError for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            ConfigError::ConfigNotFound { .. } => "CONFIG_NOT_FOUND",
            ConfigError::ConfigParseError { .. } => "CONFIG_PARSE_ERROR",
            ConfigError::InvalidTheme { .. } => "INVALID_THEME",
            ConfigError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            ConfigError::IoError { .. } => "CONFIG_IO_ERROR",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(
            self,
            ConfigError::ConfigParseError { .. }
                | ConfigError::InvalidTheme { .. }
                | ConfigError::InvalidConfiguration { .. }
        )
    }
}

/// A push payload that does not have the expected shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PayloadError {
    #[error("Expected a JSON object for '{context}', got {found}")]
    NotAnObject { context: String, found: String },

    #[error("Missing field '{field}' in '{context}' payload")]
    MissingField { context: String, field: String },

    #[error("Field '{field}' in '{context}' payload has the wrong type")]
    WrongType { context: String, field: String },
}

impl EduError for PayloadError {
    fn error_code(&self) -> &'static str {
        match self {
            PayloadError::NotAnObject { .. } => "PAYLOAD_NOT_AN_OBJECT",
            PayloadError::MissingField { .. } => "PAYLOAD_MISSING_FIELD",
            PayloadError::WrongType { .. } => "PAYLOAD_WRONG_TYPE",
        }
    }
}

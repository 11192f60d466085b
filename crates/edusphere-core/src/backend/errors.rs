use crate::errors::EduError;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend is not configured: {message}")]
    NotConfigured { message: String },

    #[error("Query on '{table}' failed: {message}")]
    RequestFailed { table: String, message: String },

    #[error("Backend returned HTTP {status} for '{table}'")]
    HttpStatus { table: String, status: u16 },

    #[error("Malformed response from '{context}': {message}")]
    MalformedResponse { context: String, message: String },

    #[error("Channel '{topic}' unavailable: {message}")]
    ChannelUnavailable { topic: String, message: String },

    #[error("Channel {id} is not open")]
    ChannelNotOpen { id: String },

    #[error("HTTP client error: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },
}

impl BackendError {
    pub fn malformed(context: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::MalformedResponse {
            context: context.into(),
            message: message.into(),
        }
    }
}

impl EduError for BackendError {
    fn error_code(&self) -> &'static str {
        match self {
            BackendError::NotConfigured { .. } => "BACKEND_NOT_CONFIGURED",
            BackendError::RequestFailed { .. } => "BACKEND_REQUEST_FAILED",
            BackendError::HttpStatus { .. } => "BACKEND_HTTP_STATUS",
            BackendError::MalformedResponse { .. } => "BACKEND_MALFORMED_RESPONSE",
            BackendError::ChannelUnavailable { .. } => "CHANNEL_UNAVAILABLE",
            BackendError::ChannelNotOpen { .. } => "CHANNEL_NOT_OPEN",
            BackendError::Http { .. } => "BACKEND_HTTP_ERROR",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(self, BackendError::NotConfigured { .. })
    }
}

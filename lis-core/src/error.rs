use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad Gateway: {0}")]
    BadGateway(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl AppError {
    /// Map a non-success HTTP status and its server-provided message onto the taxonomy.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 | 422 => AppError::BadRequest(message),
            404 => AppError::NotFound(message),
            409 => AppError::Conflict(message),
            _ => AppError::BadGateway(format!("status {}: {}", status, message)),
        }
    }

    /// The message a user should see for this failure.
    ///
    /// Server-reported rejections (duplicate code, missing parent) are passed through
    /// verbatim; transport and internal failures collapse to a generic description.
    pub fn upstream_message(&self) -> String {
        match self {
            AppError::BadRequest(msg) | AppError::NotFound(msg) | AppError::Conflict(msg) => {
                msg.clone()
            }
            AppError::ValidationError(err) => err.to_string(),
            AppError::BadGateway(msg) => format!("Unexpected response from server: {}", msg),
            AppError::Transport(_) => "Storage service is unreachable".to_string(),
            AppError::Payload(_) => "Unexpected response format from server".to_string(),
            AppError::ConfigError(err) => format!("Configuration error: {}", err),
            AppError::InternalError(err) => err.to_string(),
        }
    }

    /// Whether the failure was reported by the backend rather than the transport.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AppError::BadRequest(_) | AppError::NotFound(_) | AppError::Conflict(_)
        )
    }
}

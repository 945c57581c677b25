use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanvaxError {
    #[error("Config error: {0}")]
    Config(String),

    /// The session code does not resolve to a live canvas.
    #[error("Canvas not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A read or write on a client transport failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An inbound frame could not be decoded into a request.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CanvaxError {
    /// Stable snake_case code used in error frames sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Transport(_) => "transport",
            Self::Decode(_) | Self::Json(_) => "decode",
            Self::Io(_) => "io",
            Self::Other(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, CanvaxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(CanvaxError::NotFound("abc123".into()).code(), "not_found");
        assert_eq!(
            CanvaxError::InvalidArgument("missing code".into()).code(),
            "invalid_argument"
        );
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(CanvaxError::from(json_err).code(), "decode");
    }

    #[test]
    fn test_not_found_message() {
        let err = CanvaxError::NotFound("XyZ123".into());
        assert_eq!(err.to_string(), "Canvas not found: XyZ123");
    }
}

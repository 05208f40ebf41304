use actix_web::http::StatusCode;
use actix_web::ResponseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CspError {
    #[error("Invalid placeholder token: {0}")]
    InvalidToken(String),

    #[error("Malformed placeholder payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid directive name: {0}")]
    InvalidDirectiveName(String),

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Header processing error: {0}")]
    HeaderError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Response body error: {0}")]
    BodyError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ResponseError for CspError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidToken(_) | Self::MalformedPayload(_) | Self::InvalidDirectiveName(_) => {
                StatusCode::BAD_REQUEST
            }

            Self::CryptoError(_)
            | Self::HeaderError(_)
            | Self::ConfigError(_)
            | Self::SerializationError(_)
            | Self::BodyError(_)
            | Self::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

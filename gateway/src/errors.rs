use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Upstream timeout: no response within {0:?}")]
    Timeout(std::time::Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned status {0}")]
    Status(u16),

    #[error("Malformed upstream body: {0}")]
    Decode(String),

    #[error("Unexpected upstream shape: {0}")]
    Shape(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Channel send error")]
    ChannelSend,
}

impl Error {
    /// Whether the error belongs to a single poll cycle's fetch and is
    /// recovered from by waiting for the next tick.
    pub fn is_upstream(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Http(_) => true,
            Error::Status(_) => true,
            Error::Decode(_) => true,
            Error::Shape(_) => true,

            Error::Json(_) => false,
            Error::Io(_) => false,
            Error::Config(_) => false,
            Error::Metrics(_) => false,
            Error::ChannelSend => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API rejected the credential (HTTP 401/403).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The API answered, but not with something we can use.
    #[error("unexpected payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("download failed: {0}")]
    Download(String),
}

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("realtime socket: {0}")]
    Socket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("realtime protocol: {0}")]
    Protocol(String),

    #[error("not signed in")]
    Unauthenticated,

    #[error("subscription closed")]
    Closed,

    #[error("{0}")]
    Backend(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(Box::new(e))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

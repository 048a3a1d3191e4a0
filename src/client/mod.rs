mod http;

pub use http::HttpBoardClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a single remote call can fail with.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("remote rejected credentials")]
    Auth,
    #[error("no post at index {index}")]
    NotFound { index: u64 },
    #[error("transient remote failure: {message}")]
    Transient { message: String },
}

impl ClientError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transient {
            message: e.to_string(),
        }
    }
}

/// An authenticated session with the board archive.
#[derive(Debug, Clone)]
pub struct BoardSession {
    token: String,
}

impl BoardSession {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// A single post fetched from the board archive by index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePost {
    pub index: u64,
    /// Raw board timestamp, e.g. `Thu Aug  7 12:34:56 2025`.
    pub date: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Remote board archive.
///
/// Posts are addressed by a monotonically assigned positive index; index 1 is
/// the oldest post on a board and `latest_index` the newest.
#[async_trait]
pub trait BoardClient: Send + Sync {
    /// Open an authenticated session.
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<BoardSession, ClientError>;

    /// Index of the newest post on the board.
    async fn latest_index(&self, session: &BoardSession, board: &str)
        -> Result<u64, ClientError>;

    /// Fetch the post at a given index.
    async fn fetch_post(
        &self,
        session: &BoardSession,
        board: &str,
        index: u64,
    ) -> Result<RemotePost, ClientError>;

    /// Close the session.
    async fn end_session(&self, session: &BoardSession) -> Result<(), ClientError>;
}

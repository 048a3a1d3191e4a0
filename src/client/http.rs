use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{BoardClient, BoardSession, ClientError, RemotePost};
use crate::config::Config;

/// User agent sent with every archive API request.
const USER_AGENT: &str = "bbs-post-tally/0.1";

/// `BoardClient` backed by the board archive's JSON API over HTTP.
///
/// Endpoints:
/// - `POST /api/session` with credentials, returns a bearer token
/// - `GET /api/boards/{board}/latest`
/// - `GET /api/boards/{board}/posts/{index}`
/// - `DELETE /api/session`
pub struct HttpBoardClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    index: u64,
}

impl HttpBoardClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl BoardClient for HttpBoardClient {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<BoardSession, ClientError> {
        let response = self
            .client
            .post(self.url("/api/session"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: SessionResponse = response.json().await?;
            debug!("Opened board session");
            Ok(BoardSession::new(body.token))
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            Err(ClientError::Auth)
        } else {
            Err(ClientError::transient(format!(
                "login returned status {status}"
            )))
        }
    }

    async fn latest_index(
        &self,
        session: &BoardSession,
        board: &str,
    ) -> Result<u64, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/api/boards/{board}/latest")))
            .bearer_auth(session.token())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::transient(format!(
                "latest-index returned status {}",
                response.status()
            )));
        }
        let body: LatestResponse = response.json().await?;
        Ok(body.index)
    }

    async fn fetch_post(
        &self,
        session: &BoardSession,
        board: &str,
        index: u64,
    ) -> Result<RemotePost, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/api/boards/{board}/posts/{index}")))
            .bearer_auth(session.token())
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(ClientError::NotFound { index });
        }
        if !status.is_success() {
            return Err(ClientError::transient(format!(
                "post fetch returned status {status}"
            )));
        }
        Ok(response.json().await?)
    }

    async fn end_session(&self, session: &BoardSession) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(self.url("/api/session"))
            .bearer_auth(session.token())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::transient(format!(
                "logout returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

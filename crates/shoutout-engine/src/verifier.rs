//! Content-verification service seam.
//!
//! The service fetches a public post, checks it for the required keyword and
//! reports its engagement counters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shoutout_storage::{Platform, PostMetrics};
use thiserror::Error;

/// Content-verification errors
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("verification service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Trait for content-verification providers
#[cfg_attr(any(test, feature = "test-support"), mockall::automock)]
#[async_trait]
pub trait ContentVerifier: Send + Sync {
    /// Scan `url` for `required_keyword` and return its current engagement.
    async fn verify(
        &self,
        url: &str,
        required_keyword: &str,
        platform: Platform,
    ) -> Result<PostMetrics, VerifyError>;
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    url: &'a str,
    keyword: &'a str,
    platform: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    contains_keyword: bool,
    #[serde(default)]
    post_text: String,
    #[serde(default)]
    likes: i64,
    #[serde(default)]
    comments: i64,
    #[serde(default)]
    shares: i64,
}

/// Verification service reached over HTTP (`POST {endpoint}/verify`).
pub struct HttpContentVerifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpContentVerifier {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerifyError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ContentVerifier for HttpContentVerifier {
    async fn verify(
        &self,
        url: &str,
        required_keyword: &str,
        platform: Platform,
    ) -> Result<PostMetrics, VerifyError> {
        let mut request = self
            .client
            .post(format!("{}/verify", self.endpoint))
            .json(&VerifyRequest {
                url,
                keyword: required_keyword,
                platform: platform.as_str(),
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VerifyError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerifyError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| VerifyError::InvalidResponse(e.to_string()))?;
        if body.likes < 0 || body.comments < 0 || body.shares < 0 {
            return Err(VerifyError::InvalidResponse(
                "negative engagement counters".into(),
            ));
        }

        Ok(PostMetrics {
            contains_keyword: body.contains_keyword,
            post_text: body.post_text,
            likes: body.likes,
            comments: body.comments,
            shares: body.shares,
        })
    }
}

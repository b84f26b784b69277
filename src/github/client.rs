use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;

use super::error::FetchError;
use super::types::Release;

const API_VERSION: &str = "2022-11-28";
const DEFAULT_USER_AGENT: &str = "release-download-logger";

/// Longest slice of an error body kept in diagnostics.
const MAX_ERROR_BODY: usize = 200;

/// Source of the latest release for a repository.
/// The concrete implementation is [`GitHubClient`]; tests substitute their own.
#[async_trait::async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn latest_release(&self, owner: &str, repo: &str) -> Result<Release, FetchError>;
}

/// Authenticated client for the GitHub REST API.
pub struct GitHubClient {
    client: Client,
    api_base: String,
    token: String,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn latest_release_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{}/{}/releases/latest", self.api_base, owner, repo)
    }
}

#[async_trait::async_trait]
impl ReleaseSource for GitHubClient {
    async fn latest_release(&self, owner: &str, repo: &str) -> Result<Release, FetchError> {
        let url = self.latest_release_url(owner, repo);
        tracing::debug!(%url, "Fetching latest release");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| FetchError::Http {
                url: url.clone(),
                source: e,
            })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| FetchError::Http {
            url: url.clone(),
            source: e,
        })?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            let body = text.chars().take(MAX_ERROR_BODY).collect::<String>();
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
                body: body.trim().to_string(),
            });
        }

        let release =
            Release::from_json(&body).map_err(|e| FetchError::Decode { url, source: e })?;
        tracing::debug!(
            tag = %release.tag,
            assets = release.assets.len(),
            "Fetched latest release"
        );
        Ok(release)
    }
}

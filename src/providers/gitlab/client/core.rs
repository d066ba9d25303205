use log::warn;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use url::Url;

use crate::auth::Token;
use crate::error::{CompareError, Result};

const MAX_RETRIES: u32 = 10;
const RETRY_DELAY_SECONDS: u64 = 10;
const MAX_CONCURRENT_REQUESTS: usize = 16;
const REQUEST_TIMEOUT_SECONDS: u64 = 60;

pub struct GitLabClient {
    pub client: Client,
    pub api_url: Url,
    pub token: Option<Token>,
    semaphore: Arc<Semaphore>,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("runner-compare/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| CompareError::Config(format!("Failed to create HTTP client: {e}")))?;

        // Keep any sub-path of self-hosted instances when joining.
        let base = if base_url.ends_with('/') {
            Url::parse(base_url)
        } else {
            Url::parse(&format!("{base_url}/"))
        }
        .map_err(|e| CompareError::Config(format!("Invalid base URL: {e}")))?;

        let api_url = base
            .join("api/v4/")
            .map_err(|e| CompareError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
        })
    }

    pub fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    pub(super) fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path)
            .map_err(|e| CompareError::Config(format!("Invalid API URL '{path}': {e}")))
    }

    /// Execute a GET request with automatic retry on network errors, rate
    /// limits and server errors. Returns the decoded body and the response
    /// headers (GitLab paginates through headers).
    pub(super) async fn get_json<T>(&self, url: Url, query: &[(&str, String)]) -> Result<(T, HeaderMap)>
    where
        T: serde::de::DeserializeOwned,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| CompareError::Config(format!("Request limiter closed: {e}")))?;

        let mut retry_count = 0;
        loop {
            let request = self.auth_request(self.client.get(url.clone()).query(query));

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() || e.is_request() => {
                    if retry_count >= MAX_RETRIES {
                        return Err(e.into());
                    }
                    warn!(
                        "Network error ({}), retrying in {}s ({}/{})...",
                        e,
                        RETRY_DELAY_SECONDS,
                        retry_count + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_secs(RETRY_DELAY_SECONDS)).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if retry_count >= MAX_RETRIES {
                    return Err(CompareError::ApiErrorAfterRetries {
                        status: status.as_u16(),
                        retries: MAX_RETRIES,
                    });
                }

                let delay = retry_after(response.headers()).unwrap_or(RETRY_DELAY_SECONDS);
                warn!(
                    "GitLab API error (status {status}). Waiting {delay} seconds before retry {}/{}...",
                    retry_count + 1,
                    MAX_RETRIES
                );

                tokio::time::sleep(Duration::from_secs(delay)).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                return Err(CompareError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                });
            }

            let headers = response.headers().clone();
            let body = response.json::<T>().await?;

            return Ok((body, headers));
        }
    }
}

fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use super::error::PollError;

/// Trait for fetching a JSON document over HTTP
///
/// This trait allows for mocking the HTTP layer for testing purposes
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// GET `url` with the given headers and parse the body as JSON.
    ///
    /// The response content-type is ignored; any body that parses as
    /// JSON is accepted.
    async fn fetch_json(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<serde_json::Value, PollError>;
}

/// Real HTTP fetcher backed by a reqwest client
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    /// Create a fetcher whose requests are bounded by `timeout`
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn fetch_json(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<serde_json::Value, PollError> {
        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(PollError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::HttpStatus(status));
        }

        let body = response.bytes().await.map_err(PollError::Transport)?;
        serde_json::from_slice(&body).map_err(PollError::JsonParse)
    }
}

/// Mock fetcher for testing
///
/// Returns scripted responses in order and records each request.
#[cfg(test)]
#[derive(Default)]
pub struct MockFetch {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<serde_json::Value, PollError>>>,
    pub requests: std::sync::Mutex<Vec<(String, HeaderMap)>>,
}

#[cfg(test)]
impl MockFetch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response
    pub fn push_response(&self, response: Result<serde_json::Value, PollError>) {
        self.responses.lock().unwrap().push_back(response);
    }
}

#[cfg(test)]
#[async_trait]
impl HttpFetch for MockFetch {
    async fn fetch_json(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<serde_json::Value, PollError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), headers.clone()));

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(PollError::HttpStatus(
                reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            )))
    }
}

// Allows tests to keep a handle on the mock after boxing it into a poller
#[cfg(test)]
#[async_trait]
impl HttpFetch for std::sync::Arc<MockFetch> {
    async fn fetch_json(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<serde_json::Value, PollError> {
        self.as_ref().fetch_json(url, headers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_failure_is_a_transport_error() {
        let fetch = ReqwestFetch::new(Duration::from_millis(250)).unwrap();

        // Port 9 (discard) is closed on any sane test machine; the
        // connection is refused without touching the network.
        let err = fetch
            .fetch_json("http://127.0.0.1:9/", &HeaderMap::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "transport");
    }
}

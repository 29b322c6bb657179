//! JSON-over-HTTP requests with a per-attempt timeout and exponential backoff.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout exceeded after {0:?}")]
    Timeout(Duration),

    #[error("Network response was not ok: {0}")]
    HttpStatus(StatusCode),

    #[error("Invalid JSON in response: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Request could not be built: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Attempt budget for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Wait before the first retry; doubled before every further one.
    pub initial_delay: Duration,
    /// Deadline for each individual attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Method, headers and optional JSON body of a request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl RequestOptions {
    pub fn post_json<B: Serialize + ?Sized>(body: &B) -> Result<Self> {
        let body =
            serde_json::to_value(body).map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            method: Method::POST,
            headers: HeaderMap::new(),
            body: Some(body),
        })
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        self.headers.insert(name, value);
        Ok(self)
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

#[derive(Clone)]
pub struct RetryingFetcher {
    client: Client,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            policy,
        }
    }

    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<T> {
        self.fetch_json_with(url, options, self.policy).await
    }

    /// Runs attempts until one succeeds or the retry budget is spent, returning
    /// the last error in the latter case.
    pub async fn fetch_json_with<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
        policy: RetryPolicy,
    ) -> Result<T> {
        let mut retries = policy.max_retries;
        let mut delay = policy.initial_delay;

        loop {
            match self.attempt(url, options, policy.timeout).await {
                Ok(value) => return Ok(value),
                Err(e) if retries > 0 => {
                    tracing::warn!(
                        "Fetch of {} failed ({}), retrying in {}ms... ({} retries left)",
                        url,
                        e,
                        delay.as_millis(),
                        retries
                    );
                    tokio::time::sleep(delay).await;
                    retries -= 1;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
        timeout: Duration,
    ) -> Result<T> {
        let request = async {
            let mut builder = self
                .client
                .request(options.method.clone(), url)
                .headers(options.headers.clone());
            if let Some(body) = &options.body {
                builder = builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.to_string());
            }

            let response = builder.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::HttpStatus(status));
            }

            let bytes = response.bytes().await?;
            let value: T = serde_json::from_slice(&bytes).map_err(FetchError::Parse)?;
            Ok::<T, FetchError>(value)
        };

        tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| FetchError::Timeout(timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    fn quick_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn delay_doubles_between_attempts() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&hits);
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/down")
            .with_status(500)
            .with_body_from_request(move |_| {
                recorded.lock().unwrap().push(Instant::now());
                b"{}".to_vec()
            })
            .expect(4)
            .create_async()
            .await;

        let fetcher = RetryingFetcher::new(RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
        });
        let err = fetcher
            .fetch_json::<Value>(&format!("{}/down", server.url()), &RequestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(_)));
        mock.assert_async().await;

        let hits = hits.lock().unwrap().clone();
        assert_eq!(hits.len(), 4);
        let gaps: Vec<Duration> = hits.windows(2).map(|w| w[1] - w[0]).collect();
        for (gap, expected_ms) in gaps.iter().zip([100u64, 200, 400]) {
            assert!(
                *gap >= Duration::from_millis(expected_ms),
                "gap {:?} shorter than {}ms",
                gap,
                expected_ms
            );
        }
        // Doubling, not a constant long wait.
        assert!(gaps[0] < Duration::from_millis(400), "first gap {:?}", gaps[0]);
    }

    #[tokio::test]
    async fn first_attempt_success_makes_one_call() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/check_download")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(json!({"fileName": "a.zip"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"duplicate":false}"#)
            .expect(1)
            .create_async()
            .await;

        let fetcher = RetryingFetcher::new(quick_policy(3));
        let options = RequestOptions::post_json(&json!({"fileName": "a.zip"})).unwrap();
        let value: Value = fetcher
            .fetch_json(&format!("{}/check_download", server.url()), &options)
            .await
            .unwrap();

        assert_eq!(value, json!({"duplicate": false}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn exhausting_retries_makes_n_plus_one_calls() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/update_location")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let fetcher = RetryingFetcher::new(quick_policy(2));
        let options = RequestOptions::post_json(&json!({})).unwrap();
        let err = fetcher
            .fetch_json::<Value>(&format!("{}/update_location", server.url()), &options)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FetchError::HttpStatus(StatusCode::INTERNAL_SERVER_ERROR)
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn malformed_json_is_retried_then_reported() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/status")
            .with_status(200)
            .with_body("<html>not json</html>")
            .expect(2)
            .create_async()
            .await;

        let fetcher = RetryingFetcher::new(quick_policy(1));
        let err = fetcher
            .fetch_json::<Value>(&format!("{}/status", server.url()), &RequestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Parse(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn recovers_when_a_later_attempt_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let fetcher = RetryingFetcher::new(RetryPolicy {
            initial_delay: Duration::from_millis(200),
            ..quick_policy(1)
        });
        let url = format!("{}/flaky", server.url());
        let call = tokio::spawn(async move {
            fetcher
                .fetch_json::<Value>(&url, &RequestOptions::default())
                .await
        });

        // Swap in a healthy response while the fetcher is backing off.
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(failing);
        let healthy = server
            .mock("GET", "/flaky")
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .expect(1)
            .create_async()
            .await;

        let value = call.await.unwrap().unwrap();
        assert_eq!(value, json!({"ok": true}));
        healthy.assert_async().await;
    }

    #[tokio::test]
    async fn unanswered_attempt_times_out() {
        // Accepts connections into the backlog but never answers them.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/check_download", listener.local_addr().unwrap());

        let fetcher = RetryingFetcher::new(RetryPolicy {
            max_retries: 0,
            initial_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(100),
        });
        let err = fetcher
            .fetch_json::<Value>(&url, &RequestOptions::post_json(&json!({})).unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Timeout(d) if d == Duration::from_millis(100)));
        drop(listener);
    }

    #[tokio::test]
    async fn connection_refused_is_a_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = RetryingFetcher::new(quick_policy(1));
        let err = fetcher
            .fetch_json::<Value>(&format!("http://{}/", addr), &RequestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Network(_)));
    }

    #[test]
    fn rejects_invalid_header_names() {
        let err = RequestOptions::default()
            .with_header("bad header", "x")
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidRequest(_)));
    }
}

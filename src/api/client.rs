use serde::Serialize;
use serde_json::Value;

use super::fetch::{RequestOptions, Result, RetryingFetcher};
use super::models::{ApiConfig, CheckDownloadRequest, DuplicateCheckResult, UpdateLocationRequest};

/// Client for the duplicate-detection backend.
#[derive(Clone)]
pub struct BackendClient {
    config: ApiConfig,
    fetcher: RetryingFetcher,
}

impl BackendClient {
    pub fn new(config: ApiConfig, fetcher: RetryingFetcher) -> Self {
        Self { config, fetcher }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn json_post<B: Serialize>(body: &B) -> Result<RequestOptions> {
        RequestOptions::post_json(body)?.with_header("accept", "application/json")
    }

    /// Asks the backend whether the file behind `request.file_url` was already
    /// downloaded and where it lives.
    pub async fn check_download(
        &self,
        request: &CheckDownloadRequest,
    ) -> Result<DuplicateCheckResult> {
        let options = Self::json_post(request)?;
        self.fetcher
            .fetch_json(&self.endpoint("check_download"), &options)
            .await
    }

    /// Records the final save location of a finished download. The response
    /// must still be JSON but its content is ignored.
    pub async fn update_location(&self, request: &UpdateLocationRequest) -> Result<()> {
        let options = Self::json_post(request)?;
        let _: Value = self
            .fetcher
            .fetch_json(&self.endpoint("update_location"), &options)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{wire_file_size, FetchError, RetryPolicy};
    use mockito::Matcher;
    use serde_json::json;
    use std::time::Duration;

    fn client_for(server: &mockito::Server) -> BackendClient {
        let fetcher = RetryingFetcher::new(RetryPolicy {
            max_retries: 1,
            initial_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        });
        BackendClient::new(
            ApiConfig {
                base_url: format!("{}/", server.url()),
            },
            fetcher,
        )
    }

    #[tokio::test]
    async fn check_download_posts_camel_case_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/check_download")
            .match_body(Matcher::Json(json!({
                "fileName": "report.pdf",
                "fileSize": 2048,
                "fileUrl": "https://example.com/report.pdf"
            })))
            .with_status(200)
            .with_body(
                r#"{"duplicate":true,"location":"/home/me/report.pdf","timestamp":"2024-05-01 10:00:00","filename":"report.pdf","message":"seen before"}"#,
            )
            .create_async()
            .await;

        let result = client_for(&server)
            .check_download(&CheckDownloadRequest {
                file_name: "report.pdf".to_string(),
                file_size: 2048,
                file_url: "https://example.com/report.pdf".to_string(),
            })
            .await
            .unwrap();

        assert!(result.duplicate);
        assert_eq!(result.location.as_deref(), Some("/home/me/report.pdf"));
        assert_eq!(result.timestamp.as_deref(), Some("2024-05-01 10:00:00"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn check_download_treats_missing_file_as_failure() {
        let mut server = mockito::Server::new_async().await;
        let _check = server
            .mock("POST", "/check_download")
            .with_status(404)
            .with_body(r#"{"error":"File not found at stored location"}"#)
            .expect(2)
            .create_async()
            .await;

        let err = client_for(&server)
            .check_download(&CheckDownloadRequest {
                file_name: "a".to_string(),
                file_size: -1,
                file_url: "https://example.com/a".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::HttpStatus(s) if s.as_u16() == 404));
    }

    #[tokio::test]
    async fn update_location_ignores_response_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/update_location")
            .match_body(Matcher::PartialJson(json!({"location": "/tmp/a.zip"})))
            .with_status(200)
            .with_body(r#"{"status":"success"}"#)
            .expect(1)
            .create_async()
            .await;

        client_for(&server)
            .update_location(&UpdateLocationRequest {
                file_name: "/tmp/a.zip".to_string(),
                file_size: 10,
                file_url: "https://example.com/a.zip".to_string(),
                location: "/tmp/a.zip".to_string(),
            })
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[test]
    fn unknown_size_goes_on_the_wire_as_minus_one() {
        assert_eq!(wire_file_size(None), -1);
        assert_eq!(wire_file_size(Some(42)), 42);
    }
}

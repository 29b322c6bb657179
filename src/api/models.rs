use serde::{Deserialize, Serialize};

/// Body of `POST /check_download`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDownloadRequest {
    pub file_name: String,
    /// Total size in bytes, `-1` when the host does not know it yet
    pub file_size: i64,
    pub file_url: String,
}

/// Response from the /check_download endpoint. Other fields the backend sends
/// are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DuplicateCheckResult {
    pub duplicate: bool,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Body of `POST /update_location`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationRequest {
    pub file_name: String,
    pub file_size: i64,
    pub file_url: String,
    pub location: String,
}

/// Configuration for the backend client
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
        }
    }
}

pub fn wire_file_size(size: Option<u64>) -> i64 {
    size.and_then(|s| i64::try_from(s).ok()).unwrap_or(-1)
}

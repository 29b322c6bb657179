use serde::{Deserialize, Serialize};

pub type DownloadId = u64;
pub type WindowId = u64;

/// Lifecycle states a host reports for a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    InProgress,
    Interrupted,
    Complete,
}

impl DownloadState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DownloadState::InProgress)
    }
}

/// Host-side view of a single download.
///
/// `filename` is the proposed name while the download is being named and the
/// absolute save path once it has been placed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadItem {
    pub id: DownloadId,
    pub url: String,
    pub filename: String,
    pub file_size: Option<u64>,
    pub bytes_received: u64,
    pub state: DownloadState,
}

/// A state transition reported on the host's change stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadDelta {
    pub id: DownloadId,
    pub previous: Option<DownloadState>,
    pub current: Option<DownloadState>,
}

impl DownloadDelta {
    pub fn completed(&self) -> bool {
        self.current == Some(DownloadState::Complete)
    }
}

/// Parameters for a download started by the session itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub filename: String,
    pub save_as: bool,
}

/// The two choices the confirmation popup can send back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopupAction {
    #[serde(rename = "redownload")]
    Redownload,
    #[serde(rename = "cancelDownload", alias = "cancel")]
    Cancel,
}

/// Message emitted by a popup when the user presses one of its buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupMessage {
    pub action: PopupAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_id: Option<DownloadId>,
}

/// Duplicate details handed to the popup through the key-value store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateFileInfo {
    pub download_id: DownloadId,
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl DuplicateFileInfo {
    pub fn storage_key(download_id: DownloadId) -> String {
        format!("duplicateFile.{}", download_id)
    }
}

/// Size, position and target of a confirmation popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupSpec {
    pub download_id: DownloadId,
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
}

//! Download, window and storage primitives the interception session drives.
//!
//! The session only ever talks to these traits; `local`, `popup_process` and
//! `storage` provide the desktop implementations used by the binary.

pub mod local;
pub mod popup_process;
pub mod storage;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{
    DownloadDelta, DownloadId, DownloadItem, DownloadRequest, PopupMessage, PopupSpec, WindowId,
};

#[derive(Error, Debug)]
pub enum HostError {
    #[error("unknown download {0}")]
    UnknownDownload(DownloadId),

    #[error("unknown window {0}")]
    UnknownWindow(WindowId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, HostError>;

/// Everything a host reports to the session.
#[derive(Debug)]
pub enum HostEvent {
    /// A download is about to be named. The host waits on `suggest` before
    /// choosing a save path.
    DeterminingFilename {
        item: DownloadItem,
        suggest: FilenameSuggester,
    },
    Changed(DownloadDelta),
    PopupMessage {
        window: WindowId,
        message: PopupMessage,
    },
    /// A popup went away. `failed` is set when it exited abnormally, which
    /// means the user never saw it.
    WindowRemoved { window: WindowId, failed: bool },
}

/// One-shot reply to a determining-filename event.
///
/// Calling [`suggest`](Self::suggest) lets the download proceed. Holding on to
/// the value keeps the host waiting; dropping it unanswered abandons the
/// download.
#[derive(Debug)]
pub struct FilenameSuggester {
    reply: oneshot::Sender<String>,
}

impl FilenameSuggester {
    pub fn channel() -> (Self, oneshot::Receiver<String>) {
        let (reply, rx) = oneshot::channel();
        (Self { reply }, rx)
    }

    pub fn suggest(self, filename: impl Into<String>) {
        // The host may have given up on the download already.
        let _ = self.reply.send(filename.into());
    }
}

#[async_trait]
pub trait DownloadHost: Send + Sync {
    /// Starts a download that bypasses filename interception.
    async fn download(&self, request: DownloadRequest) -> Result<DownloadId>;

    async fn cancel(&self, id: DownloadId) -> Result<()>;

    async fn search(&self, id: DownloadId) -> Result<Option<DownloadItem>>;
}

#[async_trait]
pub trait WindowHost: Send + Sync {
    async fn create_popup(&self, spec: PopupSpec) -> Result<WindowId>;

    async fn remove(&self, id: WindowId) -> Result<()>;
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn remove(&self, key: &str) -> Result<()>;
}

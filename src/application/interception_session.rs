use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    api::{wire_file_size, BackendClient, CheckDownloadRequest, UpdateLocationRequest},
    domain::{
        AppError, DownloadDelta, DownloadId, DownloadItem, DownloadRequest, DuplicateFileInfo,
        PopupAction, PopupMessage, PopupSpec, WindowId,
    },
    host::{DownloadHost, FilenameSuggester, HostError, KeyValueStore, WindowHost},
};

/// Size and position of confirmation popups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupGeometry {
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
}

impl Default for PopupGeometry {
    fn default() -> Self {
        Self {
            width: 400,
            height: 200,
            left: 100,
            top: 100,
        }
    }
}

/// A download whose filename is being withheld until the user decides.
#[derive(Debug)]
struct PendingInterception {
    source_url: String,
    suggested_filename: String,
    popup: Option<WindowId>,
    // Only answered when the popup cannot be shown; dropping it abandons the
    // original download.
    suggest: FilenameSuggester,
}

/// What happened to a download at its determining-filename event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interception {
    Proceeded,
    AwaitingUserChoice(WindowId),
}

/// How a popup message or popup closure was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Redownloaded { original: DownloadId, new: DownloadId },
    Cancelled(DownloadId),
    /// The popup died before the user could answer; the download proceeds.
    Released(DownloadId),
    /// Nothing was pending for the message; at most the sending popup was closed.
    Stale,
}

/// Decides for every download whether it proceeds immediately or waits for the
/// user, and reports where finished downloads ended up.
#[derive(Clone)]
pub struct InterceptionSession {
    backend: BackendClient,
    downloads: Arc<dyn DownloadHost>,
    windows: Arc<dyn WindowHost>,
    store: Arc<dyn KeyValueStore>,
    geometry: PopupGeometry,
    pending: Arc<Mutex<HashMap<DownloadId, PendingInterception>>>,
}

impl InterceptionSession {
    pub fn new(
        backend: BackendClient,
        downloads: Arc<dyn DownloadHost>,
        windows: Arc<dyn WindowHost>,
        store: Arc<dyn KeyValueStore>,
        geometry: PopupGeometry,
    ) -> Self {
        Self {
            backend,
            downloads,
            windows,
            store,
            geometry,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<DownloadId, PendingInterception>> {
        // The map stays consistent even if a holder panicked.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    #[cfg(test)]
    pub fn is_pending(&self, id: DownloadId) -> bool {
        self.pending().contains_key(&id)
    }

    pub async fn on_determining_filename(
        &self,
        item: DownloadItem,
        suggest: FilenameSuggester,
    ) -> Interception {
        tracing::info!(
            "Intercepting download for: {}, ID: {}",
            item.filename,
            item.id
        );

        let request = CheckDownloadRequest {
            file_name: item.filename.clone(),
            file_size: wire_file_size(item.file_size),
            file_url: item.url.clone(),
        };

        let result = match self.backend.check_download(&request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Duplicate check for {} failed: {}", item.id, e);
                suggest.suggest(item.filename);
                return Interception::Proceeded;
            }
        };
        tracing::debug!("Received duplicate check for {}: {:?}", item.id, result);

        if !result.duplicate {
            tracing::info!("No duplicate found. Allowing download {} to proceed.", item.id);
            suggest.suggest(item.filename);
            return Interception::Proceeded;
        }

        tracing::info!(
            "Duplicate of {} detected for download {}, asking the user",
            result.location.as_deref().unwrap_or("unknown location"),
            item.id
        );

        let info = DuplicateFileInfo {
            download_id: item.id,
            filename: item.filename.clone(),
            url: item.url.clone(),
            location: result.location,
            timestamp: result.timestamp,
        };

        // Recorded before the popup exists so its messages always find the entry.
        self.pending().insert(
            item.id,
            PendingInterception {
                source_url: item.url,
                suggested_filename: item.filename,
                popup: None,
                suggest,
            },
        );

        match self.open_popup(&info).await {
            Ok(window) => {
                let recorded = self
                    .pending()
                    .get_mut(&item.id)
                    .map(|entry| entry.popup = Some(window))
                    .is_some();
                if recorded {
                    tracing::info!("Popup created with ID: {}", window);
                } else {
                    // Resolved by a message while the popup was being created.
                    self.close_window(window).await;
                }
                Interception::AwaitingUserChoice(window)
            }
            Err(e) => {
                tracing::error!(
                    "Could not ask about duplicate download {}: {}. Letting it proceed.",
                    item.id,
                    e
                );
                if let Some(entry) = self.pending().remove(&item.id) {
                    entry.suggest.suggest(entry.suggested_filename);
                }
                Interception::Proceeded
            }
        }
    }

    async fn open_popup(&self, info: &DuplicateFileInfo) -> Result<WindowId, AppError> {
        let value = serde_json::to_value(info)
            .map_err(|e| HostError::Storage(e.to_string()))?;
        self.store
            .set(&DuplicateFileInfo::storage_key(info.download_id), value)
            .await?;

        let spec = PopupSpec {
            download_id: info.download_id,
            width: self.geometry.width,
            height: self.geometry.height,
            left: self.geometry.left,
            top: self.geometry.top,
        };
        match self.windows.create_popup(spec).await {
            Ok(window) => Ok(window),
            Err(e) => {
                self.forget_duplicate_info(info.download_id).await;
                Err(e.into())
            }
        }
    }

    /// Applies the user's choice from a popup. Messages are routed by their
    /// download id, or by the sending window when the id is missing.
    pub async fn on_popup_message(
        &self,
        window: WindowId,
        message: PopupMessage,
    ) -> Result<Resolution, AppError> {
        let taken = {
            let mut pending = self.pending();
            let id = message.download_id.or_else(|| {
                pending
                    .iter()
                    .find(|(_, entry)| entry.popup == Some(window))
                    .map(|(id, _)| *id)
            });
            id.and_then(|id| pending.remove(&id).map(|entry| (id, entry)))
        };

        let Some((id, entry)) = taken else {
            tracing::warn!(
                "Ignoring {:?} from popup {}: no pending download for {:?}",
                message.action,
                window,
                message.download_id
            );
            self.close_window(window).await;
            return Ok(Resolution::Stale);
        };

        let popup = entry.popup.unwrap_or(window);
        match message.action {
            PopupAction::Redownload => self.redownload(id, entry, popup).await,
            PopupAction::Cancel => Ok(self.cancel(id, Some(popup)).await),
        }
    }

    /// A popup closed without an answer counts as cancelling its download.
    /// A popup that `failed` was never seen, so its download proceeds under
    /// its original name.
    pub async fn on_window_removed(&self, window: WindowId, failed: bool) -> Option<Resolution> {
        let taken = {
            let mut pending = self.pending();
            let id = pending
                .iter()
                .find(|(_, entry)| entry.popup == Some(window))
                .map(|(id, _)| *id)?;
            pending.remove(&id).map(|entry| (id, entry))
        };
        let (id, entry) = taken?;

        if failed {
            tracing::warn!(
                "Popup {} failed before an answer, letting download {} proceed",
                window,
                id
            );
            self.forget_duplicate_info(id).await;
            entry.suggest.suggest(entry.suggested_filename);
            return Some(Resolution::Released(id));
        }

        tracing::info!(
            "Popup {} closed without a choice, cancelling download {}",
            window,
            id
        );
        Some(self.cancel(id, None).await)
    }

    async fn redownload(
        &self,
        id: DownloadId,
        entry: PendingInterception,
        popup: WindowId,
    ) -> Result<Resolution, AppError> {
        tracing::info!("User chose to redownload {}", id);
        self.close_window(popup).await;
        self.forget_duplicate_info(id).await;

        let request = DownloadRequest {
            url: entry.source_url.clone(),
            filename: entry.suggested_filename.clone(),
            save_as: true,
        };
        let new = self.downloads.download(request).await?;
        tracing::info!("Redownload of {} started as {}", id, new);
        Ok(Resolution::Redownloaded { original: id, new })
    }

    async fn cancel(&self, id: DownloadId, popup: Option<WindowId>) -> Resolution {
        tracing::info!("User chose to cancel download {}", id);
        match self.downloads.cancel(id).await {
            Ok(()) => tracing::info!("Download with ID {} cancelled.", id),
            Err(e) => tracing::warn!("Cancelling download {} failed: {}", id, e),
        }
        if let Some(window) = popup {
            self.close_window(window).await;
        }
        self.forget_duplicate_info(id).await;
        Resolution::Cancelled(id)
    }

    async fn close_window(&self, window: WindowId) {
        match self.windows.remove(window).await {
            Ok(()) => tracing::debug!("Popup with ID {} closed.", window),
            Err(e) => tracing::debug!("Popup {} was already gone: {}", window, e),
        }
    }

    async fn forget_duplicate_info(&self, id: DownloadId) {
        if let Err(e) = self.store.remove(&DuplicateFileInfo::storage_key(id)).await {
            tracing::warn!("Could not clear duplicate info for {}: {}", id, e);
        }
    }

    /// Reports the save location of a download that just completed. Failures
    /// are logged and never reach the caller.
    pub async fn on_download_changed(&self, delta: DownloadDelta) {
        if !delta.completed() {
            return;
        }
        if let Err(e) = self.report_location(delta.id).await {
            tracing::error!("Reporting location of download {} failed: {}", delta.id, e);
        }
    }

    async fn report_location(&self, id: DownloadId) -> Result<(), AppError> {
        let Some(item) = self.downloads.search(id).await? else {
            tracing::warn!("Completed download {} is no longer known to the host", id);
            return Ok(());
        };
        tracing::info!("File downloaded to: {}", item.filename);

        let request = UpdateLocationRequest {
            file_name: item.filename.clone(),
            file_size: wire_file_size(item.file_size),
            file_url: item.url,
            location: item.filename,
        };
        self.backend.update_location(&request).await?;
        Ok(())
    }
}

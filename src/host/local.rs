//! Download host that saves files from HTTP(S) URLs into a local directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use reqwest::header::CONTENT_LENGTH;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Notify};
use tokio::task::AbortHandle;

use super::{DownloadHost, FilenameSuggester, HostError, HostEvent, Result};
use crate::domain::{DownloadDelta, DownloadId, DownloadItem, DownloadRequest, DownloadState};
use crate::utils::{filename_from_url, sanitize_filename, unique_path};

#[derive(Debug)]
enum TransferEvent {
    Progress { received: u64, total: Option<u64> },
    Completed(PathBuf),
    Failed(String),
}

struct Tracked {
    item: DownloadItem,
    path: Option<PathBuf>,
    transfer: Option<AbortHandle>,
}

struct Inner {
    client: Client,
    download_dir: PathBuf,
    events: mpsc::UnboundedSender<HostEvent>,
    next_id: AtomicU64,
    downloads: Mutex<HashMap<DownloadId, Tracked>>,
    idle: Notify,
}

#[derive(Clone)]
pub struct LocalDownloadHost {
    inner: Arc<Inner>,
}

impl LocalDownloadHost {
    pub fn new(download_dir: &Path, events: mpsc::UnboundedSender<HostEvent>) -> Result<Self> {
        std::fs::create_dir_all(download_dir)?;
        let download_dir = download_dir.canonicalize()?;
        Ok(Self {
            inner: Arc::new(Inner {
                client: Client::new(),
                download_dir,
                events,
                next_id: AtomicU64::new(1),
                downloads: Mutex::new(HashMap::new()),
                idle: Notify::new(),
            }),
        })
    }

    fn downloads(&self) -> MutexGuard<'_, HashMap<DownloadId, Tracked>> {
        self.inner
            .downloads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn register(&self, url: &str, filename: &str, file_size: Option<u64>) -> DownloadItem {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let item = DownloadItem {
            id,
            url: url.to_string(),
            filename: filename.to_string(),
            file_size,
            bytes_received: 0,
            state: DownloadState::InProgress,
        };
        self.downloads().insert(
            id,
            Tracked {
                item: item.clone(),
                path: None,
                transfer: None,
            },
        );
        item
    }

    /// Starts a user-initiated download. The download is announced through a
    /// determining-filename event and only hits the disk once a filename has
    /// been suggested.
    pub async fn start(&self, url: &str) -> Result<DownloadId> {
        let file_size = self.probe_size(url).await;
        let item = self.register(url, &filename_from_url(url), file_size);
        let id = item.id;
        tracing::info!("Download {} queued: {}", id, url);

        let (suggest, reply) = FilenameSuggester::channel();
        if self
            .inner
            .events
            .send(HostEvent::DeterminingFilename { item, suggest })
            .is_err()
        {
            tracing::warn!("Nobody is listening for downloads, abandoning {}", id);
            self.finish(id, DownloadState::Interrupted, None);
            return Ok(id);
        }

        let host = self.clone();
        tokio::spawn(async move {
            match reply.await {
                Ok(filename) => {
                    let filename = match sanitize_filename(&filename) {
                        name if name.is_empty() => filename_from_url(&host.url_of(id)),
                        name => name,
                    };
                    let path = unique_path(&host.inner.download_dir, &filename);
                    host.begin_transfer(id, path);
                }
                Err(_) => {
                    tracing::info!("Download {} was never named, abandoning it", id);
                    host.finish(id, DownloadState::Interrupted, None);
                }
            }
        });

        Ok(id)
    }

    async fn probe_size(&self, url: &str) -> Option<u64> {
        match self.inner.client.head(url).send().await {
            Ok(response) if response.status().is_success() => response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok()),
            Ok(response) => {
                tracing::debug!("HEAD {} returned {}", url, response.status());
                None
            }
            Err(e) => {
                tracing::debug!("HEAD {} failed: {}", url, e);
                None
            }
        }
    }

    fn url_of(&self, id: DownloadId) -> String {
        self.downloads()
            .get(&id)
            .map(|t| t.item.url.clone())
            .unwrap_or_default()
    }

    fn begin_transfer(&self, id: DownloadId, path: PathBuf) {
        let url = {
            let mut downloads = self.downloads();
            let Some(tracked) = downloads.get_mut(&id) else {
                return;
            };
            if tracked.item.state != DownloadState::InProgress {
                // Cancelled while waiting for a name or a save dialog.
                return;
            }
            tracked.path = Some(path.clone());
            tracked.item.url.clone()
        };
        tracing::info!("Downloading {} to: {}", id, path.display());

        let host = self.clone();
        let stream = transfer_stream(self.inner.client.clone(), url, path);
        let handle = tokio::spawn(async move { host.drive_transfer(id, stream).await });

        if let Some(tracked) = self.downloads().get_mut(&id) {
            tracked.transfer = Some(handle.abort_handle());
        }
    }

    async fn drive_transfer(&self, id: DownloadId, mut stream: BoxStream<'static, TransferEvent>) {
        while let Some(event) = stream.next().await {
            match event {
                TransferEvent::Progress { received, total } => {
                    if let Some(tracked) = self.downloads().get_mut(&id) {
                        tracked.item.bytes_received = received;
                        if tracked.item.file_size.is_none() {
                            tracked.item.file_size = total;
                        }
                    }
                }
                TransferEvent::Completed(path) => {
                    tracing::info!("Saved: {}", path.display());
                    self.finish(id, DownloadState::Complete, Some(path));
                }
                TransferEvent::Failed(e) => {
                    tracing::error!("Download {} failed: {}", id, e);
                    self.discard_partial(id).await;
                    self.finish(id, DownloadState::Interrupted, None);
                }
            }
        }
    }

    async fn discard_partial(&self, id: DownloadId) {
        let path = self.downloads().get(&id).and_then(|t| t.path.clone());
        if let Some(path) = path {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Could not remove partial file {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Moves a download to a terminal state and announces the change.
    fn finish(&self, id: DownloadId, state: DownloadState, saved_to: Option<PathBuf>) {
        let previous = {
            let mut downloads = self.downloads();
            let Some(tracked) = downloads.get_mut(&id) else {
                return;
            };
            let previous = tracked.item.state;
            if previous.is_terminal() {
                return;
            }
            tracked.item.state = state;
            tracked.transfer = None;
            if let Some(path) = saved_to {
                tracked.item.filename = path.display().to_string();
                if tracked.item.file_size.is_none() {
                    tracked.item.file_size = Some(tracked.item.bytes_received);
                }
            }
            previous
        };

        let delta = DownloadDelta {
            id,
            previous: Some(previous),
            current: Some(state),
        };
        if self.inner.events.send(HostEvent::Changed(delta)).is_err() {
            tracing::debug!("Change of download {} went unobserved", id);
        }
        self.inner.idle.notify_waiters();
    }

    fn all_settled(&self) -> bool {
        self.downloads()
            .values()
            .all(|t| t.item.state.is_terminal())
    }

    /// Resolves once every known download has completed or been interrupted.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.all_settled() {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl DownloadHost for LocalDownloadHost {
    async fn download(&self, request: DownloadRequest) -> Result<DownloadId> {
        let filename = match sanitize_filename(&request.filename) {
            name if name.is_empty() => filename_from_url(&request.url),
            name => name,
        };
        let item = self.register(&request.url, &filename, None);
        let id = item.id;
        let host = self.clone();

        tokio::spawn(async move {
            let path = if request.save_as {
                rfd::AsyncFileDialog::new()
                    .set_directory(&host.inner.download_dir)
                    .set_file_name(&filename)
                    .save_file()
                    .await
                    .map(|handle| handle.path().to_path_buf())
            } else {
                Some(unique_path(&host.inner.download_dir, &filename))
            };

            match path {
                Some(path) => host.begin_transfer(id, path),
                None => {
                    tracing::info!("Save dialog for download {} dismissed", id);
                    host.finish(id, DownloadState::Interrupted, None);
                }
            }
        });

        Ok(id)
    }

    async fn cancel(&self, id: DownloadId) -> Result<()> {
        let transfer = {
            let mut downloads = self.downloads();
            let tracked = downloads
                .get_mut(&id)
                .ok_or(HostError::UnknownDownload(id))?;
            if tracked.item.state.is_terminal() {
                return Ok(());
            }
            tracked.transfer.take()
        };

        if let Some(transfer) = transfer {
            transfer.abort();
        }
        self.discard_partial(id).await;
        self.finish(id, DownloadState::Interrupted, None);
        Ok(())
    }

    async fn search(&self, id: DownloadId) -> Result<Option<DownloadItem>> {
        Ok(self.downloads().get(&id).map(|t| t.item.clone()))
    }
}

fn transfer_stream(client: Client, url: String, path: PathBuf) -> BoxStream<'static, TransferEvent> {
    futures::stream::unfold(
        TransferState::Start { client, url, path },
        |state| async move {
            match state {
                TransferState::Start { client, url, path } => {
                    let response = match client
                        .get(&url)
                        .send()
                        .await
                        .and_then(|r| r.error_for_status())
                    {
                        Ok(response) => response,
                        Err(e) => {
                            return Some((
                                TransferEvent::Failed(format!("Download request failed: {}", e)),
                                TransferState::Finished,
                            ));
                        }
                    };

                    let file = match tokio::fs::File::create(&path).await {
                        Ok(file) => file,
                        Err(e) => {
                            return Some((
                                TransferEvent::Failed(format!("Failed to create file: {}", e)),
                                TransferState::Finished,
                            ));
                        }
                    };

                    let total = response.content_length();
                    Some((
                        TransferEvent::Progress { received: 0, total },
                        TransferState::Downloading {
                            file,
                            stream: response.bytes_stream().boxed(),
                            received: 0,
                            total,
                            path,
                        },
                    ))
                }
                TransferState::Downloading {
                    mut file,
                    mut stream,
                    mut received,
                    total,
                    path,
                } => match stream.next().await {
                    Some(Ok(chunk)) => {
                        if let Err(e) = file.write_all(&chunk).await {
                            return Some((
                                TransferEvent::Failed(format!("Write error: {}", e)),
                                TransferState::Finished,
                            ));
                        }

                        received += chunk.len() as u64;

                        Some((
                            TransferEvent::Progress { received, total },
                            TransferState::Downloading {
                                file,
                                stream,
                                received,
                                total,
                                path,
                            },
                        ))
                    }
                    Some(Err(e)) => Some((
                        TransferEvent::Failed(e.to_string()),
                        TransferState::Finished,
                    )),
                    None => {
                        if let Err(e) = file.sync_all().await {
                            return Some((
                                TransferEvent::Failed(format!("Failed to sync file: {}", e)),
                                TransferState::Finished,
                            ));
                        }

                        Some((TransferEvent::Completed(path), TransferState::Finished))
                    }
                },
                TransferState::Finished => None,
            }
        },
    )
    .boxed()
}

enum TransferState {
    Start {
        client: Client,
        url: String,
        path: PathBuf,
    },
    Downloading {
        file: tokio::fs::File,
        stream: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
        received: u64,
        total: Option<u64>,
        path: PathBuf,
    },
    Finished,
}

//! In-memory hosts for exercising the session without a desktop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::interception_session::{InterceptionSession, PopupGeometry};
use crate::api::{ApiConfig, BackendClient, RetryPolicy, RetryingFetcher};
use crate::domain::{DownloadId, DownloadItem, DownloadRequest, PopupSpec, WindowId};
use crate::host::{DownloadHost, HostError, KeyValueStore, Result, WindowHost};

#[derive(Default)]
pub struct FakeDownloads {
    pub started: Mutex<Vec<DownloadRequest>>,
    pub cancelled: Mutex<Vec<DownloadId>>,
    pub items: Mutex<HashMap<DownloadId, DownloadItem>>,
}

#[async_trait]
impl DownloadHost for FakeDownloads {
    async fn download(&self, request: DownloadRequest) -> Result<DownloadId> {
        let mut started = self.started.lock().unwrap();
        started.push(request);
        Ok(100 + started.len() as DownloadId)
    }

    async fn cancel(&self, id: DownloadId) -> Result<()> {
        self.cancelled.lock().unwrap().push(id);
        Ok(())
    }

    async fn search(&self, id: DownloadId) -> Result<Option<DownloadItem>> {
        Ok(self.items.lock().unwrap().get(&id).cloned())
    }
}

#[derive(Default)]
pub struct FakeWindows {
    pub fail: bool,
    pub created: Mutex<Vec<PopupSpec>>,
    pub removed: Mutex<Vec<WindowId>>,
}

#[async_trait]
impl WindowHost for FakeWindows {
    async fn create_popup(&self, spec: PopupSpec) -> Result<WindowId> {
        if self.fail {
            return Err(HostError::Io(std::io::Error::other("no display")));
        }
        let mut created = self.created.lock().unwrap();
        created.push(spec);
        Ok(created.len() as WindowId)
    }

    async fn remove(&self, id: WindowId) -> Result<()> {
        self.removed.lock().unwrap().push(id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore(Mutex<HashMap<String, Value>>);

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.0.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.0.lock().unwrap().get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.0.lock().unwrap().remove(key);
        Ok(())
    }
}

pub struct Harness {
    pub session: InterceptionSession,
    pub downloads: Arc<FakeDownloads>,
    pub windows: Arc<FakeWindows>,
    pub store: Arc<MemoryStore>,
}

/// A session wired to fakes and to a backend at `server`, with retries off.
pub fn harness(server: &mockito::Server, windows: FakeWindows) -> Harness {
    let fetcher = RetryingFetcher::new(RetryPolicy {
        max_retries: 0,
        initial_delay: Duration::from_millis(1),
        timeout: Duration::from_secs(5),
    });
    let backend = BackendClient::new(
        ApiConfig {
            base_url: server.url(),
        },
        fetcher,
    );
    let downloads = Arc::new(FakeDownloads::default());
    let windows = Arc::new(windows);
    let store = Arc::new(MemoryStore::default());
    let session = InterceptionSession::new(
        backend,
        downloads.clone(),
        windows.clone(),
        store.clone(),
        PopupGeometry::default(),
    );
    Harness {
        session,
        downloads,
        windows,
        store,
    }
}

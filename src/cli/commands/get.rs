//! `dupe-guard get <url>...` – download through the interception session.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::{mpsc, oneshot};
use url::Url;

use crate::api::{BackendClient, RetryingFetcher};
use crate::application::{event_loop, InterceptionSession};
use crate::config::Config;
use crate::domain::DownloadState;
use crate::host::local::LocalDownloadHost;
use crate::host::popup_process::ProcessWindowHost;
use crate::host::storage::JsonFileStore;
use crate::host::DownloadHost;

pub async fn run_get(cfg: &Config, urls: &[String], dir: Option<PathBuf>) -> Result<()> {
    for url in urls {
        let parsed = Url::parse(url).with_context(|| format!("invalid URL: {}", url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("only http and https URLs can be downloaded: {}", url);
        }
    }

    let download_dir = dir.unwrap_or_else(|| cfg.download_dir());
    let store = JsonFileStore::new(cfg.store_path()?);
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let downloads = LocalDownloadHost::new(&download_dir, events_tx.clone())
        .with_context(|| format!("preparing {}", download_dir.display()))?;
    let windows = ProcessWindowHost::new(
        std::env::current_exe()?,
        vec!["popup".into()],
        store.path(),
        events_tx,
    );
    let backend = BackendClient::new(cfg.api_config(), RetryingFetcher::new(cfg.retry_policy()));
    let session = InterceptionSession::new(
        backend,
        Arc::new(downloads.clone()),
        Arc::new(windows),
        Arc::new(store),
        cfg.popup_geometry(),
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let event_loop = tokio::spawn(event_loop::run(session, events_rx, shutdown_rx));

    let mut ids = Vec::with_capacity(urls.len());
    for url in urls {
        ids.push(downloads.start(url).await?);
    }

    downloads.wait_idle().await;
    let _ = shutdown_tx.send(());
    event_loop.await.context("event loop panicked")?;

    let mut finished = 0;
    for id in ids {
        let Some(item) = downloads.search(id).await? else {
            continue;
        };
        match item.state {
            DownloadState::Complete => {
                finished += 1;
                println!("Saved: {}", item.filename);
            }
            _ => println!("Not downloaded: {}", item.url),
        }
    }
    tracing::info!("{} of {} downloads saved", finished, urls.len());

    Ok(())
}

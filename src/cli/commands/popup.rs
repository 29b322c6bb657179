//! `dupe-guard popup` – the confirmation window launched by `get`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use iced::{window, Point, Size};

use crate::app::{self, PopupApp};
use crate::domain::{DownloadId, DuplicateFileInfo};
use crate::host::storage::JsonFileStore;
use crate::host::KeyValueStore;

#[derive(Debug, Args)]
pub struct PopupArgs {
    /// Download the popup asks about.
    #[arg(long)]
    pub download_id: DownloadId,

    /// Store holding the duplicate details.
    #[arg(long, value_name = "PATH")]
    pub store: PathBuf,

    #[arg(long, default_value_t = 400)]
    pub width: u32,

    #[arg(long, default_value_t = 200)]
    pub height: u32,

    #[arg(long, default_value_t = 100, allow_negative_numbers = true)]
    pub left: i32,

    #[arg(long, default_value_t = 100, allow_negative_numbers = true)]
    pub top: i32,
}

async fn load_info(args: &PopupArgs) -> Option<DuplicateFileInfo> {
    let store = JsonFileStore::new(&args.store);
    let key = DuplicateFileInfo::storage_key(args.download_id);
    match store.get(&key).await {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!("{} is malformed: {}", key, e);
                None
            }
        },
        Ok(None) => {
            tracing::warn!("No duplicate details stored under {}", key);
            None
        }
        Err(e) => {
            tracing::warn!("Reading {} failed: {}", args.store.display(), e);
            None
        }
    }
}

pub fn run_popup(args: PopupArgs) -> Result<()> {
    let info = tokio::runtime::Runtime::new()?.block_on(load_info(&args));
    let download_id = args.download_id;

    iced::application(
        move || PopupApp::new(download_id, info.as_ref()),
        app::update,
        app::view,
    )
    .title("Duplicate download")
    .window(window::Settings {
        size: Size::new(args.width as f32, args.height as f32),
        position: window::Position::Specific(Point::new(args.left as f32, args.top as f32)),
        resizable: false,
        ..Default::default()
    })
    .run()?;

    Ok(())
}

pub mod error;
pub mod model;

pub use error::AppError;
pub use model::{
    DownloadDelta, DownloadId, DownloadItem, DownloadRequest, DownloadState, DuplicateFileInfo,
    PopupAction, PopupMessage, PopupSpec, WindowId,
};

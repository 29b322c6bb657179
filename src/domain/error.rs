use thiserror::Error;

use crate::api::FetchError;
use crate::host::HostError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("backend request failed: {0}")]
    Backend(#[from] FetchError),

    #[error("host error: {0}")]
    Host(#[from] HostError),
}

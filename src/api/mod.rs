mod client;
mod fetch;
mod models;

pub use client::BackendClient;
pub use fetch::{FetchError, RetryPolicy, RetryingFetcher};
pub use models::{wire_file_size, ApiConfig, CheckDownloadRequest, UpdateLocationRequest};

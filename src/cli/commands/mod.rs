mod get;
mod popup;

pub use get::run_get;
pub use popup::{run_popup, PopupArgs};

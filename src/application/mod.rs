pub mod event_loop;
pub mod interception_session;

#[cfg(test)]
pub(crate) mod testing;

pub use interception_session::{InterceptionSession, PopupGeometry};

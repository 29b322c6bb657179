use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use super::interception_session::InterceptionSession;
use crate::host::HostEvent;

/// Feeds host events into the session until `shutdown` fires, then drains
/// anything already queued and waits for every task it spawned.
///
/// Duplicate checks and location reports run as their own tasks; popup
/// messages and window closures are applied in arrival order.
pub async fn run(
    session: InterceptionSession,
    mut events: mpsc::UnboundedReceiver<HostEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Some(event) => dispatch(&session, event, &mut tasks).await,
                None => break,
            },
            _ = &mut shutdown => {
                while let Ok(event) = events.try_recv() {
                    dispatch(&session, event, &mut tasks).await;
                }
                break;
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(joined),
        }
    }

    while let Some(joined) = tasks.join_next().await {
        log_join(joined);
    }
    match session.pending_count() {
        0 => tracing::debug!("Event loop stopped"),
        n => tracing::warn!("Event loop stopped with {} interceptions unresolved", n),
    }
}

async fn dispatch(session: &InterceptionSession, event: HostEvent, tasks: &mut JoinSet<()>) {
    match event {
        HostEvent::DeterminingFilename { item, suggest } => {
            let session = session.clone();
            tasks.spawn(async move {
                session.on_determining_filename(item, suggest).await;
            });
        }
        HostEvent::Changed(delta) => {
            if delta.completed() {
                let session = session.clone();
                tasks.spawn(async move { session.on_download_changed(delta).await });
            }
        }
        HostEvent::PopupMessage { window, message } => {
            if let Err(e) = session.on_popup_message(window, message).await {
                tracing::error!("Handling {:?} from popup {} failed: {}", message, window, e);
            }
        }
        HostEvent::WindowRemoved { window, failed } => {
            session.on_window_removed(window, failed).await;
        }
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!("Session task failed: {}", e);
    }
}

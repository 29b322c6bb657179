//! Confirmation popups run as child processes.
//!
//! Each popup prints its answer as one JSON line on stdout. Lines are
//! forwarded as [`HostEvent::PopupMessage`] and the process exiting is
//! reported as [`HostEvent::WindowRemoved`], flagged as failed when it exited
//! with an error status.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use super::{HostError, HostEvent, Result, WindowHost};
use crate::domain::{PopupMessage, PopupSpec, WindowId};

pub struct ProcessWindowHost {
    program: PathBuf,
    base_args: Vec<OsString>,
    store_path: PathBuf,
    events: mpsc::UnboundedSender<HostEvent>,
    next_id: AtomicU64,
    open: Arc<Mutex<OpenPopups>>,
}

// Sending on a handle asks that popup's watcher to kill it.
type OpenPopups = HashMap<WindowId, oneshot::Sender<()>>;

fn lock(open: &Mutex<OpenPopups>) -> MutexGuard<'_, OpenPopups> {
    open.lock().unwrap_or_else(|e| e.into_inner())
}

impl ProcessWindowHost {
    /// Popups are launched as `program <base_args> --download-id N --store PATH
    /// --width W --height H --left X --top Y`.
    pub fn new(
        program: impl Into<PathBuf>,
        base_args: Vec<OsString>,
        store_path: impl Into<PathBuf>,
        events: mpsc::UnboundedSender<HostEvent>,
    ) -> Self {
        Self {
            program: program.into(),
            base_args,
            store_path: store_path.into(),
            events,
            next_id: AtomicU64::new(1),
            open: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn command(&self, spec: &PopupSpec) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .arg("--download-id")
            .arg(spec.download_id.to_string())
            .arg("--store")
            .arg(&self.store_path)
            .arg("--width")
            .arg(spec.width.to_string())
            .arg("--height")
            .arg(spec.height.to_string())
            .arg("--left")
            .arg(spec.left.to_string())
            .arg("--top")
            .arg(spec.top.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl WindowHost for ProcessWindowHost {
    async fn create_popup(&self, spec: PopupSpec) -> Result<WindowId> {
        let child = self.command(&spec).spawn()?;
        let window = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (kill_tx, kill_rx) = oneshot::channel();
        lock(&self.open).insert(window, kill_tx);

        tracing::debug!(
            "Popup {} for download {} started as pid {:?}",
            window,
            spec.download_id,
            child.id()
        );

        let events = self.events.clone();
        let open = Arc::clone(&self.open);
        tokio::spawn(async move {
            let failed = watch_popup(window, child, kill_rx, &events).await;
            lock(&open).remove(&window);
            if events
                .send(HostEvent::WindowRemoved { window, failed })
                .is_err()
            {
                tracing::debug!("Closing of popup {} went unobserved", window);
            }
        });

        Ok(window)
    }

    async fn remove(&self, id: WindowId) -> Result<()> {
        let kill = lock(&self.open)
            .remove(&id)
            .ok_or(HostError::UnknownWindow(id))?;
        // The watcher may already be reaping an exited popup.
        let _ = kill.send(());
        Ok(())
    }
}

/// Returns whether the popup failed, i.e. exited with an error status or
/// could not be waited on. A popup killed through `remove` has not failed.
async fn watch_popup(
    window: WindowId,
    mut child: Child,
    mut kill: oneshot::Receiver<()>,
    events: &mpsc::UnboundedSender<HostEvent>,
) -> bool {
    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => forward_line(window, &line, events),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Reading from popup {} failed: {}", window, e);
                        break;
                    }
                },
                _ = &mut kill => {
                    stop(window, &mut child).await;
                    return false;
                }
            }
        }
    }

    tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => {
                tracing::debug!("Popup {} exited with {}", window, status);
                false
            }
            Ok(status) => {
                tracing::warn!("Popup {} exited with {}", window, status);
                true
            }
            Err(e) => {
                tracing::warn!("Waiting for popup {} failed: {}", window, e);
                true
            }
        },
        _ = &mut kill => {
            stop(window, &mut child).await;
            false
        }
    }
}

fn forward_line(window: WindowId, line: &str, events: &mpsc::UnboundedSender<HostEvent>) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<PopupMessage>(line) {
        Ok(message) => {
            if events
                .send(HostEvent::PopupMessage { window, message })
                .is_err()
            {
                tracing::debug!("Message from popup {} went unobserved", window);
            }
        }
        Err(e) => tracing::warn!("Popup {} sent an unreadable message {:?}: {}", window, line, e),
    }
}

async fn stop(window: WindowId, child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::debug!("Popup {} could not be killed: {}", window, e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::PopupAction;
    use std::time::Duration;
    use tokio::time::timeout;

    fn spec(download_id: u64) -> PopupSpec {
        PopupSpec {
            download_id,
            width: 400,
            height: 200,
            left: 100,
            top: 100,
        }
    }

    fn shell_host(script: &str, events: mpsc::UnboundedSender<HostEvent>) -> ProcessWindowHost {
        // `sh -c SCRIPT` ignores the trailing popup arguments.
        ProcessWindowHost::new(
            "sh",
            vec!["-c".into(), script.into(), "popup".into()],
            "/tmp/unused.json",
            events,
        )
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<HostEvent>) -> HostEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("popup event")
            .expect("channel open")
    }

    #[tokio::test]
    async fn forwards_answer_then_reports_exit() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let host = shell_host(
            r#"echo 'not json'; echo '{"action":"redownload","downloadId":5}'"#,
            tx,
        );

        let window = host.create_popup(spec(5)).await.unwrap();

        match next_event(&mut rx).await {
            HostEvent::PopupMessage { window: w, message } => {
                assert_eq!(w, window);
                assert_eq!(message.action, PopupAction::Redownload);
                assert_eq!(message.download_id, Some(5));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(
            next_event(&mut rx).await,
            HostEvent::WindowRemoved { window: w, failed: false } if w == window
        ));
    }

    #[tokio::test]
    async fn error_exit_is_reported_as_failed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let host = shell_host("exit 1", tx);

        let window = host.create_popup(spec(2)).await.unwrap();

        assert!(matches!(
            next_event(&mut rx).await,
            HostEvent::WindowRemoved { window: w, failed: true } if w == window
        ));
    }

    #[tokio::test]
    async fn remove_kills_a_waiting_popup() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let host = shell_host("sleep 30", tx);

        let window = host.create_popup(spec(1)).await.unwrap();
        host.remove(window).await.unwrap();

        assert!(matches!(
            next_event(&mut rx).await,
            HostEvent::WindowRemoved { window: w, failed: false } if w == window
        ));
        assert!(matches!(
            host.remove(window).await,
            Err(HostError::UnknownWindow(_))
        ));
    }
}

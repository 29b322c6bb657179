use std::io::Write;

use iced::Task;

use crate::domain::{DownloadId, DuplicateFileInfo, PopupAction, PopupMessage};
use crate::ui::{ConfirmMessage, ConfirmView};

pub struct PopupApp {
    view: ConfirmView,
    download_id: DownloadId,
}

impl PopupApp {
    pub fn new(download_id: DownloadId, info: Option<&DuplicateFileInfo>) -> Self {
        Self {
            view: ConfirmView::new(info),
            download_id,
        }
    }

    fn answer(&self, action: PopupAction) -> PopupMessage {
        PopupMessage {
            action,
            download_id: Some(self.download_id),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(ConfirmMessage),
}

/// Writes the answer as one JSON line on stdout, which the interceptor reads.
fn send_answer(message: &PopupMessage) {
    let line = match serde_json::to_string(message) {
        Ok(line) => line,
        Err(e) => {
            tracing::error!("Could not encode popup answer: {}", e);
            return;
        }
    };
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", line).and_then(|_| stdout.flush()) {
        tracing::error!("Could not send popup answer: {}", e);
    }
}

pub fn update(app: &mut PopupApp, message: Message) -> Task<Message> {
    match message {
        Message::UiMessage(ui_msg) => {
            if app.view.is_answered {
                return Task::none();
            }
            app.view.update(ui_msg);

            let action = match ui_msg {
                ConfirmMessage::RedownloadPressed => PopupAction::Redownload,
                ConfirmMessage::CancelPressed => PopupAction::Cancel,
            };
            tracing::info!("{:?} chosen for download {}", action, app.download_id);
            send_answer(&app.answer(action));

            // Close the popup once the answer is out
            iced::exit()
        }
    }
}

pub fn view(app: &PopupApp) -> iced::Element<'_, Message> {
    app.view.view().map(Message::UiMessage)
}

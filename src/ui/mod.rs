use iced::{
    widget::{button, column, row, text, Space},
    Element, Length,
};

use crate::domain::DuplicateFileInfo;

/// Confirmation view state
pub struct ConfirmView {
    pub filename: String,
    pub location: String,
    pub timestamp: String,
    pub is_answered: bool,
}

impl ConfirmView {
    pub fn new(info: Option<&DuplicateFileInfo>) -> Self {
        match info {
            Some(info) => Self {
                filename: info.filename.clone(),
                location: info.location.clone().unwrap_or_else(|| "unknown".to_string()),
                timestamp: info.timestamp.clone().unwrap_or_else(|| "unknown".to_string()),
                is_answered: false,
            },
            None => Self {
                filename: "unknown".to_string(),
                location: "unknown".to_string(),
                timestamp: "unknown".to_string(),
                is_answered: false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmMessage {
    RedownloadPressed,
    CancelPressed,
}

impl ConfirmView {
    pub fn update(&mut self, message: ConfirmMessage) {
        match message {
            ConfirmMessage::RedownloadPressed | ConfirmMessage::CancelPressed => {
                // The answer itself is sent by the app
                self.is_answered = true;
            }
        }
    }

    pub fn view(&self) -> Element<'_, ConfirmMessage> {
        let mut redownload = button("Redownload").padding([10, 20]);
        let mut cancel = button("Cancel").padding([10, 20]);
        if !self.is_answered {
            redownload = redownload.on_press(ConfirmMessage::RedownloadPressed);
            cancel = cancel.on_press(ConfirmMessage::CancelPressed);
        }

        column![
            text("This file was downloaded before").size(18),
            Space::new().height(Length::Fixed(10.0)),
            text(format!("Filename: {}", self.filename)).size(14),
            text(format!("Location: {}", self.location)).size(14),
            text(format!("Timestamp: {}", self.timestamp)).size(14),
            Space::new().height(Length::Fixed(10.0)),
            row![redownload, cancel].spacing(10),
        ]
        .padding(20)
        .spacing(5)
        .into()
    }
}

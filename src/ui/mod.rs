use iced::{
    widget::{button, column, pick_list, progress_bar, radio, row, text, text_input, Space},
    Element, Length,
};

use crate::application::DownloadSession;
use crate::domain::{DownloadPhase, MediaFormat, VariantChoice};

#[derive(Debug, Clone)]
pub enum DownloadMessage {
    UrlChanged(String),
    LoadFormatsPressed,
    FormatSelected(MediaFormat),
    ChoiceSelected(VariantChoice),
    DownloadPressed,
    CancelPressed,
}

fn format_label(format: MediaFormat) -> &'static str {
    match format {
        MediaFormat::Mp4 => "MP4 (video)",
        MediaFormat::Mp3 => "MP3 (audio)",
    }
}

fn download_button_label(session: &DownloadSession) -> String {
    match session.phase() {
        DownloadPhase::Initiating => "Preparing...".to_string(),
        DownloadPhase::AwaitingProgress | DownloadPhase::Downloading => {
            format!("Downloading... {}%", session.progress())
        }
        DownloadPhase::Finalizing => "Finishing...".to_string(),
        _ => "Download".to_string(),
    }
}

/// Render the session. All state lives in the session; this only reads it.
pub fn view(session: &DownloadSession) -> Element<'_, DownloadMessage> {
    let enabled = session.control_enabled();
    let task_active = session.phase().is_task_active();

    let mut url_input = text_input("Paste a video URL...", session.source()).padding(10);
    if !task_active {
        url_input = url_input
            .on_input(DownloadMessage::UrlChanged)
            .on_submit(DownloadMessage::LoadFormatsPressed);
    }

    let formats = MediaFormat::ALL.iter().fold(row![].spacing(20), |row, format| {
        row.push(radio(
            format_label(*format),
            *format,
            Some(session.format()),
            DownloadMessage::FormatSelected,
        ))
    });

    let mut content = column![
        text("Media Downloader").size(32),
        Space::new().height(Length::Fixed(20.0)),
        text("Media URL:").size(16),
        url_input,
        row![
            formats,
            button("Load formats")
                .on_press_maybe(enabled.then_some(DownloadMessage::LoadFormatsPressed))
                .padding([6, 12]),
        ]
        .spacing(20),
        pick_list(
            session.choices(),
            session.selected_choice(),
            DownloadMessage::ChoiceSelected,
        )
        .placeholder("Select quality"),
    ]
    .padding(20)
    .spacing(10);

    if task_active {
        content = content.push(progress_bar(0.0..=100.0, f32::from(session.progress())));
    }

    content = content.push(text(session.status_text()).size(14));

    if let Some(link) = session.download_link() {
        content = content.push(text(format!("Mirror: {}", link)).size(12));
    }

    content
        .push(Space::new().height(Length::Fixed(20.0)))
        .push(
            row![
                button(text(download_button_label(session)))
                    .on_press_maybe(enabled.then_some(DownloadMessage::DownloadPressed))
                    .padding([10, 20]),
                button("Cancel")
                    .on_press_maybe(task_active.then_some(DownloadMessage::CancelPressed))
                    .padding([10, 20]),
            ]
            .spacing(10),
        )
        .into()
}

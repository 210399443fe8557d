use std::path::PathBuf;

use iced::task::Handle;
use iced::Task;
use tracing::warn;

use crate::api::{ApiClient, ApiConfig};
use crate::application::{
    fallback_filename, DownloadCoordinator, DownloadSession, DownloadUpdate, TerminalReport,
};
use crate::domain::{AppError, FormatCatalog};
use crate::ui::{self, DownloadMessage};

pub struct DownloadApp {
    session: DownloadSession,
    coordinator: DownloadCoordinator,
    // Aborting drops the progress stream
    active_download: Option<Handle>,
}

impl Default for DownloadApp {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadApp {
    pub fn new() -> Self {
        let api_client = ApiClient::new(ApiConfig::from_env());

        Self {
            session: DownloadSession::new(),
            coordinator: DownloadCoordinator::new(api_client),
            active_download: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(DownloadMessage),
    /// (Source it was resolved for, result)
    FormatsResolved(String, Result<FormatCatalog, AppError>),
    Download(DownloadUpdate),
    /// Final result after saving the artifact
    ArtifactSaved(Result<Option<PathBuf>, AppError>),
}

pub fn update(app: &mut DownloadApp, message: Message) -> Task<Message> {
    match message {
        Message::UiMessage(ui_msg) => return handle_ui(app, ui_msg),
        Message::FormatsResolved(source, result) => {
            app.session.catalog_resolved(&source, result);
        }
        Message::Download(update) => {
            if let Some(report) = app.session.apply(update) {
                app.active_download = None;
                if let TerminalReport::Completed(artifact) = report {
                    let fallback = fallback_filename(
                        app.session.catalog().and_then(|c| c.title.as_deref()),
                        app.session.format(),
                    );
                    let coordinator = app.coordinator.clone();
                    return Task::perform(
                        async move { coordinator.deliver_artifact(artifact, fallback).await },
                        Message::ArtifactSaved,
                    );
                }
            }
        }
        Message::ArtifactSaved(result) => {
            app.session.artifact_delivered(result);
        }
    }
    Task::none()
}

fn handle_ui(app: &mut DownloadApp, message: DownloadMessage) -> Task<Message> {
    match message {
        DownloadMessage::UrlChanged(url) => app.session.set_source(url),
        DownloadMessage::FormatSelected(format) => app.session.set_format(format),
        DownloadMessage::ChoiceSelected(choice) => app.session.select(choice.selector),
        DownloadMessage::LoadFormatsPressed => match app.session.begin_resolve() {
            Ok(source) => {
                let coordinator = app.coordinator.clone();
                let requested = source.clone();
                return Task::perform(
                    async move { coordinator.resolve_formats(requested).await },
                    move |result| Message::FormatsResolved(source.clone(), result),
                );
            }
            Err(e) => warn!(error = %e, "format lookup not started"),
        },
        DownloadMessage::DownloadPressed => match app.session.begin_download() {
            Ok(request) => {
                let (task, handle) = Task::stream(app.coordinator.download_stream(request))
                    .map(Message::Download)
                    .abortable();
                app.active_download = Some(handle);
                return task;
            }
            Err(e) => warn!(error = %e, "download not started"),
        },
        DownloadMessage::CancelPressed => {
            if let Some(handle) = app.active_download.take() {
                handle.abort();
            }
            app.session.cancel();
        }
    }
    Task::none()
}

pub fn view(app: &DownloadApp) -> iced::Element<'_, Message> {
    ui::view(&app.session).map(Message::UiMessage)
}

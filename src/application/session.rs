use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::download_coordinator::{DownloadEvent, DownloadUpdate};
use crate::domain::{
    error::GENERIC_FAILURE, AppError, Artifact, DownloadPhase, DownloadRequest, FormatCatalog,
    MediaFormat, TaskId, VariantChoice, VariantSelector,
};
use crate::utils::generate_task_id;

/// The one terminal outcome surfaced for a task.
#[derive(Debug, Clone)]
pub enum TerminalReport {
    Completed(Artifact),
    Errored(AppError),
}

/// Client-side state for one source reference and at most one in-flight task.
///
/// Every UI-visible field lives here; the async side only ever talks back
/// through [`DownloadSession::catalog_resolved`] and [`DownloadSession::apply`],
/// which drop results that no longer belong to the current request.
#[derive(Debug)]
pub struct DownloadSession {
    phase: DownloadPhase,
    source: String,
    format: MediaFormat,
    catalog: Option<FormatCatalog>,
    selection: Option<VariantSelector>,
    task_id: Option<TaskId>,
    used_task_ids: HashSet<TaskId>,
    progress: u8,
    download_link: Option<String>,
    error: Option<AppError>,
    notice: Option<String>,
}

impl Default for DownloadSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadSession {
    pub fn new() -> Self {
        let mut session = Self {
            phase: DownloadPhase::Idle,
            source: String::new(),
            format: MediaFormat::default(),
            catalog: None,
            selection: None,
            task_id: None,
            used_task_ids: HashSet::new(),
            progress: 0,
            download_link: None,
            error: None,
            notice: None,
        };
        session.reset_selection();
        session
    }

    pub fn phase(&self) -> DownloadPhase {
        self.phase
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn format(&self) -> MediaFormat {
        self.format
    }

    pub fn catalog(&self) -> Option<&FormatCatalog> {
        self.catalog.as_ref()
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn download_link(&self) -> Option<&str> {
        self.download_link.as_deref()
    }

    /// Whether the user may edit inputs and start a new action.
    pub fn control_enabled(&self) -> bool {
        !(self.phase == DownloadPhase::FormatsLoading || self.phase.is_task_active())
    }

    /// Catalog entries for the chosen format, or quick tiers when no catalog is held.
    pub fn choices(&self) -> Vec<VariantChoice> {
        match &self.catalog {
            Some(catalog) => catalog
                .variants(self.format.kind())
                .iter()
                .map(VariantChoice::from_variant)
                .collect(),
            None => self
                .format
                .quick_tiers()
                .iter()
                .map(|tier| VariantChoice::quick(tier))
                .collect(),
        }
    }

    pub fn selected_choice(&self) -> Option<VariantChoice> {
        let selection = self.selection.as_ref()?;
        self.choices().into_iter().find(|c| &c.selector == selection)
    }

    fn reset_selection(&mut self) {
        self.selection = self.choices().into_iter().next().map(|c| c.selector);
    }

    /// The input text changed. Invalidates any resolved catalog.
    pub fn set_source(&mut self, source: String) {
        if self.phase.is_task_active() {
            return;
        }
        self.source = source;
        self.catalog = None;
        self.error = None;
        self.notice = None;
        self.download_link = None;
        self.phase = DownloadPhase::Idle;
        self.reset_selection();
    }

    /// `Idle -> FormatsLoading`. Returns the source to resolve.
    pub fn begin_resolve(&mut self) -> Result<String, AppError> {
        if !self.control_enabled() {
            return Err(AppError::InvalidInput(
                "Another request is already in progress".to_string(),
            ));
        }
        let source = self.source.trim().to_string();
        if source.is_empty() {
            return Err(self.reject_empty_source());
        }

        self.catalog = None;
        self.error = None;
        self.notice = None;
        self.download_link = None;
        self.phase = DownloadPhase::FormatsLoading;
        self.reset_selection();
        Ok(source)
    }

    fn reject_empty_source(&mut self) -> AppError {
        let err = AppError::InvalidInput("Enter a media URL.".to_string());
        self.phase = DownloadPhase::Idle;
        self.notice = Some(err.user_message());
        err
    }

    /// `FormatsLoading -> Ready | Errored`. Results for another source are dropped.
    pub fn catalog_resolved(&mut self, source: &str, result: Result<FormatCatalog, AppError>) {
        if self.phase != DownloadPhase::FormatsLoading || source != self.source.trim() {
            debug!(source, "dropping stale catalog result");
            return;
        }

        match result {
            Ok(catalog) => {
                info!(
                    source,
                    video = catalog.video.len(),
                    audio = catalog.audio.len(),
                    "formats resolved"
                );
                self.catalog = Some(catalog);
                self.evaluate_catalog();
            }
            Err(err) => {
                warn!(source, error = %err, "format resolution failed");
                self.fail(err);
            }
        }
    }

    fn evaluate_catalog(&mut self) {
        self.reset_selection();
        if self.selection.is_some() {
            self.error = None;
            self.phase = DownloadPhase::Ready;
        } else {
            self.fail(AppError::NotFound("No formats found".to_string()));
        }
    }

    pub fn set_format(&mut self, format: MediaFormat) {
        if !self.control_enabled() || format == self.format {
            return;
        }
        self.format = format;
        if self.catalog.is_some() {
            self.evaluate_catalog();
        } else {
            self.reset_selection();
        }
    }

    pub fn select(&mut self, selector: VariantSelector) {
        if !self.control_enabled() {
            return;
        }
        if self.choices().iter().any(|c| c.selector == selector) {
            self.selection = Some(selector);
        }
    }

    /// `Idle | Ready | Completed | Errored -> Initiating`.
    /// Mints a task id that has never been used in this session.
    pub fn begin_download(&mut self) -> Result<DownloadRequest, AppError> {
        if !self.control_enabled() {
            return Err(AppError::InvalidInput(
                "A download is already in progress".to_string(),
            ));
        }
        let source = self.source.trim().to_string();
        if source.is_empty() {
            return Err(self.reject_empty_source());
        }
        let selector = self
            .selection
            .clone()
            .ok_or_else(|| AppError::InvalidInput("Select a format first.".to_string()))?;

        self.reset();

        let task_id = loop {
            let candidate = generate_task_id();
            if self.used_task_ids.insert(candidate.clone()) {
                break candidate;
            }
        };
        info!(%task_id, source = %source, format = %self.format, "download requested");

        self.task_id = Some(task_id.clone());
        self.phase = DownloadPhase::Initiating;
        self.progress = 0;
        self.download_link = None;
        self.error = None;
        self.notice = None;

        Ok(DownloadRequest {
            source,
            format: self.format,
            selector,
            task_id,
        })
    }

    /// Feed one coordinator event. Returns the terminal report the first
    /// time the current task reaches `Completed` or `Errored`, never again.
    pub fn apply(&mut self, update: DownloadUpdate) -> Option<TerminalReport> {
        if self.task_id.as_ref() != Some(&update.task_id) {
            debug!(task_id = %update.task_id, "ignoring event for a task that is not current");
            return None;
        }
        if !self.phase.is_task_active() {
            debug!(
                task_id = %update.task_id,
                phase = ?self.phase,
                "ignoring event after terminal state"
            );
            return None;
        }

        match update.event {
            DownloadEvent::Acknowledged => {
                if self.phase == DownloadPhase::Initiating {
                    self.phase = DownloadPhase::AwaitingProgress;
                }
                None
            }
            DownloadEvent::Progress(progress) => {
                self.phase = DownloadPhase::Downloading;
                self.progress = self.progress.max(progress);
                None
            }
            DownloadEvent::Finalizing { download_link } => {
                self.phase = DownloadPhase::Finalizing;
                self.progress = 100;
                self.download_link = download_link;
                None
            }
            DownloadEvent::Completed(artifact) => {
                info!(
                    task_id = %update.task_id,
                    bytes = artifact.bytes.len(),
                    "download completed"
                );
                self.phase = DownloadPhase::Completed;
                Some(TerminalReport::Completed(artifact))
            }
            DownloadEvent::Failed(err) => {
                warn!(task_id = %update.task_id, error = %err, "download failed");
                self.fail(err.clone());
                Some(TerminalReport::Errored(err))
            }
        }
    }

    fn fail(&mut self, err: AppError) {
        self.error = Some(err);
        self.phase = DownloadPhase::Errored;
    }

    /// Stop observing the in-flight task. The server-side task keeps running.
    pub fn cancel(&mut self) -> Option<TaskId> {
        if !self.phase.is_task_active() {
            return None;
        }
        let task_id = self.task_id.take();
        if let Some(task_id) = &task_id {
            info!(%task_id, "download observation cancelled");
        }
        self.progress = 0;
        self.back_to_start();
        self.notice = Some("Download cancelled".to_string());
        task_id
    }

    /// `Completed | Errored -> Ready | Idle`.
    pub fn reset(&mut self) {
        if self.phase.is_terminal() {
            self.back_to_start();
        }
    }

    fn back_to_start(&mut self) {
        self.error = None;
        self.notice = None;
        self.phase = if self.catalog.is_some() && self.selection.is_some() {
            DownloadPhase::Ready
        } else {
            DownloadPhase::Idle
        };
    }

    /// Outcome of handing the artifact to the user. Informational only.
    pub fn artifact_delivered(&mut self, result: Result<Option<PathBuf>, AppError>) {
        if self.phase != DownloadPhase::Completed {
            return;
        }
        self.notice = Some(match result {
            Ok(Some(path)) => format!("Saved: {}", path.display()),
            Ok(None) => "Save cancelled".to_string(),
            Err(err) => format!("Could not save file: {}", err.user_message()),
        });
    }

    pub fn status_text(&self) -> String {
        match self.phase {
            DownloadPhase::Idle => self
                .notice
                .clone()
                .unwrap_or_else(|| "Enter a media URL to get started".to_string()),
            DownloadPhase::FormatsLoading => "Fetching formats...".to_string(),
            DownloadPhase::Ready => match (&self.notice, &self.catalog) {
                (Some(notice), _) => notice.clone(),
                (None, Some(catalog)) => format!(
                    "{}: {} format(s) available",
                    catalog.title.as_deref().unwrap_or("Formats loaded"),
                    catalog.variants(self.format.kind()).len()
                ),
                (None, None) => "Ready".to_string(),
            },
            DownloadPhase::Initiating => "Preparing...".to_string(),
            DownloadPhase::AwaitingProgress => "Waiting for the download to start...".to_string(),
            DownloadPhase::Downloading => format!("Downloading... {}%", self.progress),
            DownloadPhase::Finalizing => "Finishing...".to_string(),
            DownloadPhase::Completed => self
                .notice
                .clone()
                .unwrap_or_else(|| "Download complete!".to_string()),
            DownloadPhase::Errored => {
                let message = self
                    .error
                    .as_ref()
                    .map(AppError::user_message)
                    .unwrap_or_else(|| GENERIC_FAILURE.to_string());
                match &self.download_link {
                    Some(link) => {
                        format!("{} (the file is still available at {})", message, link)
                    }
                    None => message,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Variant, VariantKind};
    use bytes::Bytes;

    const URL: &str = "https://youtu.be/abc";

    fn catalog_with_video() -> FormatCatalog {
        FormatCatalog {
            title: Some("T".to_string()),
            thumbnail: None,
            video: vec![Variant {
                format_id: "18".to_string(),
                kind: VariantKind::Video,
                quality: "360p".to_string(),
                ext: "mp4".to_string(),
                filesize: None,
            }],
            audio: vec![],
        }
    }

    fn artifact(task_id: &TaskId) -> Artifact {
        Artifact {
            task_id: task_id.clone(),
            filename: Some("T.mp4".to_string()),
            content_type: None,
            bytes: Bytes::from_static(b"data"),
        }
    }

    fn update(task_id: &TaskId, event: DownloadEvent) -> DownloadUpdate {
        DownloadUpdate {
            task_id: task_id.clone(),
            event,
        }
    }

    fn ready_session() -> DownloadSession {
        let mut session = DownloadSession::new();
        session.set_source(URL.to_string());
        let source = session.begin_resolve().unwrap();
        session.catalog_resolved(&source, Ok(catalog_with_video()));
        session
    }

    #[test]
    fn test_catalog_offers_video_variant() {
        let session = ready_session();
        assert_eq!(session.phase(), DownloadPhase::Ready);
        let labels: Vec<_> = session.choices().iter().map(|c| c.label.clone()).collect();
        assert_eq!(labels, ["360p (mp4)"]);
        assert_eq!(
            session.selected_choice().map(|c| c.selector),
            Some(VariantSelector::FormatId("18".to_string()))
        );
    }

    #[test]
    fn test_empty_kind_is_reported_then_recoverable() {
        let mut session = ready_session();
        session.set_format(MediaFormat::Mp3);
        assert_eq!(session.phase(), DownloadPhase::Errored);
        assert_eq!(session.status_text(), "No formats found");
        assert!(session.begin_download().is_err());

        session.set_format(MediaFormat::Mp4);
        assert_eq!(session.phase(), DownloadPhase::Ready);
    }

    #[test]
    fn test_empty_source_never_leaves_idle() {
        let mut session = DownloadSession::new();
        session.set_source("   ".to_string());
        assert!(matches!(session.begin_resolve(), Err(AppError::InvalidInput(_))));
        assert!(matches!(session.begin_download(), Err(AppError::InvalidInput(_))));
        assert_eq!(session.phase(), DownloadPhase::Idle);
        assert_eq!(session.status_text(), "Enter a media URL.");
    }

    #[test]
    fn test_stale_catalog_dropped() {
        let mut session = DownloadSession::new();
        session.set_source(URL.to_string());
        let source = session.begin_resolve().unwrap();
        session.set_source("https://youtu.be/other".to_string());
        session.catalog_resolved(&source, Ok(catalog_with_video()));
        assert_eq!(session.phase(), DownloadPhase::Idle);
        assert!(session.catalog().is_none());
    }

    #[test]
    fn test_catalog_failure_is_errored() {
        let mut session = DownloadSession::new();
        session.set_source(URL.to_string());
        let source = session.begin_resolve().unwrap();
        session.catalog_resolved(
            &source,
            Err(AppError::Upstream("Failed to fetch formats".to_string())),
        );
        assert_eq!(session.phase(), DownloadPhase::Errored);
        assert_eq!(session.status_text(), "Failed to fetch formats");
        assert!(session.control_enabled());
    }

    #[test]
    fn test_quick_path_full_lifecycle() {
        let mut session = DownloadSession::new();
        session.set_source(URL.to_string());
        session.set_format(MediaFormat::Mp3);
        session.select(VariantSelector::Quality("128kbps".to_string()));

        let request = session.begin_download().unwrap();
        assert_eq!(request.selector, VariantSelector::Quality("128kbps".to_string()));
        assert_eq!(request.format, MediaFormat::Mp3);
        assert_eq!(session.phase(), DownloadPhase::Initiating);
        assert!(!session.control_enabled());

        let id = request.task_id;
        assert!(session.apply(update(&id, DownloadEvent::Acknowledged)).is_none());
        assert_eq!(session.phase(), DownloadPhase::AwaitingProgress);
        assert!(session.apply(update(&id, DownloadEvent::Progress(40))).is_none());
        assert_eq!(session.status_text(), "Downloading... 40%");
        session.apply(update(&id, DownloadEvent::Finalizing { download_link: None }));
        assert_eq!(session.phase(), DownloadPhase::Finalizing);

        let report = session.apply(update(&id, DownloadEvent::Completed(artifact(&id))));
        assert!(matches!(report, Some(TerminalReport::Completed(_))));
        assert_eq!(session.phase(), DownloadPhase::Completed);
        assert!(session.control_enabled());
    }

    #[test]
    fn test_initiation_error_is_terminal() {
        let mut session = ready_session();
        let id = session.begin_download().unwrap().task_id;

        let report = session.apply(update(
            &id,
            DownloadEvent::Failed(AppError::Upstream("unsupported url".to_string())),
        ));
        assert!(matches!(report, Some(TerminalReport::Errored(_))));
        assert_eq!(session.status_text(), "unsupported url");
        assert!(session.control_enabled());
    }

    #[test]
    fn test_only_one_terminal_report() {
        let mut session = ready_session();
        let id = session.begin_download().unwrap().task_id;
        session.apply(update(&id, DownloadEvent::Acknowledged));
        session.apply(update(&id, DownloadEvent::Progress(30)));

        let first = session.apply(update(
            &id,
            DownloadEvent::Failed(AppError::Upstream("network timeout".to_string())),
        ));
        assert!(first.is_some());

        assert!(session.apply(update(&id, DownloadEvent::Progress(90))).is_none());
        assert!(session
            .apply(update(&id, DownloadEvent::Completed(artifact(&id))))
            .is_none());
        assert!(session
            .apply(update(&id, DownloadEvent::Failed(AppError::Upstream("again".to_string()))))
            .is_none());
        assert_eq!(session.phase(), DownloadPhase::Errored);
        assert_eq!(session.status_text(), "network timeout");
    }

    #[test]
    fn test_fetch_failure_points_at_mirror() {
        let mut session = ready_session();
        let id = session.begin_download().unwrap().task_id;
        session.apply(update(
            &id,
            DownloadEvent::Finalizing {
                download_link: Some("https://gofile.io/d/abc".to_string()),
            },
        ));
        session.apply(update(
            &id,
            DownloadEvent::Failed(AppError::NotFound("Not found: artifact".to_string())),
        ));

        assert_eq!(session.phase(), DownloadPhase::Errored);
        assert_eq!(
            session.status_text(),
            "Not found: artifact (the file is still available at https://gofile.io/d/abc)"
        );

        // a retry forgets the old mirror
        session.begin_download().unwrap();
        assert!(session.download_link().is_none());
    }

    #[test]
    fn test_displayed_progress_is_clamped() {
        let mut session = ready_session();
        let id = session.begin_download().unwrap().task_id;
        session.apply(update(&id, DownloadEvent::Progress(70)));
        session.apply(update(&id, DownloadEvent::Progress(20)));
        assert_eq!(session.progress(), 70);
    }

    #[test]
    fn test_retry_uses_fresh_task_id() {
        let mut session = ready_session();
        let first = session.begin_download().unwrap().task_id;
        session.apply(update(&first, DownloadEvent::Failed(AppError::Upstream(String::new()))));
        assert_eq!(session.status_text(), GENERIC_FAILURE);

        let second = session.begin_download().unwrap().task_id;
        assert_ne!(first, second);

        // late events from the first task must not touch the retry
        session.apply(update(&first, DownloadEvent::Progress(99)));
        assert_eq!(session.phase(), DownloadPhase::Initiating);
        assert_eq!(session.progress(), 0);
    }

    #[test]
    fn test_second_download_rejected_while_active() {
        let mut session = ready_session();
        session.begin_download().unwrap();
        assert!(session.begin_download().is_err());
        assert!(session.begin_resolve().is_err());
    }

    #[test]
    fn test_cancel_releases_without_report() {
        let mut session = ready_session();
        let id = session.begin_download().unwrap().task_id;
        session.apply(update(&id, DownloadEvent::Progress(10)));

        assert_eq!(session.cancel(), Some(id.clone()));
        assert_eq!(session.phase(), DownloadPhase::Ready);
        assert_eq!(session.status_text(), "Download cancelled");
        assert!(session
            .apply(update(&id, DownloadEvent::Completed(artifact(&id))))
            .is_none());
        assert!(session.cancel().is_none());
    }

    #[test]
    fn test_reset_after_completion() {
        let mut session = ready_session();
        let id = session.begin_download().unwrap().task_id;
        session.apply(update(&id, DownloadEvent::Completed(artifact(&id))));
        session.artifact_delivered(Ok(Some(PathBuf::from("/tmp/T.mp4"))));
        assert_eq!(session.status_text(), "Saved: /tmp/T.mp4");

        session.reset();
        assert_eq!(session.phase(), DownloadPhase::Ready);
    }
}

use std::path::PathBuf;

use futures::{stream::BoxStream, StreamExt};
use tracing::{debug, info, warn};

use super::progress::watch_progress;
use crate::{
    api::ApiClient,
    domain::{
        AppError, Artifact, DownloadRequest, FormatCatalog, MediaFormat, ProgressEvent, TaskId,
        TaskStatus,
    },
    utils::sanitize_filename,
};

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// The service registered the task
    Acknowledged,
    /// Percentage from a `downloading` event
    Progress(u8),
    /// `finished` was observed and the progress stream is closed
    Finalizing { download_link: Option<String> },
    Completed(Artifact),
    Failed(AppError),
}

/// A [`DownloadEvent`] tagged with the task it belongs to.
#[derive(Debug, Clone)]
pub struct DownloadUpdate {
    pub task_id: TaskId,
    pub event: DownloadEvent,
}

#[derive(Clone)]
pub struct DownloadCoordinator {
    api_client: ApiClient,
}

impl DownloadCoordinator {
    pub fn new(api_client: ApiClient) -> Self {
        Self { api_client }
    }

    pub async fn resolve_formats(&self, source: String) -> Result<FormatCatalog, AppError> {
        if source.trim().is_empty() {
            return Err(AppError::InvalidInput("Enter a media URL.".to_string()));
        }
        Ok(self.api_client.resolve_formats(source.trim()).await?)
    }

    /// Drive one task from initiation to its artifact.
    ///
    /// The stream ends after `Completed` or `Failed`. Dropping it early closes
    /// the progress subscription and skips the fetch; the server-side task is
    /// left alone.
    pub fn download_stream(&self, request: DownloadRequest) -> BoxStream<'static, DownloadUpdate> {
        let task_id = request.task_id.clone();

        futures::stream::unfold(
            DownloadRuntimeState::Start {
                client: self.api_client.clone(),
                request,
            },
            step,
        )
        .map(move |event| DownloadUpdate {
            task_id: task_id.clone(),
            event,
        })
        .boxed()
    }

    pub async fn choose_save_path(&self, suggested_filename: String) -> Option<PathBuf> {
        rfd::AsyncFileDialog::new()
            .set_file_name(&suggested_filename)
            .save_file()
            .await
            .map(|handle| handle.path().to_path_buf())
    }

    /// Hand the artifact to the user. `Ok(None)` when the save dialog was dismissed.
    pub async fn deliver_artifact(
        &self,
        artifact: Artifact,
        fallback_filename: String,
    ) -> Result<Option<PathBuf>, AppError> {
        let suggested = artifact.filename.clone().unwrap_or(fallback_filename);
        let Some(path) = self.choose_save_path(suggested).await else {
            return Ok(None);
        };

        tokio::fs::write(&path, &artifact.bytes)
            .await
            .map_err(|e| AppError::Io(format!("Failed to write {}: {}", path.display(), e)))?;
        info!(
            task_id = %artifact.task_id,
            path = %path.display(),
            bytes = artifact.bytes.len(),
            content_type = ?artifact.content_type,
            "artifact saved"
        );
        Ok(Some(path))
    }
}

/// Name offered in the save dialog when the service sends none.
pub fn fallback_filename(title: Option<&str>, format: MediaFormat) -> String {
    let stem = title
        .map(|t| sanitize_filename(t).trim_matches(|c| c == '.' || c == ' ').to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "download".to_string());
    format!("{}.{}", stem, format.as_str())
}

enum DownloadRuntimeState {
    Start {
        client: ApiClient,
        request: DownloadRequest,
    },
    Subscribe {
        client: ApiClient,
        task_id: TaskId,
    },
    Watching {
        client: ApiClient,
        task_id: TaskId,
        events: BoxStream<'static, Result<ProgressEvent, AppError>>,
    },
    Fetch {
        client: ApiClient,
        task_id: TaskId,
    },
    Finished,
}

async fn step(mut state: DownloadRuntimeState) -> Option<(DownloadEvent, DownloadRuntimeState)> {
    loop {
        state = match state {
            DownloadRuntimeState::Start { client, request } => {
                return match client.start_download(&request).await {
                    Ok(()) => {
                        info!(task_id = %request.task_id, "task acknowledged");
                        Some((
                            DownloadEvent::Acknowledged,
                            DownloadRuntimeState::Subscribe {
                                client,
                                task_id: request.task_id,
                            },
                        ))
                    }
                    Err(e) => Some((
                        DownloadEvent::Failed(e.into()),
                        DownloadRuntimeState::Finished,
                    )),
                };
            }
            DownloadRuntimeState::Subscribe { client, task_id } => {
                tokio::time::sleep(client.config().subscribe_delay).await;
                let subscription = client.subscribe_progress(&task_id);
                let opened = match client.config().progress_watchdog {
                    Some(limit) => match tokio::time::timeout(limit, subscription).await {
                        Ok(opened) => opened,
                        Err(_) => {
                            warn!(%task_id, ?limit, "progress stream never opened");
                            return Some((
                                DownloadEvent::Failed(AppError::Timeout(limit)),
                                DownloadRuntimeState::Finished,
                            ));
                        }
                    },
                    None => subscription.await,
                };
                match opened {
                    Ok(raw) => DownloadRuntimeState::Watching {
                        events: watch_progress(raw, client.config().progress_watchdog),
                        client,
                        task_id,
                    },
                    Err(e) => {
                        return Some((
                            DownloadEvent::Failed(e.into()),
                            DownloadRuntimeState::Finished,
                        ))
                    }
                }
            }
            DownloadRuntimeState::Watching {
                client,
                task_id,
                mut events,
            } => match events.next().await {
                Some(Ok(event)) => match event.status {
                    TaskStatus::Pending => {
                        debug!(%task_id, "task not started yet");
                        DownloadRuntimeState::Watching {
                            client,
                            task_id,
                            events,
                        }
                    }
                    TaskStatus::Downloading => {
                        return Some((
                            DownloadEvent::Progress(event.progress),
                            DownloadRuntimeState::Watching {
                                client,
                                task_id,
                                events,
                            },
                        ))
                    }
                    TaskStatus::Finished => {
                        info!(%task_id, "task finished on the service");
                        return Some((
                            DownloadEvent::Finalizing {
                                download_link: event.download_link,
                            },
                            DownloadRuntimeState::Fetch { client, task_id },
                        ));
                    }
                    TaskStatus::Error => {
                        return Some((
                            DownloadEvent::Failed(AppError::Upstream(
                                event.message.unwrap_or_default(),
                            )),
                            DownloadRuntimeState::Finished,
                        ))
                    }
                },
                Some(Err(e)) => {
                    return Some((DownloadEvent::Failed(e), DownloadRuntimeState::Finished))
                }
                None => {
                    return Some((
                        DownloadEvent::Failed(AppError::Upstream(
                            "progress stream closed before the task finished".to_string(),
                        )),
                        DownloadRuntimeState::Finished,
                    ))
                }
            },
            DownloadRuntimeState::Fetch { client, task_id } => {
                tokio::time::sleep(client.config().fetch_delay).await;
                return match client.fetch_artifact(&task_id).await {
                    Ok(artifact) => Some((
                        DownloadEvent::Completed(artifact),
                        DownloadRuntimeState::Finished,
                    )),
                    Err(e) => Some((
                        DownloadEvent::Failed(e.into()),
                        DownloadRuntimeState::Finished,
                    )),
                };
            }
            DownloadRuntimeState::Finished => return None,
        };
    }
}

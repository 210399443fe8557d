use std::collections::VecDeque;

use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderName, ACCEPT, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::models::{
    ApiConfig, FormatsRequest, FormatsResponse, ProgressPayload, StartRequest, StartResponse,
};
use super::sse::SseDecoder;
use crate::domain::{AppError, Artifact, DownloadRequest, FormatCatalog, ProgressEvent, TaskId};
use crate::utils::filename_from_content_disposition;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// Message taken from an `error` field in a well-formed response
    #[error("{0}")]
    Server(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid service URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::RequestError(e) if e.is_timeout() => {
                AppError::Upstream("Request to the download service timed out".to_string())
            }
            ApiError::Server(message) => AppError::Upstream(message),
            ApiError::NotFound(what) => AppError::NotFound(format!("Not found: {}", what)),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    config: ApiConfig,
    http: Client,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&self.config.base_url)?.join(path)?)
    }

    /// Read a JSON body regardless of status, since the service reports
    /// failures as `{error}` bodies on 4xx/5xx responses.
    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<(StatusCode, Option<T>)> {
        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str(&body) {
            Ok(value) => Ok((status, Some(value))),
            Err(e) if status.is_success() => Err(ApiError::InvalidResponse(format!(
                "JSON decode error: {}",
                e
            ))),
            Err(_) => Ok((status, None)),
        }
    }

    /// Format catalog for a source URL
    pub async fn resolve_formats(&self, source: &str) -> Result<FormatCatalog> {
        let url = self.endpoint("formats")?;
        debug!(%url, source, "resolving formats");

        let response = self
            .http
            .post(url)
            .timeout(self.config.request_timeout)
            .json(&FormatsRequest { url: source })
            .send()
            .await?;

        let (status, body) = Self::read_json::<FormatsResponse>(response).await?;
        match body {
            Some(FormatsResponse {
                error: Some(message),
                ..
            }) => Err(ApiError::Server(message)),
            Some(body) if status.is_success() => Ok(body.into()),
            _ if status == StatusCode::NOT_FOUND => {
                Err(ApiError::NotFound("format catalog".to_string()))
            }
            _ => Err(ApiError::InvalidResponse(format!(
                "Formats request failed with status {}",
                status
            ))),
        }
    }

    /// Register a task with the service. An ack does not mean the task is running yet.
    pub async fn start_download(&self, request: &DownloadRequest) -> Result<()> {
        let url = self.endpoint("download")?;
        let body = StartRequest::new(
            &request.source,
            request.format.as_str(),
            &request.selector,
            request.task_id.as_str(),
        );
        debug!(%url, task_id = %request.task_id, "starting download");

        let response = self
            .http
            .post(url)
            .timeout(self.config.request_timeout)
            .json(&body)
            .send()
            .await?;

        let (status, ack) = Self::read_json::<StartResponse>(response).await?;
        match ack {
            Some(StartResponse {
                error: Some(message),
                ..
            }) => Err(ApiError::Server(message)),
            Some(ack) if status.is_success() => {
                if let Some(echoed) = ack.task_id.as_deref() {
                    if echoed != request.task_id.as_str() {
                        warn!(
                            task_id = %request.task_id,
                            echoed,
                            "service echoed a different task id, keeping ours"
                        );
                    }
                }
                Ok(())
            }
            _ => Err(ApiError::InvalidResponse(format!(
                "Download request failed with status {}",
                status
            ))),
        }
    }

    /// Open the server-push progress channel for a task.
    /// Dropping the returned stream closes the connection.
    pub async fn subscribe_progress(
        &self,
        task_id: &TaskId,
    ) -> Result<BoxStream<'static, Result<ProgressEvent>>> {
        let url = self.endpoint(&format!("progress/{}", task_id))?;
        debug!(%url, %task_id, "subscribing to progress");

        let response = self
            .http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(format!("task {}", task_id)));
        }
        let response = response.error_for_status()?;

        let chunks = response.bytes_stream().map_err(ApiError::RequestError).boxed();
        let events = stream::unfold(
            (chunks, SseDecoder::new(), VecDeque::<String>::new()),
            |(mut chunks, mut decoder, mut pending)| async move {
                loop {
                    while let Some(data) = pending.pop_front() {
                        if data.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<ProgressPayload>(&data) {
                            Ok(payload) => match payload.into_event() {
                                Some(event) => return Some((Ok(event), (chunks, decoder, pending))),
                                None => debug!(%data, "skipping event with unknown status"),
                            },
                            Err(e) => {
                                return Some((
                                    Err(ApiError::InvalidResponse(format!(
                                        "Bad progress event: {}",
                                        e
                                    ))),
                                    (chunks, decoder, pending),
                                ))
                            }
                        }
                    }

                    match chunks.next().await {
                        Some(Ok(chunk)) => pending.extend(decoder.push(&chunk)),
                        Some(Err(e)) => return Some((Err(e), (chunks, decoder, pending))),
                        None => return None,
                    }
                }
            },
        );

        Ok(events.boxed())
    }

    /// Fetch the produced file. The service may only serve it once.
    pub async fn fetch_artifact(&self, task_id: &TaskId) -> Result<Artifact> {
        let url = self.endpoint(&format!("fetch/{}", task_id))?;
        debug!(%url, %task_id, "fetching artifact");

        let response = self
            .http
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(format!("artifact for task {}", task_id)));
        }
        let response = response.error_for_status()?;

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let filename = header(CONTENT_DISPOSITION)
            .as_deref()
            .and_then(filename_from_content_disposition);
        let content_type = header(CONTENT_TYPE);
        let bytes = response.bytes().await?;

        Ok(Artifact {
            task_id: task_id.clone(),
            filename,
            content_type,
            bytes,
        })
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::domain::{
    FormatCatalog, ProgressEvent, TaskStatus, Variant, VariantKind, VariantSelector,
};

/// Request body for the /formats endpoint
#[derive(Debug, Clone, Serialize)]
pub struct FormatsRequest<'a> {
    pub url: &'a str,
}

/// Response from the /formats endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct FormatsResponse {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub video_formats: Vec<VideoFormat>,
    #[serde(default)]
    pub audio_formats: Vec<AudioFormat>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoFormat {
    pub format_id: String,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub filesize: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioFormat {
    pub format_id: String,
    /// Number of kbps, or a placeholder string such as `"?"`
    #[serde(default)]
    pub abr: Option<Value>,
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub filesize: Option<u64>,
}

impl AudioFormat {
    fn bitrate_label(&self) -> String {
        match &self.abr {
            Some(Value::Number(n)) => match n.as_f64() {
                Some(kbps) if kbps.fract() == 0.0 => format!("{}kbps", kbps as u64),
                Some(kbps) => format!("{:.1}kbps", kbps),
                None => "?".to_string(),
            },
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => "?".to_string(),
        }
    }
}

impl From<FormatsResponse> for FormatCatalog {
    fn from(response: FormatsResponse) -> Self {
        let video = response
            .video_formats
            .into_iter()
            .map(|f| Variant {
                format_id: f.format_id,
                kind: VariantKind::Video,
                quality: f.resolution.unwrap_or_else(|| "?".to_string()),
                ext: f.ext,
                filesize: f.filesize,
            })
            .collect();
        let audio = response
            .audio_formats
            .into_iter()
            .map(|f| {
                let quality = f.bitrate_label();
                Variant {
                    format_id: f.format_id,
                    kind: VariantKind::Audio,
                    quality,
                    ext: f.ext,
                    filesize: f.filesize,
                }
            })
            .collect();

        FormatCatalog {
            title: response.title,
            thumbnail: response.thumbnail,
            video,
            audio,
        }
    }
}

/// Request body for the /download endpoint
#[derive(Debug, Clone, Serialize)]
pub struct StartRequest<'a> {
    pub url: &'a str,
    pub format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<&'a str>,
    pub task_id: &'a str,
}

impl<'a> StartRequest<'a> {
    pub fn new(
        url: &'a str,
        format: &'a str,
        selector: &'a VariantSelector,
        task_id: &'a str,
    ) -> Self {
        let (format_id, quality) = match selector {
            VariantSelector::FormatId(id) => (Some(id.as_str()), None),
            VariantSelector::Quality(q) => (None, Some(q.as_str())),
        };
        Self {
            url,
            format,
            format_id,
            quality,
            task_id,
        }
    }
}

/// Response from the /download endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One `data:` payload from the /progress stream
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressPayload {
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub download_link: Option<String>,
}

impl ProgressPayload {
    /// `None` for statuses the client does not know about.
    pub fn into_event(self) -> Option<ProgressEvent> {
        let status = TaskStatus::from_wire(&self.status)?;
        let progress = match status {
            TaskStatus::Finished => 100,
            _ => self.progress.unwrap_or(0.0).clamp(0.0, 100.0) as u8,
        };
        Some(ProgressEvent {
            status,
            progress,
            message: self.message.or(self.error),
            download_link: self.download_link,
        })
    }
}

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    /// Grace period between the initiation ack and opening the progress stream
    pub subscribe_delay: Duration,
    /// Settle time between the finished event and the artifact fetch
    pub fetch_delay: Duration,
    /// Longest silence tolerated on the progress stream, `None` waits forever
    pub progress_watchdog: Option<Duration>,
    /// Applies to every call except the progress stream
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000/".to_string(),
            subscribe_delay: Duration::from_millis(1000),
            fetch_delay: Duration::from_millis(800),
            progress_watchdog: Some(Duration::from_secs(120)),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(base_url) = lookup("MEDIA_DL_BASE_URL") {
            let base_url = base_url.trim();
            if !base_url.is_empty() {
                config.base_url = base_url.to_string();
            }
        }
        if let Some(ms) = parse_number(&lookup, "MEDIA_DL_SUBSCRIBE_DELAY_MS") {
            config.subscribe_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_number(&lookup, "MEDIA_DL_FETCH_DELAY_MS") {
            config.fetch_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_number(&lookup, "MEDIA_DL_WATCHDOG_SECS") {
            config.progress_watchdog = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = parse_number(&lookup, "MEDIA_DL_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }

        if !config.base_url.ends_with('/') {
            config.base_url.push('/');
        }
        config
    }
}

fn parse_number(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring malformed configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_catalog_from_response() {
        let response: FormatsResponse = serde_json::from_value(json!({
            "title": "T",
            "video_formats": [{"format_id": "18", "resolution": "360p", "ext": "mp4"}],
            "audio_formats": [
                {"format_id": "140", "abr": 129.5, "ext": "m4a", "filesize": 3_400_000},
                {"format_id": "251", "abr": 160, "ext": "webm"},
                {"format_id": "600", "abr": "?", "ext": "webm"}
            ]
        }))
        .unwrap();
        let catalog = FormatCatalog::from(response);

        assert_eq!(catalog.title.as_deref(), Some("T"));
        assert_eq!(catalog.video[0].label(), "360p (mp4)");
        let labels: Vec<_> = catalog.audio.iter().map(Variant::label).collect();
        assert_eq!(labels, ["129.5kbps (m4a)", "160kbps (webm)", "? (webm)"]);
        assert_eq!(catalog.audio[0].filesize, Some(3_400_000));
    }

    #[test]
    fn test_start_request_quick_path() {
        let selector = VariantSelector::Quality("128kbps".to_string());
        let body =
            serde_json::to_value(StartRequest::new("u", "mp3", &selector, "task_1")).unwrap();
        assert_eq!(
            body,
            json!({"url": "u", "format": "mp3", "quality": "128kbps", "task_id": "task_1"})
        );
    }

    #[test]
    fn test_start_request_precise_path() {
        let selector = VariantSelector::FormatId("18".to_string());
        let body =
            serde_json::to_value(StartRequest::new("u", "mp4", &selector, "task_1")).unwrap();
        assert_eq!(
            body,
            json!({"url": "u", "format": "mp4", "format_id": "18", "task_id": "task_1"})
        );
    }

    #[test]
    fn test_progress_payload_error_key() {
        let payload: ProgressPayload =
            serde_json::from_str(r#"{"status": "error", "error": "Invalid task id"}"#).unwrap();
        let event = payload.into_event().unwrap();
        assert_eq!(event.status, TaskStatus::Error);
        assert_eq!(event.message.as_deref(), Some("Invalid task id"));
    }

    #[test]
    fn test_progress_payload_finished_without_progress() {
        let payload: ProgressPayload = serde_json::from_str(r#"{"status": "finished"}"#).unwrap();
        assert_eq!(payload.into_event().unwrap().progress, 100);
    }

    #[test]
    fn test_config_from_lookup() {
        let vars = HashMap::from([
            ("MEDIA_DL_BASE_URL", "http://media.local:8080"),
            ("MEDIA_DL_SUBSCRIBE_DELAY_MS", "0"),
            ("MEDIA_DL_WATCHDOG_SECS", "0"),
            ("MEDIA_DL_FETCH_DELAY_MS", "soon"),
        ]);
        let config = ApiConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.base_url, "http://media.local:8080/");
        assert_eq!(config.subscribe_delay, Duration::ZERO);
        assert_eq!(config.progress_watchdog, None);
        assert_eq!(config.fetch_delay, ApiConfig::default().fetch_delay);
    }
}

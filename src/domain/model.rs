use std::fmt;

use bytes::Bytes;

/// Output container the user asks for. Determines which catalog list is offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaFormat {
    #[default]
    Mp4,
    Mp3,
}

impl MediaFormat {
    pub const ALL: [MediaFormat; 2] = [MediaFormat::Mp4, MediaFormat::Mp3];

    pub fn as_str(self) -> &'static str {
        match self {
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Mp3 => "mp3",
        }
    }

    pub fn kind(self) -> VariantKind {
        match self {
            MediaFormat::Mp4 => VariantKind::Video,
            MediaFormat::Mp3 => VariantKind::Audio,
        }
    }

    /// Coarse quality labels used when no catalog has been resolved.
    pub fn quick_tiers(self) -> &'static [&'static str] {
        match self {
            MediaFormat::Mp4 => &["720p", "480p"],
            MediaFormat::Mp3 => &["320kbps", "128kbps"],
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Video,
    Audio,
}

/// One downloadable encoding option from a catalog response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub format_id: String,
    pub kind: VariantKind,
    /// Resolution for video, bitrate for audio.
    pub quality: String,
    pub ext: String,
    pub filesize: Option<u64>,
}

impl Variant {
    pub fn label(&self) -> String {
        format!("{} ({})", self.quality, self.ext)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatCatalog {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub video: Vec<Variant>,
    pub audio: Vec<Variant>,
}

impl FormatCatalog {
    pub fn variants(&self, kind: VariantKind) -> &[Variant] {
        match kind {
            VariantKind::Video => &self.video,
            VariantKind::Audio => &self.audio,
        }
    }
}

/// What the download-start request names: a catalog entry or a quality tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariantSelector {
    FormatId(String),
    Quality(String),
}

/// A selectable entry in the quality picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantChoice {
    pub label: String,
    pub selector: VariantSelector,
}

impl VariantChoice {
    pub fn from_variant(variant: &Variant) -> Self {
        Self {
            label: variant.label(),
            selector: VariantSelector::FormatId(variant.format_id.clone()),
        }
    }

    pub fn quick(tier: &str) -> Self {
        Self {
            label: tier.to_string(),
            selector: VariantSelector::Quality(tier.to_string()),
        }
    }
}

impl fmt::Display for VariantChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Downloading,
    Finished,
    Error,
}

impl TaskStatus {
    /// Maps the status strings the service emits. Unknown values yield `None`.
    pub fn from_wire(status: &str) -> Option<Self> {
        match status {
            "pending" | "starting" => Some(TaskStatus::Pending),
            "downloading" | "uploading" => Some(TaskStatus::Downloading),
            "finished" | "done" => Some(TaskStatus::Finished),
            "error" => Some(TaskStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Error)
    }
}

/// Point-in-time snapshot of a task pushed by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub status: TaskStatus,
    pub progress: u8,
    pub message: Option<String>,
    pub download_link: Option<String>,
}

/// Binary result of a finished task.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub task_id: TaskId,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Everything the initiation call needs, minted by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub source: String,
    pub format: MediaFormat,
    pub selector: VariantSelector,
    pub task_id: TaskId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Idle,
    FormatsLoading,
    Ready,
    Initiating,
    AwaitingProgress,
    Downloading,
    Finalizing,
    Completed,
    Errored,
}

impl DownloadPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, DownloadPhase::Completed | DownloadPhase::Errored)
    }

    /// A task is between initiation and its terminal report.
    pub fn is_task_active(self) -> bool {
        matches!(
            self,
            DownloadPhase::Initiating
                | DownloadPhase::AwaitingProgress
                | DownloadPhase::Downloading
                | DownloadPhase::Finalizing
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_label() {
        let variant = Variant {
            format_id: "18".to_string(),
            kind: VariantKind::Video,
            quality: "360p".to_string(),
            ext: "mp4".to_string(),
            filesize: None,
        };
        assert_eq!(variant.label(), "360p (mp4)");
    }

    #[test]
    fn test_status_vocabulary() {
        assert_eq!(TaskStatus::from_wire("uploading"), Some(TaskStatus::Downloading));
        assert_eq!(TaskStatus::from_wire("done"), Some(TaskStatus::Finished));
        assert_eq!(TaskStatus::from_wire("starting"), Some(TaskStatus::Pending));
        assert_eq!(TaskStatus::from_wire("paused"), None);
        assert!(TaskStatus::Error.is_terminal());
        assert!(!TaskStatus::Downloading.is_terminal());
    }

    #[test]
    fn test_quick_tiers_follow_format() {
        assert_eq!(MediaFormat::Mp4.quick_tiers(), &["720p", "480p"]);
        assert_eq!(MediaFormat::Mp3.kind(), VariantKind::Audio);
    }
}

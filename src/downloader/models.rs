// Common data models for the download pipeline

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Sentinel format id meaning "let the extractor pick"
pub const BEST_FORMAT_ID: &str = "best";

/// One raw stream variant as reported by yt-dlp
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodingDescriptor {
    /// Format ID (e.g., "137", "140")
    pub format_id: Option<String>,
    /// Container extension (mp4, webm, m4a)
    pub ext: Option<String>,
    /// Video codec (avc1, vp9, none)
    pub vcodec: Option<String>,
    /// Audio codec (mp4a, opus, none)
    pub acodec: Option<String>,
    pub height: Option<u32>,
    pub width: Option<u32>,
    pub fps: Option<f64>,
    /// Average audio bitrate in kbps
    pub abr: Option<f64>,
    /// File size in bytes, when known
    pub filesize: Option<u64>,
}

impl EncodingDescriptor {
    /// A missing codec tag counts as present; only an explicit "none" means absent.
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref() != Some("none")
    }

    pub fn has_audio(&self) -> bool {
        self.acodec.as_deref() != Some("none")
    }
}

/// Closed set of menu entry kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatKind {
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "combined")]
    CombinedAV,
    #[serde(rename = "video")]
    VideoOnly,
    #[serde(rename = "audio")]
    AudioOnly,
}

/// Normalized, user-facing format entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatOption {
    pub id: String,
    pub kind: FormatKind,
    pub label: String,
    pub container_ext: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_bitrate_kbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_size: Option<u64>,
    /// Human-readable byte size (e.g., "1.5 MB")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_label: Option<String>,
}

/// Thumbnail candidate from the metadata payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Thumbnail {
    pub fn area(&self) -> u64 {
        u64::from(self.width.unwrap_or(0)) * u64::from(self.height.unwrap_or(0))
    }
}

/// Parsed metadata query result, before normalization
#[derive(Debug, Clone, Default)]
pub struct RawMediaInfo {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub duration_seconds: Option<f64>,
    /// Top-level `thumbnail` field
    pub thumbnail: Option<String>,
    pub thumbnails: Vec<Thumbnail>,
    /// `None` when the payload had no `formats` array at all
    pub formats: Option<Vec<EncodingDescriptor>>,
}

/// Result of `list_formats`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub formats: Vec<FormatOption>,
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration_seconds: Option<f64>,
    pub uploader: Option<String>,
}

/// What the user asked to download
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    #[serde(alias = "url")]
    pub source_url: String,
    #[serde(alias = "format")]
    pub chosen_format_id: String,
    #[serde(alias = "outputPath")]
    pub destination_directory: PathBuf,
}

impl DownloadRequest {
    pub fn new(
        source_url: impl Into<String>,
        chosen_format_id: impl Into<String>,
        destination_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            chosen_format_id: chosen_format_id.into(),
            destination_directory: destination_directory.into(),
        }
    }

    /// Every field must be non-blank
    pub fn is_complete(&self) -> bool {
        !self.source_url.trim().is_empty()
            && !self.chosen_format_id.trim().is_empty()
            && !self.destination_directory.as_os_str().is_empty()
    }
}

/// Terminal success payload of a download
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadResult {
    pub path: PathBuf,
    pub message: String,
    /// True when the download ended because the user cancelled it
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

/// Lifecycle signal or percentage sent to the progress observer
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    Phase { phase: Phase },
    Percent { percent: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
}

impl ProgressEvent {
    pub fn initializing() -> Self {
        Self::Phase {
            phase: Phase::Initializing,
        }
    }

    pub fn percent(percent: f32) -> Self {
        Self::Percent {
            percent: percent.clamp(0.0, 100.0),
        }
    }

    pub fn as_percent(&self) -> Option<f32> {
        match self {
            Self::Percent { percent } => Some(*percent),
            Self::Phase { .. } => None,
        }
    }
}

/// Orchestrator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    FetchingFormats,
    Downloading,
}

/// Paths of the provisioned external binaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinaries {
    pub extractor_path: PathBuf,
    pub muxer_path: PathBuf,
}

/// Presence report for the external binaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DependencyStatus {
    pub ytdlp: bool,
    pub ffmpeg: bool,
    pub all: bool,
}

impl DependencyStatus {
    pub fn new(ytdlp: bool, ffmpeg: bool) -> Self {
        Self {
            ytdlp,
            ffmpeg,
            all: ytdlp && ffmpeg,
        }
    }
}

// yt-dlp command lines and metadata parsing

use serde_json::Value;

use crate::downloader::config::AppConfig;
use crate::downloader::format_selector::FormatSelector;
use crate::downloader::models::{
    DownloadRequest, EncodingDescriptor, MediaInfo, RawMediaInfo, ResolvedBinaries, Thumbnail,
    BEST_FORMAT_ID,
};

/// yt-dlp selector used for the synthetic "best" option
pub const BEST_SELECTOR: &str = "bestvideo+bestaudio/best";
/// Output file name relative to the destination directory
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
/// Container for merged video+audio downloads
pub const MERGE_FORMAT: &str = "mp4";

const UNTITLED: &str = "Vídeo";

/// What the user picked in the format menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatSelection {
    Best,
    Specific(String),
}

impl FormatSelection {
    pub fn from_id(id: &str) -> Self {
        if id == BEST_FORMAT_ID {
            Self::Best
        } else {
            Self::Specific(id.to_string())
        }
    }

    /// Value passed to `-f`
    pub fn selector(&self) -> &str {
        match self {
            Self::Best => BEST_SELECTOR,
            Self::Specific(id) => id,
        }
    }
}

/// `--proxy` / `--socket-timeout` from configuration
fn network_args(config: &AppConfig) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(proxy) = &config.proxy {
        args.push("--proxy".to_string());
        args.push(proxy.clone());
    }
    if let Some(timeout) = config.socket_timeout {
        args.push("--socket-timeout".to_string());
        args.push(timeout.to_string());
    }
    args
}

/// Arguments for the single-JSON metadata query
pub fn metadata_args(url: &str, config: &AppConfig) -> Vec<String> {
    let mut args: Vec<String> = ["--dump-single-json", "--no-playlist", "--no-warnings"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.extend(network_args(config));
    args.push(url.to_string());
    args
}

/// Arguments for a supervised download
pub fn download_args(
    request: &DownloadRequest,
    binaries: &ResolvedBinaries,
    config: &AppConfig,
) -> Vec<String> {
    let selection = FormatSelection::from_id(&request.chosen_format_id);

    let mut args = vec![
        "-f".to_string(),
        selection.selector().to_string(),
        "--merge-output-format".to_string(),
        MERGE_FORMAT.to_string(),
        "--newline".to_string(),
        "--no-playlist".to_string(),
        "-P".to_string(),
        request.destination_directory.to_string_lossy().into_owned(),
        "-o".to_string(),
        OUTPUT_TEMPLATE.to_string(),
        "--ffmpeg-location".to_string(),
        binaries.muxer_path.to_string_lossy().into_owned(),
    ];
    args.extend(network_args(config));
    args.push(request.source_url.trim().to_string());
    args
}

fn as_u32(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v.round() as u64))
        .and_then(|v| u32::try_from(v).ok())
}

fn as_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn parse_descriptor(f: &Value) -> EncodingDescriptor {
    EncodingDescriptor {
        // Some extractors emit numeric ids
        format_id: as_string(&f["format_id"]).or_else(|| f["format_id"].as_u64().map(|n| n.to_string())),
        ext: as_string(&f["ext"]),
        vcodec: as_string(&f["vcodec"]),
        acodec: as_string(&f["acodec"]),
        height: as_u32(&f["height"]),
        width: as_u32(&f["width"]),
        fps: f["fps"].as_f64(),
        abr: f["abr"].as_f64(),
        filesize: f["filesize"]
            .as_u64()
            .or_else(|| f["filesize_approx"].as_u64())
            .or_else(|| f["filesize_approx"].as_f64().map(|v| v as u64)),
    }
}

/// Parse the `--dump-single-json` payload
pub fn parse_media_info(stdout: &str) -> Result<RawMediaInfo, serde_json::Error> {
    let json: Value = serde_json::from_str(stdout.trim())?;

    let thumbnails = json["thumbnails"]
        .as_array()
        .map(|list| {
            list.iter()
                .map(|t| Thumbnail {
                    url: as_string(&t["url"]),
                    width: as_u32(&t["width"]),
                    height: as_u32(&t["height"]),
                })
                .collect()
        })
        .unwrap_or_default();

    let formats = json["formats"]
        .as_array()
        .map(|list| list.iter().map(parse_descriptor).collect());

    Ok(RawMediaInfo {
        title: as_string(&json["title"]),
        uploader: as_string(&json["uploader"]),
        duration_seconds: json["duration"].as_f64(),
        thumbnail: as_string(&json["thumbnail"]),
        thumbnails,
        formats,
    })
}

/// URL of the largest thumbnail; ties keep the earliest entry
pub fn best_thumbnail(raw: &RawMediaInfo) -> Option<String> {
    if raw.thumbnails.is_empty() {
        return raw.thumbnail.clone();
    }

    let mut best = &raw.thumbnails[0];
    for thumb in &raw.thumbnails[1..] {
        if thumb.area() > best.area() {
            best = thumb;
        }
    }
    best.url.clone()
}

/// Normalize a parsed payload into the UI-facing result
pub fn into_media_info(raw: RawMediaInfo) -> MediaInfo {
    let thumbnail = best_thumbnail(&raw);
    MediaInfo {
        formats: FormatSelector::normalize(raw.formats.as_deref()),
        title: raw
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNTITLED.to_string()),
        thumbnail,
        duration_seconds: raw.duration_seconds,
        uploader: raw.uploader,
    }
}

// UI boundary: every operation answers `{ success, ...payload }` or
// `{ success: false, error }` and never fails outright.

use log::error;
use serde::Serialize;

use super::errors::DownloaderError;
use super::models::{DownloadRequest, DownloadResult, FormatOption, MediaInfo};
use super::orchestrator::DownloadOrchestrator;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(message.into()),
        }
    }
}

impl ApiResponse<()> {
    /// `{ success: true }` with no payload
    pub fn done() -> Self {
        Self {
            success: true,
            payload: None,
            error: None,
        }
    }
}

impl<T: Serialize> From<Result<T, DownloaderError>> for ApiResponse<T> {
    fn from(result: Result<T, DownloaderError>) -> Self {
        match result {
            Ok(payload) => Self::ok(payload),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

/// Payload of a successful format query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatsPayload {
    pub formats: Vec<FormatOption>,
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
}

impl From<MediaInfo> for FormatsPayload {
    fn from(info: MediaInfo) -> Self {
        Self {
            formats: info.formats,
            title: info.title,
            thumbnail: info.thumbnail,
            duration: info.duration_seconds,
            uploader: info.uploader,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadPayload {
    pub result: DownloadResult,
}

pub async fn get_formats(
    orchestrator: &DownloadOrchestrator,
    url: &str,
) -> ApiResponse<FormatsPayload> {
    let result = orchestrator.list_formats(url).await.map(FormatsPayload::from);
    if let Err(e) = &result {
        error!("get_formats failed: {}", e);
    }
    result.into()
}

pub async fn start_download(
    orchestrator: &DownloadOrchestrator,
    request: DownloadRequest,
) -> ApiResponse<DownloadPayload> {
    let result = orchestrator
        .start_download(request)
        .await
        .map(|result| DownloadPayload { result });
    if let Err(e) = &result {
        error!("start_download failed: {}", e);
    }
    result.into()
}

pub fn cancel_download(orchestrator: &DownloadOrchestrator) -> ApiResponse<()> {
    orchestrator.cancel_download();
    ApiResponse::done()
}

// Tauri commands exposed to the frontend

use std::path::PathBuf;
use std::sync::Arc;

use log::{error, warn};
use tauri::{AppHandle, Manager};
use tauri_plugin_dialog::DialogExt;
use tauri_plugin_opener::OpenerExt;

use crate::downloader::api::{self, ApiResponse, DownloadPayload, FormatsPayload};
use crate::downloader::{AppInfo, DependencyStatus, DownloadOrchestrator, DownloadRequest};

fn orchestrator(app: &AppHandle) -> Arc<DownloadOrchestrator> {
    app.state::<Arc<DownloadOrchestrator>>().inner().clone()
}

#[tauri::command]
pub async fn get_formats(app: AppHandle, url: Option<String>) -> ApiResponse<FormatsPayload> {
    api::get_formats(&orchestrator(&app), url.as_deref().unwrap_or_default()).await
}

#[tauri::command]
pub async fn start_download(
    app: AppHandle,
    url: Option<String>,
    format: Option<String>,
    output_path: Option<String>,
) -> ApiResponse<DownloadPayload> {
    let request = DownloadRequest::new(
        url.unwrap_or_default(),
        format.unwrap_or_default(),
        output_path.unwrap_or_default(),
    );
    api::start_download(&orchestrator(&app), request).await
}

#[tauri::command]
pub fn cancel_download(app: AppHandle) -> ApiResponse<()> {
    api::cancel_download(&orchestrator(&app))
}

/// Folder picker; `None` when the user dismisses it
#[tauri::command]
pub async fn select_download_path(app: AppHandle) -> Option<String> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    app.dialog().file().pick_folder(move |folder| {
        let _ = tx.send(folder);
    });

    match rx.await {
        Ok(Some(folder)) => match folder.into_path() {
            Ok(path) => Some(path.to_string_lossy().into_owned()),
            Err(e) => {
                warn!("picked folder is not a local path: {}", e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            error!("folder dialog closed unexpectedly: {}", e);
            None
        }
    }
}

#[tauri::command]
pub fn open_path(app: AppHandle, path: Option<String>) -> ApiResponse<()> {
    let Some(path) = path.filter(|p| !p.trim().is_empty()) else {
        return ApiResponse::err("Caminho inválido");
    };

    match app.opener().open_path(path.as_str(), None::<&str>) {
        Ok(()) => ApiResponse::done(),
        Err(e) => {
            error!("failed to open {}: {}", path, e);
            ApiResponse::err(e.to_string())
        }
    }
}

#[tauri::command]
pub fn get_downloads_path(app: AppHandle) -> Option<PathBuf> {
    let orchestrator = orchestrator(&app);
    let path = orchestrator.downloads_path();
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path.to_path_buf())
    }
}

#[tauri::command]
pub fn get_app_info(app: AppHandle) -> AppInfo {
    orchestrator(&app).app_info()
}

#[tauri::command]
pub fn get_version(app: AppHandle) -> String {
    orchestrator(&app).config().version.clone()
}

#[tauri::command]
pub fn check_init(app: AppHandle) -> bool {
    orchestrator(&app).is_ready()
}

#[tauri::command]
pub async fn check_dependencies(app: AppHandle) -> DependencyStatus {
    orchestrator(&app).check_dependencies().await
}

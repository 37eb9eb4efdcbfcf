pub mod downloader;
pub mod ytdlp;

#[cfg(feature = "desktop")]
mod commands;

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use std::sync::Arc;

    use downloader::{ApiResponse, AppConfig, DownloadOrchestrator};
    use tauri::{Emitter, Manager};

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .plugin(
            tauri_plugin_log::Builder::default()
                .level(log::LevelFilter::Info)
                .level_for("tao", log::LevelFilter::Error)
                .level_for("reqwest", log::LevelFilter::Warn)
                .build(),
        )
        .setup(|app| {
            let orchestrator = Arc::new(DownloadOrchestrator::new(AppConfig::from_env()));

            let handle = app.handle().clone();
            orchestrator.on_progress(move |event| {
                if let Err(e) = handle.emit("download-progress", event) {
                    log::warn!("failed to emit progress: {}", e);
                }
            });
            app.manage(orchestrator.clone());

            // Provision yt-dlp/ffmpeg in the background so the window shows up immediately
            let handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                let payload = match orchestrator.initialize().await {
                    Ok(_) => ApiResponse::done(),
                    Err(e) => ApiResponse::err(e.to_string()),
                };
                if let Err(e) = handle.emit("init-complete", payload) {
                    log::warn!("failed to emit init-complete: {}", e);
                }
            });
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::get_formats,
            commands::start_download,
            commands::cancel_download,
            commands::select_download_path,
            commands::open_path,
            commands::get_downloads_path,
            commands::get_app_info,
            commands::get_version,
            commands::check_init,
            commands::check_dependencies,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

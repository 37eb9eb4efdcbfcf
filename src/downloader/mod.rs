// Downloader module - format discovery, dependency provisioning and
// supervised yt-dlp downloads

pub mod api;
pub mod archive;
pub mod config;
pub mod errors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod process;
pub mod progress;
pub mod tools;
pub mod traits;

pub use api::ApiResponse;
pub use config::{AppConfig, AppInfo};
pub use errors::{DependencyReason, DownloaderError, ProcessError, ResolveError};
pub use format_selector::FormatSelector;
pub use models::{
    DependencyStatus, DownloadRequest, DownloadResult, FormatKind, FormatOption, MediaInfo,
    OrchestratorState, ProgressEvent,
};
pub use orchestrator::DownloadOrchestrator;
pub use process::TokioRunner;
pub use tools::{DependencyManager, Tool};
pub use traits::{CommandRunner, DependencyResolver};

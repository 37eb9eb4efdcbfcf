// Application configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Overrides the per-user data directory that holds managed binaries
pub const ENV_HOME: &str = "EZ_DOWNLOADER_HOME";
/// Forces a specific yt-dlp binary
pub const ENV_YTDLP: &str = "EZ_DOWNLOADER_YTDLP";
/// Forces a specific ffmpeg binary
pub const ENV_FFMPEG: &str = "EZ_DOWNLOADER_FFMPEG";
/// Proxy for binary downloads and for yt-dlp itself
pub const ENV_PROXY: &str = "EZ_DOWNLOADER_PROXY";

/// Runtime configuration shared by the resolver and the orchestrator
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory name used under the per-user data location
    pub app_name: String,
    pub display_name: String,
    pub version: String,
    pub description: String,
    pub repository: String,
    pub author: String,
    /// Explicit data directory; replaces `{appdata}/{app_name}` when set
    pub data_dir: Option<PathBuf>,
    /// Explicit yt-dlp path; skips provisioning for the extractor
    pub extractor_path: Option<PathBuf>,
    /// Explicit ffmpeg path; skips provisioning for the muxer
    pub muxer_path: Option<PathBuf>,
    /// SOCKS5/HTTP proxy URL (e.g. "socks5://127.0.0.1:1080")
    pub proxy: Option<String>,
    /// Passed to yt-dlp as `--socket-timeout`; no timeout when unset
    pub socket_timeout: Option<u32>,
    /// Minimum gap between two progress emissions
    pub progress_interval: Duration,
    /// Fallback destination for downloads
    pub default_download_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: env!("CARGO_PKG_NAME").to_string(),
            display_name: "EZ Downloader".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: env!("CARGO_PKG_DESCRIPTION").to_string(),
            repository: env!("CARGO_PKG_REPOSITORY").to_string(),
            author: env!("CARGO_PKG_AUTHORS").replace(':', ", "),
            data_dir: None,
            extractor_path: None,
            muxer_path: None,
            proxy: None,
            socket_timeout: None,
            progress_interval: Duration::from_millis(500),
            default_download_dir: dirs::download_dir()
                .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

impl AppConfig {
    /// Defaults plus any `EZ_DOWNLOADER_*` overrides found in the environment
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup (empty values are ignored)
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(home) = get(ENV_HOME) {
            self.data_dir = Some(PathBuf::from(home));
        }
        if let Some(path) = get(ENV_YTDLP) {
            self.extractor_path = Some(PathBuf::from(path));
        }
        if let Some(path) = get(ENV_FFMPEG) {
            self.muxer_path = Some(PathBuf::from(path));
        }
        if let Some(proxy) = get(ENV_PROXY) {
            self.proxy = Some(proxy);
        }
        self
    }

    pub fn with_data_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.data_dir = dir;
        self
    }

    pub fn with_extractor_path(mut self, path: Option<PathBuf>) -> Self {
        self.extractor_path = path;
        self
    }

    pub fn with_muxer_path(mut self, path: Option<PathBuf>) -> Self {
        self.muxer_path = path;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_socket_timeout(mut self, seconds: Option<u32>) -> Self {
        self.socket_timeout = seconds;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Per-user application directory.
    ///
    /// Roaming app data on Windows, `~/.{app_name}` elsewhere.
    pub fn app_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }

        if cfg!(target_os = "windows") {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(&self.app_name)
        } else {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(format!(".{}", self.app_name))
        }
    }

    /// Directory holding the managed binaries
    pub fn deps_dir(&self) -> PathBuf {
        self.app_dir().join("deps")
    }

    pub fn app_info(&self) -> AppInfo {
        AppInfo {
            version: self.version.clone(),
            name: self.display_name.clone(),
            description: self.description.clone(),
            repository: self.repository.clone(),
            author: self.author.clone(),
        }
    }
}

/// About-box data for the UI
#[derive(Debug, Clone, Serialize)]
pub struct AppInfo {
    pub version: String,
    pub name: String,
    pub description: String,
    pub repository: String,
    pub author: String,
}

// Dependency resolver: locates or provisions yt-dlp and ffmpeg

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;

use super::archive::{self, ArchiveKind};
use super::config::AppConfig;
use super::errors::ResolveError;
use super::models::{DependencyStatus, ResolvedBinaries};
use super::traits::DependencyResolver;

const YTDLP_RELEASE_API: &str = "https://api.github.com/repos/yt-dlp/yt-dlp/releases/latest";
const BTBN_RELEASE_BASE: &str =
    "https://github.com/BtbN/FFmpeg-Builds/releases/latest/download";

/// External binaries the pipeline depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Tool {
    /// yt-dlp
    Extractor,
    /// ffmpeg
    Muxer,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Extractor => "yt-dlp",
            Tool::Muxer => "ffmpeg",
        }
    }

    /// File name of the executable on the current OS
    pub fn binary_name(&self) -> String {
        if cfg!(target_os = "windows") {
            format!("{}.exe", self.as_str())
        } else {
            self.as_str().to_string()
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OS/arch pair used to choose release assets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: &'static str,
    pub arch: &'static str,
}

impl Platform {
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        }
    }

    fn unsupported(&self, tool: Tool) -> ResolveError {
        ResolveError::UnsupportedPlatform {
            tool,
            os: self.os,
            arch: self.arch,
        }
    }

    /// Name of the yt-dlp release asset for this platform
    pub fn extractor_asset(&self) -> Result<&'static str, ResolveError> {
        let asset = match (self.os, self.arch) {
            ("windows", "x86_64") => "yt-dlp.exe",
            ("windows", "x86") => "yt-dlp_x86.exe",
            ("windows", "aarch64") => "yt-dlp_arm64.exe",
            ("macos", "x86_64" | "aarch64") => "yt-dlp_macos",
            ("linux", "x86_64") => "yt-dlp_linux",
            ("linux", "aarch64") => "yt-dlp_linux_aarch64",
            ("linux", "arm") => "yt-dlp_linux_armv7l",
            _ => return Err(self.unsupported(Tool::Extractor)),
        };
        Ok(asset)
    }

    /// Download URL and packaging of the ffmpeg build for this platform
    pub fn muxer_archive(&self) -> Result<(String, ArchiveKind), ResolveError> {
        let btbn = |name: &str| format!("{}/ffmpeg-master-latest-{}", BTBN_RELEASE_BASE, name);

        let archive = match (self.os, self.arch) {
            ("windows", "x86_64") => (btbn("win64-gpl.zip"), ArchiveKind::Zip),
            ("windows", "aarch64") => (btbn("winarm64-gpl.zip"), ArchiveKind::Zip),
            ("linux", "x86_64") => (btbn("linux64-gpl.tar.xz"), ArchiveKind::TarXz),
            ("linux", "aarch64") => (btbn("linuxarm64-gpl.tar.xz"), ArchiveKind::TarXz),
            ("macos", "x86_64") => (
                "https://evermeet.cx/ffmpeg/getrelease/zip".to_string(),
                ArchiveKind::Zip,
            ),
            ("macos", "aarch64") => (
                "https://ffmpeg.martin-riedl.de/redirect/latest/macos/arm64/release/ffmpeg.zip"
                    .to_string(),
                ArchiveKind::Zip,
            ),
            _ => return Err(self.unsupported(Tool::Muxer)),
        };
        Ok(archive)
    }
}

/// Where release artifacts are fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEndpoints {
    /// GitHub-style "latest release" JSON listing the yt-dlp assets
    pub extractor_release_api: String,
    /// Fixed ffmpeg archive; `None` picks the build for the platform
    pub muxer_archive: Option<(String, ArchiveKind)>,
    /// Connect without proxies (mirrors on the local network)
    pub direct: bool,
}

impl Default for ReleaseEndpoints {
    fn default() -> Self {
        Self {
            extractor_release_api: YTDLP_RELEASE_API.to_string(),
            muxer_archive: None,
            direct: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    browser_download_url: String,
}

/// Default resolver: explicit paths, then the managed `deps` directory,
/// then a fresh download of the latest release.
pub struct DependencyManager {
    config: AppConfig,
    platform: Platform,
    endpoints: ReleaseEndpoints,
    resolved: OnceCell<ResolvedBinaries>,
}

impl DependencyManager {
    pub fn new(config: AppConfig) -> Self {
        Self::with_platform(config, Platform::current())
    }

    pub fn with_platform(config: AppConfig, platform: Platform) -> Self {
        Self {
            config,
            platform,
            endpoints: ReleaseEndpoints::default(),
            resolved: OnceCell::new(),
        }
    }

    /// Fetch releases from somewhere other than upstream
    pub fn with_endpoints(mut self, endpoints: ReleaseEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// `deps/yt-dlp[.exe]`
    pub fn managed_extractor_path(&self) -> PathBuf {
        self.config.deps_dir().join(Tool::Extractor.binary_name())
    }

    /// `deps/ffmpeg/bin/ffmpeg[.exe]`
    pub fn managed_muxer_path(&self) -> PathBuf {
        self.config
            .deps_dir()
            .join("ffmpeg")
            .join("bin")
            .join(Tool::Muxer.binary_name())
    }

    fn configured_path(&self, tool: Tool) -> Option<&PathBuf> {
        match tool {
            Tool::Extractor => self.config.extractor_path.as_ref(),
            Tool::Muxer => self.config.muxer_path.as_ref(),
        }
    }

    /// Where the binary is expected to live (override or managed)
    pub fn expected_path(&self, tool: Tool) -> PathBuf {
        match (self.configured_path(tool), tool) {
            (Some(path), _) => path.clone(),
            (None, Tool::Extractor) => self.managed_extractor_path(),
            (None, Tool::Muxer) => self.managed_muxer_path(),
        }
    }

    fn http_client(&self) -> reqwest::Client {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(format!("{}/{}", self.config.app_name, self.config.version));

        if self.endpoints.direct {
            builder = builder.no_proxy();
        } else if let Some(proxy_url) = &self.config.proxy {
            match reqwest::Proxy::all(proxy_url.as_str()) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => warn!("ignoring invalid proxy {}: {}", proxy_url, e),
            }
        }

        builder.build().unwrap_or_else(|e| {
            warn!("falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
    }

    async fn provision(&self) -> Result<ResolvedBinaries, ResolveError> {
        let extractor_path = self.expected_path(Tool::Extractor);
        let muxer_path = self.expected_path(Tool::Muxer);

        if extractor_path.is_file() && muxer_path.is_file() {
            debug!(
                "dependencies present: {} / {}",
                extractor_path.display(),
                muxer_path.display()
            );
            return Ok(ResolvedBinaries {
                extractor_path,
                muxer_path,
            });
        }

        let client = self.http_client();
        for tool in [Tool::Extractor, Tool::Muxer] {
            let path = self.expected_path(tool);
            if path.is_file() {
                continue;
            }
            // Never download over an explicitly configured path
            if self.configured_path(tool).is_some() {
                return Err(ResolveError::NotFound { tool, path });
            }

            info!("{} not found at {}, downloading", tool, path.display());
            match tool {
                Tool::Extractor => self.install_extractor(&client, &path).await?,
                Tool::Muxer => self.install_muxer(&client, &path).await?,
            }
            info!("{} installed at {}", tool, path.display());
        }

        Ok(ResolvedBinaries {
            extractor_path,
            muxer_path,
        })
    }

    async fn install_extractor(
        &self,
        client: &reqwest::Client,
        target: &Path,
    ) -> Result<(), ResolveError> {
        let tool = Tool::Extractor;
        let asset_name = self.platform.extractor_asset()?;
        let api = self.endpoints.extractor_release_api.as_str();

        let response = client
            .get(api)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|source| network(tool, api, source))?;
        let response = check_status(tool, api, response)?;
        let release: GithubRelease = response
            .json()
            .await
            .map_err(|source| network(tool, api, source))?;

        let asset = release
            .assets
            .into_iter()
            .find(|a| a.name == asset_name)
            .ok_or_else(|| ResolveError::AssetMissing {
                tool,
                asset: asset_name.to_string(),
            })?;
        debug!("yt-dlp {} asset {}", release.tag_name, asset.name);

        let partial = target.with_extension("part");
        let installed: Result<(), ResolveError> = async {
            download_to(client, tool, &asset.browser_download_url, &partial).await?;
            make_executable(tool, &partial)?;
            tokio::fs::rename(&partial, target)
                .await
                .map_err(|e| ResolveError::io(tool, target, e))
        }
        .await;

        if installed.is_err() {
            let _ = tokio::fs::remove_file(&partial).await;
        }
        installed
    }

    async fn install_muxer(
        &self,
        client: &reqwest::Client,
        target: &Path,
    ) -> Result<(), ResolveError> {
        let tool = Tool::Muxer;
        let (url, kind) = match &self.endpoints.muxer_archive {
            Some((url, kind)) => (url.clone(), *kind),
            None => self.platform.muxer_archive()?,
        };

        let ffmpeg_dir = self.config.deps_dir().join("ffmpeg");
        let archive_path = ffmpeg_dir.join(format!("download.{}", kind.extension()));
        let staging = ffmpeg_dir.join("staging");

        if let Err(e) = download_to(client, tool, &url, &archive_path).await {
            let _ = tokio::fs::remove_file(&archive_path).await;
            return Err(e);
        }

        let bin_dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| ffmpeg_dir.join("bin"));
        let binary = tool.binary_name();
        let probe = if cfg!(target_os = "windows") {
            "ffprobe.exe"
        } else {
            "ffprobe"
        };

        let (archive_for_task, staging_for_task, target_for_task) =
            (archive_path.clone(), staging.clone(), target.to_path_buf());
        let extracted = tokio::task::spawn_blocking(move || -> Result<(), ResolveError> {
            archive::extract(&archive_for_task, kind, &staging_for_task).map_err(|e| {
                ResolveError::Archive {
                    tool,
                    message: e.to_string(),
                }
            })?;

            let found = archive::find_file(&staging_for_task, &binary).ok_or_else(|| {
                ResolveError::Archive {
                    tool,
                    message: format!("{} ausente no pacote", binary),
                }
            })?;
            std::fs::create_dir_all(&bin_dir).map_err(|e| ResolveError::io(tool, &bin_dir, e))?;
            std::fs::copy(&found, &target_for_task)
                .map_err(|e| ResolveError::io(tool, &target_for_task, e))?;

            // ffprobe is optional
            if let Some(found_probe) = archive::find_file(&staging_for_task, probe) {
                if let Err(e) = std::fs::copy(&found_probe, bin_dir.join(probe)) {
                    warn!("could not install ffprobe: {}", e);
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| ResolveError::Archive {
            tool,
            message: e.to_string(),
        });

        let _ = tokio::fs::remove_dir_all(&staging).await;
        let _ = tokio::fs::remove_file(&archive_path).await;

        extracted??;
        make_executable(tool, target)
    }
}

fn network(tool: Tool, url: &str, source: reqwest::Error) -> ResolveError {
    ResolveError::Network {
        tool,
        url: url.to_string(),
        source,
    }
}

fn check_status(
    tool: Tool,
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ResolveError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ResolveError::HttpStatus {
            tool,
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

/// Stream `url` into `dest`, creating parent directories
async fn download_to(
    client: &reqwest::Client,
    tool: Tool,
    url: &str,
    dest: &Path,
) -> Result<(), ResolveError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ResolveError::io(tool, parent, e))?;
    }

    debug!("downloading {} from {}", tool, url);
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| network(tool, url, source))?;
    let mut response = check_status(tool, url, response)?;

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| ResolveError::io(tool, dest, e))?;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|source| network(tool, url, source))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| ResolveError::io(tool, dest, e))?;
    }
    file.flush()
        .await
        .map_err(|e| ResolveError::io(tool, dest, e))
}

#[cfg(unix)]
fn make_executable(tool: Tool, path: &Path) -> Result<(), ResolveError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| ResolveError::io(tool, path, e))
}

#[cfg(not(unix))]
fn make_executable(_tool: Tool, _path: &Path) -> Result<(), ResolveError> {
    Ok(())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[async_trait]
impl DependencyResolver for DependencyManager {
    async fn resolve(&self) -> Result<ResolvedBinaries, ResolveError> {
        self.resolved
            .get_or_try_init(|| self.provision())
            .await
            .cloned()
    }

    async fn check(&self) -> DependencyStatus {
        let ytdlp = is_executable(&self.expected_path(Tool::Extractor));
        let ffmpeg = is_executable(&self.expected_path(Tool::Muxer));
        debug!("dependency check: yt-dlp={} ffmpeg={}", ytdlp, ffmpeg);
        DependencyStatus::new(ytdlp, ffmpeg)
    }
}

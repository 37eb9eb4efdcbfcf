// Error types for the download pipeline

use std::path::PathBuf;

use thiserror::Error;

use super::tools::Tool;

/// Failures raised by the process runner
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Binary missing or not executable
    #[error("Ferramenta não encontrada ou não executável: {program} ({source})")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Process ran and exited with a non-zero status
    #[error("{message}")]
    NonZeroExit { code: Option<i32>, message: String },

    /// Waiting on or reading from the child failed
    #[error("Erro de processo ({program}): {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Build a non-zero exit error from collected stderr.
    ///
    /// The last non-blank stderr line is the most informative one; when stderr
    /// is empty the exit code is reported instead.
    pub fn from_exit(code: Option<i32>, stderr: &str) -> Self {
        let message = stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| match code {
                Some(code) => format!("exit code {}", code),
                None => "exit code unknown (terminated by signal)".to_string(),
            });
        Self::NonZeroExit { code, message }
    }
}

/// Broad category of a dependency failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyReason {
    NotDownloaded,
    DownloadFailed,
    UnsupportedPlatform,
}

/// Failures raised while locating or provisioning external binaries
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{tool}: plataforma não suportada ({os}/{arch})")]
    UnsupportedPlatform {
        tool: Tool,
        os: &'static str,
        arch: &'static str,
    },

    #[error("{tool} não encontrado em {}", .path.display())]
    NotFound { tool: Tool, path: PathBuf },

    #[error("{tool}: falha de rede ao baixar {url}: {source}")]
    Network {
        tool: Tool,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{tool}: servidor respondeu HTTP {status} para {url}")]
    HttpStatus { tool: Tool, url: String, status: u16 },

    #[error("{tool}: nenhum arquivo de release compatível ({asset})")]
    AssetMissing { tool: Tool, asset: String },

    #[error("{tool}: erro de disco em {}: {source}", .path.display())]
    Disk {
        tool: Tool,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool}: permissão negada em {}: {source}", .path.display())]
    Permissions {
        tool: Tool,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool}: pacote inválido: {message}")]
    Archive { tool: Tool, message: String },
}

impl ResolveError {
    /// Which binary failed
    pub fn tool(&self) -> Tool {
        match self {
            Self::UnsupportedPlatform { tool, .. }
            | Self::NotFound { tool, .. }
            | Self::Network { tool, .. }
            | Self::HttpStatus { tool, .. }
            | Self::AssetMissing { tool, .. }
            | Self::Disk { tool, .. }
            | Self::Permissions { tool, .. }
            | Self::Archive { tool, .. } => *tool,
        }
    }

    pub fn reason(&self) -> DependencyReason {
        match self {
            Self::UnsupportedPlatform { .. } => DependencyReason::UnsupportedPlatform,
            Self::NotFound { .. } => DependencyReason::NotDownloaded,
            Self::Network { .. }
            | Self::HttpStatus { .. }
            | Self::AssetMissing { .. }
            | Self::Disk { .. }
            | Self::Permissions { .. }
            | Self::Archive { .. } => DependencyReason::DownloadFailed,
        }
    }

    /// Classify an I/O failure as a permission or generic disk problem
    pub fn io(tool: Tool, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Self::Permissions { tool, path, source }
        } else {
            Self::Disk { tool, path, source }
        }
    }
}

/// Errors surfaced by the download orchestrator's public operations
#[derive(Debug, Error)]
pub enum DownloaderError {
    /// Empty or syntactically invalid URL
    #[error("URL inválida")]
    InvalidUrl(String),

    /// Missing request field
    #[error("URL, formato ou caminho de saída inválido")]
    InvalidRequest,

    /// yt-dlp or ffmpeg could not be provisioned
    #[error("Dependência indisponível: {0}")]
    DependencyMissing(#[from] ResolveError),

    /// Metadata query failed
    #[error("Erro ao obter formatos: {0}")]
    ExtractionFailed(String),

    /// Download process exited with a non-zero status
    #[error("{0}")]
    DownloadFailed(String),

    #[error("Já existe um download em andamento")]
    AlreadyDownloading,

    /// The tool binary could not be started at all
    #[error("Ferramenta não encontrada ou não executável: {program}")]
    SpawnFailed { program: String },

    /// Destination directory could not be created
    #[error("Não foi possível criar o diretório {}: {source}", .path.display())]
    DestinationUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloaderError {
    /// Map a process failure from the metadata query
    pub fn extraction(err: ProcessError) -> Self {
        match err {
            ProcessError::Spawn { program, .. } => Self::SpawnFailed { program },
            other => Self::ExtractionFailed(other.to_string()),
        }
    }

    /// Map a process failure from the download run
    pub fn download(err: ProcessError) -> Self {
        match err {
            ProcessError::Spawn { program, .. } => Self::SpawnFailed { program },
            other => Self::DownloadFailed(other.to_string()),
        }
    }
}

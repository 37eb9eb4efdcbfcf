// Seams between the orchestrator and its collaborators

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::errors::{ProcessError, ResolveError};
use super::models::{DependencyStatus, ProgressEvent, ResolvedBinaries};
use super::process::{ProcessOutput, SupervisedProcess};

/// Receives stdout text as it arrives from a supervised process
pub type StdoutSink = Box<dyn FnMut(&str) + Send + 'static>;

/// Single progress subscriber registered on the orchestrator
pub type ProgressObserver = Arc<dyn Fn(ProgressEvent) + Send + Sync + 'static>;

/// Spawns external tools
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, buffering stdout and stderr
    async fn run(&self, program: &Path, args: &[String]) -> Result<ProcessOutput, ProcessError>;

    /// Start a long-running process, streaming stdout into `on_stdout`.
    ///
    /// Cancelling `cancel` kills the child; the returned handle then settles
    /// as cancelled and the sink receives nothing further.
    fn run_supervised(
        &self,
        program: &Path,
        args: &[String],
        on_stdout: StdoutSink,
        cancel: CancellationToken,
    ) -> Result<SupervisedProcess, ProcessError>;
}

/// Locates (and provisions, if needed) yt-dlp and ffmpeg
#[async_trait]
pub trait DependencyResolver: Send + Sync {
    /// Paths of both binaries; cached after the first success
    async fn resolve(&self) -> Result<ResolvedBinaries, ResolveError>;

    /// Presence check that never touches the network
    async fn check(&self) -> DependencyStatus;
}

// Orchestrator: sequences format discovery and supervised downloads

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::{AppConfig, AppInfo};
use super::errors::DownloaderError;
use super::models::{
    DependencyStatus, DownloadRequest, DownloadResult, MediaInfo, OrchestratorState,
    ProgressEvent, ResolvedBinaries,
};
use super::process::{SupervisedOutcome, TokioRunner};
use super::progress::ProgressParser;
use super::tools::DependencyManager;
use super::traits::{CommandRunner, DependencyResolver, ProgressObserver, StdoutSink};
use crate::ytdlp;

pub const DOWNLOAD_COMPLETE_MESSAGE: &str = "Download concluído com sucesso";
pub const DOWNLOAD_CANCELLED_MESSAGE: &str = "Download cancelado";

/// The live download, if any
struct ActiveDownload {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Slot {
    active: Option<ActiveDownload>,
    next_generation: u64,
    fetching: usize,
}

type SharedObserver = Arc<RwLock<Option<ProgressObserver>>>;

/// Releases the download slot on every exit path, unless a cancel already
/// released it or a newer download took it over.
struct ActiveGuard<'a> {
    slot: &'a Mutex<Slot>,
    generation: u64,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut slot = lock(self.slot);
        if slot
            .active
            .as_ref()
            .is_some_and(|a| a.generation == self.generation)
        {
            slot.active = None;
        }
    }
}

struct FetchGuard<'a> {
    slot: &'a Mutex<Slot>,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        let mut slot = lock(self.slot);
        slot.fetching = slot.fetching.saturating_sub(1);
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn emit_to(observer: &SharedObserver, event: ProgressEvent) {
    let current = observer
        .read()
        .map(|guard| (*guard).clone())
        .unwrap_or_else(|poisoned| (*poisoned.into_inner()).clone());
    if let Some(callback) = current {
        callback(event);
    }
}

/// Accepts absolute URLs with a host; anything else is `InvalidUrl`
pub fn validate_url(raw: &str) -> Result<Url, DownloaderError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DownloaderError::InvalidUrl(raw.to_string()));
    }
    match Url::parse(trimmed) {
        Ok(url) if url.has_host() => Ok(url),
        _ => Err(DownloaderError::InvalidUrl(raw.to_string())),
    }
}

/// Public entry point of the download pipeline.
///
/// Holds at most one live download. Format queries may run alongside it.
pub struct DownloadOrchestrator {
    config: AppConfig,
    resolver: Arc<dyn DependencyResolver>,
    runner: Arc<dyn CommandRunner>,
    observer: SharedObserver,
    slot: Mutex<Slot>,
    ready: AtomicBool,
}

impl DownloadOrchestrator {
    /// Production wiring: managed dependencies and tokio processes
    pub fn new(config: AppConfig) -> Self {
        let resolver = Arc::new(DependencyManager::new(config.clone()));
        Self::with_parts(config, resolver, Arc::new(TokioRunner::new()))
    }

    pub fn with_parts(
        config: AppConfig,
        resolver: Arc<dyn DependencyResolver>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            config,
            resolver,
            runner,
            observer: Arc::new(RwLock::new(None)),
            slot: Mutex::new(Slot::default()),
            ready: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn app_info(&self) -> AppInfo {
        self.config.app_info()
    }

    pub fn downloads_path(&self) -> &std::path::Path {
        &self.config.default_download_dir
    }

    /// Register the progress observer; replaces any previous one
    pub fn on_progress<F>(&self, observer: F)
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        let observer: ProgressObserver = Arc::new(observer);
        match self.observer.write() {
            Ok(mut guard) => *guard = Some(observer),
            Err(poisoned) => *poisoned.into_inner() = Some(observer),
        }
    }

    fn emit(&self, event: ProgressEvent) {
        emit_to(&self.observer, event);
    }

    pub fn state(&self) -> OrchestratorState {
        let slot = lock(&self.slot);
        if slot.active.is_some() {
            OrchestratorState::Downloading
        } else if slot.fetching > 0 {
            OrchestratorState::FetchingFormats
        } else {
            OrchestratorState::Idle
        }
    }

    /// Whether dependencies have been resolved at least once
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn resolve(&self) -> Result<ResolvedBinaries, DownloaderError> {
        match self.resolver.resolve().await {
            Ok(binaries) => {
                self.ready.store(true, Ordering::SeqCst);
                Ok(binaries)
            }
            Err(e) => {
                error!("dependency resolution failed: {}", e);
                Err(DownloaderError::DependencyMissing(e))
            }
        }
    }

    /// Provision dependencies eagerly (app startup)
    pub async fn initialize(&self) -> Result<ResolvedBinaries, DownloaderError> {
        info!("initializing dependencies");
        self.emit(ProgressEvent::initializing());
        let binaries = self.resolve().await?;
        info!(
            "dependencies ready: yt-dlp={} ffmpeg={}",
            binaries.extractor_path.display(),
            binaries.muxer_path.display()
        );
        Ok(binaries)
    }

    pub async fn check_dependencies(&self) -> DependencyStatus {
        self.resolver.check().await
    }

    /// Query available formats and basic metadata for `url`
    pub async fn list_formats(&self, url: &str) -> Result<MediaInfo, DownloaderError> {
        let url = validate_url(url)?;

        lock(&self.slot).fetching += 1;
        let _fetching = FetchGuard { slot: &self.slot };

        let binaries = self.resolve().await?;
        info!("fetching formats for {}", url);

        let args = ytdlp::metadata_args(url.as_str(), &self.config);
        let output = self
            .runner
            .run(&binaries.extractor_path, &args)
            .await
            .map_err(|e| {
                warn!("metadata query failed: {}", e);
                DownloaderError::extraction(e)
            })?;

        let raw = ytdlp::parse_media_info(&output.stdout)
            .map_err(|e| DownloaderError::ExtractionFailed(e.to_string()))?;
        let info = ytdlp::into_media_info(raw);
        debug!("{} formats for \"{}\"", info.formats.len(), info.title);
        Ok(info)
    }

    fn claim(&self) -> Result<(u64, CancellationToken), DownloaderError> {
        let mut slot = lock(&self.slot);
        if slot.active.is_some() {
            return Err(DownloaderError::AlreadyDownloading);
        }
        slot.next_generation += 1;
        let generation = slot.next_generation;
        let cancel = CancellationToken::new();
        slot.active = Some(ActiveDownload {
            generation,
            cancel: cancel.clone(),
        });
        Ok((generation, cancel))
    }

    fn progress_sink(&self, saw_complete: Arc<AtomicBool>) -> StdoutSink {
        let observer = self.observer.clone();
        let mut parser = ProgressParser::new(self.config.progress_interval);
        Box::new(move |chunk: &str| {
            if let Some(percent) = parser.feed(chunk) {
                if percent >= 100.0 {
                    saw_complete.store(true, Ordering::SeqCst);
                }
                emit_to(&observer, ProgressEvent::percent(percent));
            }
        })
    }

    fn cancelled_result(request: &DownloadRequest) -> DownloadResult {
        DownloadResult {
            path: request.destination_directory.clone(),
            message: DOWNLOAD_CANCELLED_MESSAGE.to_string(),
            cancelled: true,
        }
    }

    /// Download `request` and wait for it to finish.
    ///
    /// A user cancel is not an error: the result comes back with
    /// `cancelled` set.
    pub async fn start_download(
        &self,
        request: DownloadRequest,
    ) -> Result<DownloadResult, DownloaderError> {
        if !request.is_complete() {
            return Err(DownloaderError::InvalidRequest);
        }
        validate_url(&request.source_url)?;

        let (generation, cancel) = self.claim()?;
        let _active = ActiveGuard {
            slot: &self.slot,
            generation,
        };

        info!(
            "starting download {} (format {}) into {}",
            request.source_url,
            request.chosen_format_id,
            request.destination_directory.display()
        );
        self.emit(ProgressEvent::initializing());

        let binaries = self.resolve().await?;

        let destination = &request.destination_directory;
        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|source| DownloaderError::DestinationUnavailable {
                path: destination.clone(),
                source,
            })?;

        if cancel.is_cancelled() {
            info!("download cancelled before start");
            return Ok(Self::cancelled_result(&request));
        }

        let saw_complete = Arc::new(AtomicBool::new(false));
        let args = ytdlp::download_args(&request, &binaries, &self.config);
        let process = self
            .runner
            .run_supervised(
                &binaries.extractor_path,
                &args,
                self.progress_sink(saw_complete.clone()),
                cancel,
            )
            .map_err(|e| {
                error!("failed to start download: {}", e);
                DownloaderError::download(e)
            })?;

        match process.wait().await {
            Ok(SupervisedOutcome::Completed) => {
                if !saw_complete.load(Ordering::SeqCst) {
                    self.emit(ProgressEvent::percent(100.0));
                }
                info!("download finished: {}", destination.display());
                Ok(DownloadResult {
                    path: destination.clone(),
                    message: DOWNLOAD_COMPLETE_MESSAGE.to_string(),
                    cancelled: false,
                })
            }
            Ok(SupervisedOutcome::Cancelled) => {
                info!("download cancelled");
                Ok(Self::cancelled_result(&request))
            }
            Err(e) => {
                error!("download failed: {}", e);
                Err(DownloaderError::download(e))
            }
        }
    }

    /// Kill the live download, if any. Returns whether one was running.
    pub fn cancel_download(&self) -> bool {
        let active = lock(&self.slot).active.take();
        match active {
            Some(active) => {
                info!("cancelling download #{}", active.generation);
                active.cancel.cancel();
                true
            }
            None => {
                debug!("cancel requested with no active download");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::errors::{DependencyReason, ProcessError, ResolveError};
    use crate::downloader::process::{ProcessOutput, SupervisedProcess};
    use crate::downloader::tools::Tool;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const METADATA: &str = r#"{
        "title": "Clip",
        "uploader": "Someone",
        "duration": 61.5,
        "thumbnails": [
            {"url": "https://t/small.jpg", "width": 120, "height": 90},
            {"url": "https://t/big.jpg", "width": 1920, "height": 1080}
        ],
        "formats": [
            {"format_id": "22", "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a", "height": 1080},
            {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a", "abr": 128}
        ]
    }"#;

    enum FakeResolver {
        Ready,
        Unsupported,
    }

    #[async_trait]
    impl DependencyResolver for FakeResolver {
        async fn resolve(&self) -> Result<ResolvedBinaries, ResolveError> {
            match self {
                Self::Ready => Ok(ResolvedBinaries {
                    extractor_path: PathBuf::from("/deps/yt-dlp"),
                    muxer_path: PathBuf::from("/deps/ffmpeg/bin/ffmpeg"),
                }),
                Self::Unsupported => Err(ResolveError::UnsupportedPlatform {
                    tool: Tool::Extractor,
                    os: "haiku",
                    arch: "x86_64",
                }),
            }
        }

        async fn check(&self) -> DependencyStatus {
            DependencyStatus::new(matches!(self, Self::Ready), matches!(self, Self::Ready))
        }
    }

    #[derive(Clone)]
    enum Exit {
        Success,
        Failure(&'static str),
        UntilCancelled,
        SpawnError,
    }

    struct FakeRunner {
        metadata: Result<&'static str, &'static str>,
        chunks: Vec<&'static str>,
        exit: Exit,
        run_calls: AtomicUsize,
        supervised_calls: AtomicUsize,
        last_args: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        fn new(chunks: Vec<&'static str>, exit: Exit) -> Self {
            Self {
                metadata: Ok(METADATA),
                chunks,
                exit,
                run_calls: AtomicUsize::new(0),
                supervised_calls: AtomicUsize::new(0),
                last_args: Mutex::new(Vec::new()),
            }
        }

        fn with_metadata(mut self, metadata: Result<&'static str, &'static str>) -> Self {
            self.metadata = metadata;
            self
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, _program: &Path, args: &[String]) -> Result<ProcessOutput, ProcessError> {
            self.run_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_args.lock().unwrap() = args.to_vec();
            match self.metadata {
                Ok(stdout) => Ok(ProcessOutput {
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                    exit_code: Some(0),
                }),
                Err(stderr) => Err(ProcessError::from_exit(Some(1), stderr)),
            }
        }

        fn run_supervised(
            &self,
            program: &Path,
            args: &[String],
            mut on_stdout: StdoutSink,
            cancel: CancellationToken,
        ) -> Result<SupervisedProcess, ProcessError> {
            self.supervised_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_args.lock().unwrap() = args.to_vec();

            let exit = self.exit.clone();
            if let Exit::SpawnError = exit {
                return Err(ProcessError::Spawn {
                    program: program.display().to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }

            let chunks = self.chunks.clone();
            let task = tokio::spawn(async move {
                for chunk in chunks {
                    on_stdout(chunk);
                }
                match exit {
                    Exit::Success => Ok(SupervisedOutcome::Completed),
                    Exit::Failure(stderr) => Err(ProcessError::from_exit(Some(1), stderr)),
                    Exit::UntilCancelled => {
                        cancel.cancelled().await;
                        Ok(SupervisedOutcome::Cancelled)
                    }
                    Exit::SpawnError => unreachable!(),
                }
            });
            Ok(SupervisedProcess::new(program.display().to_string(), task))
        }
    }

    fn orchestrator(resolver: FakeResolver, runner: Arc<FakeRunner>) -> DownloadOrchestrator {
        DownloadOrchestrator::with_parts(AppConfig::default(), Arc::new(resolver), runner)
    }

    fn record_events(orch: &DownloadOrchestrator) -> Arc<Mutex<Vec<ProgressEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        orch.on_progress(move |e| sink.lock().unwrap().push(e));
        events
    }

    async fn wait_for_state(orch: &DownloadOrchestrator, state: OrchestratorState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while orch.state() != state {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("state not reached");
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://www.youtube.com/watch?v=abc").is_ok());
        assert!(validate_url("  https://youtu.be/abc  ").is_ok());
        assert!(validate_url("not a url").is_err());
        assert!(validate_url("").is_err());
        assert!(validate_url("/relative/path").is_err());
        assert!(validate_url("mailto:someone").is_err());
    }

    #[tokio::test]
    async fn test_list_formats_normalizes_metadata() {
        let runner = Arc::new(FakeRunner::new(vec![], Exit::Success));
        let orch = orchestrator(FakeResolver::Ready, runner.clone());

        let info = orch.list_formats("https://youtu.be/abc").await.unwrap();
        let labels: Vec<&str> = info.formats.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Melhor Qualidade (Automático)",
                "MP4 - 1080p (Vídeo + Áudio)",
                "M4A - 128 kbps (Áudio)"
            ]
        );
        assert_eq!(info.title, "Clip");
        assert_eq!(info.thumbnail.as_deref(), Some("https://t/big.jpg"));
        assert_eq!(info.duration_seconds, Some(61.5));
        assert_eq!(info.uploader.as_deref(), Some("Someone"));

        let args = runner.last_args.lock().unwrap().clone();
        assert_eq!(args[0], "--dump-single-json");
        assert_eq!(orch.state(), OrchestratorState::Idle);
        assert!(orch.is_ready());
    }

    #[tokio::test]
    async fn test_invalid_url_runs_nothing() {
        let runner = Arc::new(FakeRunner::new(vec![], Exit::Success));
        let orch = orchestrator(FakeResolver::Ready, runner.clone());

        let err = orch.list_formats("not a url").await.unwrap_err();
        assert_eq!(err.to_string(), "URL inválida");
        assert_eq!(runner.run_calls.load(Ordering::SeqCst), 0);
        assert!(!orch.is_ready());
    }

    #[tokio::test]
    async fn test_metadata_failure_is_extraction_failed() {
        let runner = Arc::new(
            FakeRunner::new(vec![], Exit::Success).with_metadata(Err("ERROR: Unsupported URL")),
        );
        let orch = orchestrator(FakeResolver::Ready, runner);

        let err = orch.list_formats("https://example.com/v").await.unwrap_err();
        assert!(matches!(err, DownloaderError::ExtractionFailed(_)));
        assert_eq!(err.to_string(), "Erro ao obter formatos: ERROR: Unsupported URL");
    }

    #[tokio::test]
    async fn test_malformed_metadata_is_extraction_failed() {
        let runner =
            Arc::new(FakeRunner::new(vec![], Exit::Success).with_metadata(Ok("<html>")));
        let orch = orchestrator(FakeResolver::Ready, runner);

        let err = orch.list_formats("https://example.com/v").await.unwrap_err();
        assert!(matches!(err, DownloaderError::ExtractionFailed(_)));
    }

    #[tokio::test]
    async fn test_dependency_failure_propagates() {
        let runner = Arc::new(FakeRunner::new(vec![], Exit::Success));
        let orch = orchestrator(FakeResolver::Unsupported, runner.clone());
        let dir = tempfile::tempdir().unwrap();

        match orch.list_formats("https://youtu.be/abc").await.unwrap_err() {
            DownloaderError::DependencyMissing(e) => {
                assert_eq!(e.reason(), DependencyReason::UnsupportedPlatform)
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let request = DownloadRequest::new("https://youtu.be/abc", "best", dir.path());
        let err = orch.start_download(request).await.unwrap_err();
        assert!(matches!(err, DownloaderError::DependencyMissing(_)));
        assert_eq!(runner.supervised_calls.load(Ordering::SeqCst), 0);
        assert_eq!(orch.state(), OrchestratorState::Idle);
        assert!(orch.initialize().await.is_err());
        assert!(!orch.is_ready());
    }

    #[tokio::test]
    async fn test_successful_download_reports_progress() {
        let runner = Arc::new(FakeRunner::new(
            vec!["[download]  50.0% of 10MiB\n", "[download] 100% of 10MiB\n"],
            Exit::Success,
        ));
        let orch = orchestrator(FakeResolver::Ready, runner.clone());
        let events = record_events(&orch);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");

        let result = orch
            .start_download(DownloadRequest::new("https://youtu.be/abc", "best", &out))
            .await
            .unwrap();

        assert_eq!(result.path, out);
        assert_eq!(result.message, "Download concluído com sucesso");
        assert!(!result.cancelled);
        assert!(out.is_dir());

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                ProgressEvent::initializing(),
                ProgressEvent::percent(50.0),
                ProgressEvent::percent(100.0)
            ]
        );

        let args = runner.last_args.lock().unwrap().clone();
        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], "bestvideo+bestaudio/best");
        assert_eq!(orch.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn test_final_percent_emitted_when_tool_never_reports_it() {
        let runner = Arc::new(FakeRunner::new(vec!["[download]  40.0%\n"], Exit::Success));
        let orch = orchestrator(FakeResolver::Ready, runner);
        let events = record_events(&orch);
        let dir = tempfile::tempdir().unwrap();

        orch.start_download(DownloadRequest::new("https://youtu.be/abc", "22", dir.path()))
            .await
            .unwrap();

        let percents: Vec<f32> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(ProgressEvent::as_percent)
            .collect();
        assert_eq!(percents, vec![40.0, 100.0]);
    }

    #[tokio::test]
    async fn test_progress_interval_comes_from_config() {
        let runner = Arc::new(FakeRunner::new(
            vec!["[download]  10.0%\n", "[download]  20.0%\n", "[download] 100%\n"],
            Exit::Success,
        ));
        let config = AppConfig::default().with_progress_interval(Duration::from_secs(60));
        let orch = DownloadOrchestrator::with_parts(config, Arc::new(FakeResolver::Ready), runner);
        let events = record_events(&orch);
        let dir = tempfile::tempdir().unwrap();

        orch.start_download(DownloadRequest::new("https://youtu.be/abc", "best", dir.path()))
            .await
            .unwrap();

        // 20% lands inside the interval; 100% is never held back
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                ProgressEvent::initializing(),
                ProgressEvent::percent(10.0),
                ProgressEvent::percent(100.0)
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_download_carries_stderr_and_releases_slot() {
        let runner = Arc::new(FakeRunner::new(vec![], Exit::Failure("ERROR: Unsupported URL")));
        let orch = orchestrator(FakeResolver::Ready, runner.clone());
        let dir = tempfile::tempdir().unwrap();
        let request = DownloadRequest::new("https://example.com/v", "best", dir.path());

        let err = orch.start_download(request.clone()).await.unwrap_err();
        assert!(matches!(err, DownloaderError::DownloadFailed(_)));
        assert_eq!(err.to_string(), "ERROR: Unsupported URL");
        assert_eq!(orch.state(), OrchestratorState::Idle);

        // A later download can start
        assert!(orch.start_download(request).await.is_err());
        assert_eq!(runner.supervised_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_distinct() {
        let runner = Arc::new(FakeRunner::new(vec![], Exit::SpawnError));
        let orch = orchestrator(FakeResolver::Ready, runner);
        let dir = tempfile::tempdir().unwrap();

        let err = orch
            .start_download(DownloadRequest::new("https://youtu.be/abc", "best", dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloaderError::SpawnFailed { .. }));
        assert_eq!(orch.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn test_incomplete_request_is_rejected() {
        let runner = Arc::new(FakeRunner::new(vec![], Exit::Success));
        let orch = orchestrator(FakeResolver::Ready, runner.clone());

        let err = orch
            .start_download(DownloadRequest::new("https://youtu.be/abc", "", "/tmp/out"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "URL, formato ou caminho de saída inválido");

        let err = orch
            .start_download(DownloadRequest::new("not a url", "best", "/tmp/out"))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloaderError::InvalidUrl(_)));
        assert_eq!(runner.supervised_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unwritable_destination() {
        let runner = Arc::new(FakeRunner::new(vec![], Exit::Success));
        let orch = orchestrator(FakeResolver::Ready, runner.clone());
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();

        let err = orch
            .start_download(DownloadRequest::new("https://youtu.be/abc", "best", file.join("sub")))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloaderError::DestinationUnavailable { .. }));
        assert_eq!(runner.supervised_calls.load(Ordering::SeqCst), 0);
        assert_eq!(orch.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn test_second_download_is_rejected_then_cancel_releases() {
        let runner = Arc::new(FakeRunner::new(vec!["[download]  5.0%\n"], Exit::UntilCancelled));
        let orch = Arc::new(orchestrator(FakeResolver::Ready, runner.clone()));
        let dir = tempfile::tempdir().unwrap();
        let request = DownloadRequest::new("https://youtu.be/abc", "best", dir.path());

        let running = {
            let orch = orch.clone();
            let request = request.clone();
            tokio::spawn(async move { orch.start_download(request).await })
        };
        wait_for_state(&orch, OrchestratorState::Downloading).await;

        let err = orch.start_download(request).await.unwrap_err();
        assert!(matches!(err, DownloaderError::AlreadyDownloading));
        assert_eq!(err.to_string(), "Já existe um download em andamento");

        assert!(orch.cancel_download());
        // State changes immediately, before the child settles
        assert_eq!(orch.state(), OrchestratorState::Idle);

        let result = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(result.cancelled);
        assert_eq!(result.message, DOWNLOAD_CANCELLED_MESSAGE);
        assert!(!orch.cancel_download());
    }

    #[tokio::test]
    async fn test_stale_download_does_not_clear_newer_slot() {
        let runner = Arc::new(FakeRunner::new(vec![], Exit::UntilCancelled));
        let orch = Arc::new(orchestrator(FakeResolver::Ready, runner));
        let dir = tempfile::tempdir().unwrap();
        let request = DownloadRequest::new("https://youtu.be/abc", "best", dir.path());

        let spawn = |orch: Arc<DownloadOrchestrator>, request: DownloadRequest| {
            tokio::spawn(async move { orch.start_download(request).await })
        };

        let first = spawn(orch.clone(), request.clone());
        wait_for_state(&orch, OrchestratorState::Downloading).await;
        orch.cancel_download();

        let second = spawn(orch.clone(), request);
        wait_for_state(&orch, OrchestratorState::Downloading).await;

        // First download settles after the second one started
        assert!(first.await.unwrap().unwrap().cancelled);
        assert_eq!(orch.state(), OrchestratorState::Downloading);

        orch.cancel_download();
        assert!(second.await.unwrap().unwrap().cancelled);
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_noop() {
        let runner = Arc::new(FakeRunner::new(vec![], Exit::Success));
        let orch = orchestrator(FakeResolver::Ready, runner);
        assert!(!orch.cancel_download());
        assert_eq!(orch.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn test_later_observer_replaces_earlier() {
        let runner = Arc::new(FakeRunner::new(vec!["[download]  60.0%\n"], Exit::Success));
        let orch = orchestrator(FakeResolver::Ready, runner);
        let first = record_events(&orch);
        let second = record_events(&orch);
        let dir = tempfile::tempdir().unwrap();

        orch.start_download(DownloadRequest::new("https://youtu.be/abc", "best", dir.path()))
            .await
            .unwrap();

        assert!(first.lock().unwrap().is_empty());
        assert_eq!(second.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_initialize_emits_phase_and_marks_ready() {
        let runner = Arc::new(FakeRunner::new(vec![], Exit::Success));
        let orch = orchestrator(FakeResolver::Ready, runner);
        let events = record_events(&orch);

        assert!(!orch.is_ready());
        orch.initialize().await.unwrap();
        assert!(orch.is_ready());
        assert_eq!(*events.lock().unwrap(), vec![ProgressEvent::initializing()]);
        assert!(orch.check_dependencies().await.all);
    }
}

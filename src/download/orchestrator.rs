// Single-flight download pipeline: metadata, fetch, optional conversion, history

use super::directory::resolve_output_dir;
use super::filename::template_stem;
use super::format::{format_selector, needs_conversion, target_extension, transcode_args, VIDEO_CONTAINER};
use super::history::HistoryStore;
use super::progress::{EtaTracker, ProgressUpdate};
use super::{FetchJob, MediaFetcher, MediaTranscoder, TranscodeJob};
use crate::file_manager::StoreError;
use crate::models::{DownloadProgressSample, DownloadRequest, HistoryRecord, Settings};
use crate::process_manager::ToolError;
use log::{error, info, warn};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;

/// Samples buffered between the fetcher and the ETA forwarder
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("A download is already in progress")]
    AlreadyInProgress,
    #[error("Invalid download request: {0}")]
    InvalidRequest(String),
    #[error("Could not retrieve video information: {0}")]
    MetadataFetchFailed(#[source] ToolError),
    #[error("Download failed: {0}")]
    FetchFailed(#[source] ToolError),
    #[error("Conversion failed ({reason}); original kept at {}", .kept.display())]
    ConversionFailed { kept: PathBuf, reason: String },
    #[error("Downloaded to {} but history could not be saved: {source}", .record.file_path)]
    History {
        record: Box<HistoryRecord>,
        #[source]
        source: StoreError,
    },
}

/// Clears the in-flight flag on every exit path, including cancellation.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct DownloadOrchestrator {
    fetcher: Arc<dyn MediaFetcher>,
    transcoder: Option<Arc<dyn MediaTranscoder>>,
    settings: Arc<RwLock<Settings>>,
    history: Arc<Mutex<HistoryStore>>,
    in_flight: AtomicBool,
}

impl DownloadOrchestrator {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        transcoder: Option<Arc<dyn MediaTranscoder>>,
        settings: Arc<RwLock<Settings>>,
        history: Arc<Mutex<HistoryStore>>,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            settings,
            history,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Runs one download to completion and records it in the history.
    ///
    /// A second call while one is running fails with `AlreadyInProgress` and
    /// leaves the running one untouched. Progress updates are delivered with
    /// `try_send`, so a consumer that falls behind only misses updates.
    /// Dropping the returned future kills any running child process.
    pub async fn run(
        &self,
        request: DownloadRequest,
        progress: Option<mpsc::Sender<ProgressUpdate>>,
    ) -> Result<HistoryRecord, DownloadError> {
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or(DownloadError::AlreadyInProgress)?;

        validate_url(&request.url)?;
        let settings = self.settings.read().clone();

        let output_dir = resolve_output_dir(request.output_directory.as_deref(), &settings, request.kind);
        std::fs::create_dir_all(&output_dir).map_err(|e| {
            DownloadError::InvalidRequest(format!(
                "Cannot create output directory {}: {}",
                output_dir.display(),
                e
            ))
        })?;

        info!("Fetching metadata for {}", request.url);
        let metadata = self
            .fetcher
            .fetch_metadata(&request.url)
            .await
            .map_err(DownloadError::MetadataFetchFailed)?;

        let file_stem = template_stem(&metadata.title);
        let job = FetchJob {
            url: request.url.clone(),
            kind: request.kind,
            output_template: template_dir(&output_dir).join(format!("{}.%(ext)s", file_stem)),
            format_selector: format_selector(request.kind, request.quality),
            merge_container: request.is_video_mode().then_some(VIDEO_CONTAINER),
            want_thumbnail: request.want_thumbnail,
            want_subtitles: request.want_subtitles,
            subtitle_languages: settings.subtitle_languages.clone(),
        };

        let (sample_tx, sample_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let forwarder = progress.map(|progress| tokio::spawn(forward_progress(sample_rx, progress)));

        info!("Downloading \"{}\" to {}", metadata.title, output_dir.display());
        let fetched = self.fetcher.fetch(&job, sample_tx).await;
        if let Some(forwarder) = forwarder {
            if let Err(e) = forwarder.await {
                warn!("Progress forwarding stopped early: {}", e);
            }
        }

        let outcome = fetched.map_err(DownloadError::FetchFailed)?;
        let fetched_path = outcome.primary().cloned().ok_or_else(|| {
            DownloadError::FetchFailed(ToolError::InvalidOutput {
                tool: "yt-dlp",
                message: "no output file reported".into(),
            })
        })?;

        let target_ext = target_extension(request.kind, request.audio_format);
        let final_path = if needs_conversion(&fetched_path, target_ext) {
            self.convert(&request, &fetched_path, target_ext).await?
        } else {
            fetched_path
        };

        let record = HistoryRecord::new(
            metadata.title,
            request.url,
            final_path.to_string_lossy().to_string(),
            request.kind,
        );

        if let Err(source) = self.history.lock().insert(record.clone()) {
            error!("Failed to save download history: {}", source);
            return Err(DownloadError::History {
                record: Box::new(record),
                source,
            });
        }

        info!("Download complete: {}", record.file_path);
        Ok(record)
    }

    /// Converts `fetched` into `target_ext`. The fetched file is deleted only
    /// after a non-empty converted file exists.
    async fn convert(
        &self,
        request: &DownloadRequest,
        fetched: &Path,
        target_ext: &str,
    ) -> Result<PathBuf, DownloadError> {
        let transcoder = self.transcoder.as_ref().ok_or_else(|| DownloadError::ConversionFailed {
            kept: fetched.to_path_buf(),
            reason: "ffmpeg is not available".into(),
        })?;

        let job = TranscodeJob {
            input: fetched.to_path_buf(),
            output: fetched.with_extension(target_ext),
            args: transcode_args(request.kind, request.audio_format, request.audio_bitrate),
        };
        info!("Converting {} to {}", fetched.display(), target_ext);

        let result = transcoder.transcode(&job).await;
        if let Err(e) = result {
            discard_partial_output(&job.output);
            return Err(DownloadError::ConversionFailed {
                kept: fetched.to_path_buf(),
                reason: e.to_string(),
            });
        }

        if !is_non_empty_file(&job.output) {
            discard_partial_output(&job.output);
            return Err(DownloadError::ConversionFailed {
                kept: fetched.to_path_buf(),
                reason: "converted file is empty".into(),
            });
        }

        if let Err(e) = std::fs::remove_file(fetched) {
            warn!("Could not delete intermediate file {}: {}", fetched.display(), e);
        }
        Ok(job.output)
    }
}

/// Runs on its own task so ETA smoothing never slows the fetcher down.
async fn forward_progress(
    mut samples: mpsc::Receiver<DownloadProgressSample>,
    progress: mpsc::Sender<ProgressUpdate>,
) {
    let mut tracker = EtaTracker::new(Instant::now());
    while let Some(sample) = samples.recv().await {
        let _ = progress.try_send(tracker.observe(&sample));
    }
}

fn validate_url(url: &str) -> Result<(), DownloadError> {
    let parsed = url::Url::parse(url.trim())
        .map_err(|e| DownloadError::InvalidRequest(format!("Invalid URL \"{}\": {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(DownloadError::InvalidRequest(format!(
            "Unsupported URL scheme: {}",
            scheme
        ))),
    }
}

/// Output directory with `%` doubled for the fetcher's template syntax
fn template_dir(dir: &Path) -> PathBuf {
    match dir.to_str() {
        Some(text) if text.contains('%') => PathBuf::from(text.replace('%', "%%")),
        _ => dir.to_path_buf(),
    }
}

fn is_non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

fn discard_partial_output(path: &Path) {
    if path.exists() && !is_non_empty_file(path) {
        let _ = std::fs::remove_file(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{FetchOutcome, MediaMetadata};
    use crate::models::{AudioFormat, MediaKind, Quality};
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    struct FakeFetcher {
        metadata: Result<MediaMetadata, ()>,
        extension: &'static str,
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
        jobs: Mutex<Vec<FetchJob>>,
    }

    impl FakeFetcher {
        fn new(extension: &'static str) -> Self {
            Self {
                metadata: Ok(MediaMetadata {
                    title: "Artist: Song / Live?".into(),
                    thumbnail: Some("https://i.ytimg.com/x.jpg".into()),
                    duration: Some(215.0),
                }),
                extension,
                gate: None,
                jobs: Mutex::new(Vec::new()),
            }
        }

        fn failing_metadata() -> Self {
            Self {
                metadata: Err(()),
                ..Self::new("mp4")
            }
        }
    }

    #[async_trait]
    impl MediaFetcher for FakeFetcher {
        async fn fetch_metadata(&self, _url: &str) -> Result<MediaMetadata, ToolError> {
            if let Some((entered, release)) = &self.gate {
                entered.notify_one();
                release.notified().await;
            }
            self.metadata.clone().map_err(|_| ToolError::Exit {
                tool: "yt-dlp",
                code: 1,
                message: "Video unavailable".into(),
            })
        }

        async fn fetch(
            &self,
            job: &FetchJob,
            progress: mpsc::Sender<DownloadProgressSample>,
        ) -> Result<FetchOutcome, ToolError> {
            self.jobs.lock().push(job.clone());
            for fraction in [0.25, 0.5, 1.0] {
                let _ = progress.try_send(DownloadProgressSample::new(fraction, None));
            }

            let template = job.output_template.to_string_lossy().to_string();
            let path = PathBuf::from(template.replace("%(ext)s", self.extension).replace("%%", "%"));
            std::fs::write(&path, b"media bytes").unwrap();
            Ok(FetchOutcome { files: vec![path] })
        }
    }

    struct FakeTranscoder {
        succeed: bool,
    }

    #[async_trait]
    impl MediaTranscoder for FakeTranscoder {
        async fn transcode(&self, job: &TranscodeJob) -> Result<(), ToolError> {
            if self.succeed {
                std::fs::write(&job.output, b"converted").unwrap();
                Ok(())
            } else {
                std::fs::write(&job.output, b"").unwrap();
                Err(ToolError::Exit {
                    tool: "ffmpeg",
                    code: 1,
                    message: "Invalid data found when processing input".into(),
                })
            }
        }
    }

    struct Fixture {
        dir: TempDir,
        history: Arc<Mutex<HistoryStore>>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let history = Arc::new(Mutex::new(HistoryStore::open(dir.path().join("history.json"))));
            Self { dir, history }
        }

        fn orchestrator(
            &self,
            fetcher: Arc<dyn MediaFetcher>,
            transcoder: Option<Arc<dyn MediaTranscoder>>,
        ) -> DownloadOrchestrator {
            DownloadOrchestrator::new(
                fetcher,
                transcoder,
                Arc::new(RwLock::new(Settings::default())),
                Arc::clone(&self.history),
            )
        }

        fn request(&self, kind: MediaKind) -> DownloadRequest {
            let mut request = DownloadRequest::new("https://www.youtube.com/watch?v=abc", kind);
            request.output_directory = Some(self.dir.path().join("media"));
            request
        }
    }

    #[tokio::test]
    async fn test_video_download_records_history() {
        let fixture = Fixture::new();
        let fetcher = Arc::new(FakeFetcher::new("mp4"));
        let orchestrator = fixture.orchestrator(fetcher.clone(), None);
        let (tx, mut rx) = mpsc::channel(16);

        let mut request = fixture.request(MediaKind::Video);
        request.quality = Quality::MaxHeight(720);
        let record = orchestrator.run(request, Some(tx)).await.unwrap();

        assert_eq!(record.title, "Artist: Song / Live?");
        assert!(record.file_path.ends_with("Artist_ Song _ Live_.mp4"));
        assert_eq!(fixture.history.lock().records()[0], record);
        assert!(!orchestrator.is_busy());

        let job = fetcher.jobs.lock()[0].clone();
        assert_eq!(job.format_selector, "bestvideo[height<=720]+bestaudio/best[height<=720]");
        assert_eq!(job.merge_container, Some("mp4"));

        let mut last = None;
        while let Some(update) = rx.recv().await {
            last = Some(update);
        }
        assert_eq!(last.unwrap().fraction, 1.0);
    }

    #[tokio::test]
    async fn test_title_cannot_expand_template_fields() {
        let fixture = Fixture::new();
        let mut fetcher = FakeFetcher::new("mp4");
        if let Ok(metadata) = &mut fetcher.metadata {
            metadata.title = "100% %(id)s".into();
        }
        let fetcher = Arc::new(fetcher);
        let orchestrator = fixture.orchestrator(fetcher.clone(), None);

        let mut request = fixture.request(MediaKind::Video);
        request.output_directory = Some(fixture.dir.path().join("50%"));
        let record = orchestrator.run(request, None).await.unwrap();

        let template = fetcher.jobs.lock()[0].output_template.to_string_lossy().to_string();
        assert!(template.ends_with("100%% %%(id)s.%(ext)s"));
        assert!(template.contains("50%%"));
        assert!(record.file_path.ends_with("100% %(id)s.mp4"));
        assert!(Path::new(&record.file_path).is_file());
    }

    #[tokio::test]
    async fn test_second_run_rejected_while_in_flight() {
        let fixture = Fixture::new();
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let mut fetcher = FakeFetcher::new("mp4");
        fetcher.gate = Some((entered.clone(), release.clone()));

        let orchestrator = Arc::new(fixture.orchestrator(Arc::new(fetcher), None));
        let first = {
            let orchestrator = Arc::clone(&orchestrator);
            let request = fixture.request(MediaKind::Video);
            tokio::spawn(async move { orchestrator.run(request, None).await })
        };

        entered.notified().await;
        let second = orchestrator.run(fixture.request(MediaKind::Video), None).await;
        assert!(matches!(second, Err(DownloadError::AlreadyInProgress)));
        assert!(orchestrator.is_busy());

        release.notify_one();
        assert!(first.await.unwrap().is_ok());
        assert!(!orchestrator.is_busy());
        assert_eq!(fixture.history.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_metadata_failure_leaves_no_history() {
        let fixture = Fixture::new();
        let orchestrator = fixture.orchestrator(Arc::new(FakeFetcher::failing_metadata()), None);

        let result = orchestrator.run(fixture.request(MediaKind::Audio), None).await;
        assert!(matches!(result, Err(DownloadError::MetadataFetchFailed(_))));
        assert!(fixture.history.lock().is_empty());

        // The guard is released, so the next call is not rejected as busy
        let retry = orchestrator.run(fixture.request(MediaKind::Audio), None).await;
        assert!(matches!(retry, Err(DownloadError::MetadataFetchFailed(_))));
    }

    #[tokio::test]
    async fn test_conversion_replaces_intermediate() {
        let fixture = Fixture::new();
        let orchestrator = fixture.orchestrator(
            Arc::new(FakeFetcher::new("webm")),
            Some(Arc::new(FakeTranscoder { succeed: true })),
        );

        let mut request = fixture.request(MediaKind::Audio);
        request.audio_format = AudioFormat::Mp3;
        let record = orchestrator.run(request, None).await.unwrap();

        let converted = PathBuf::from(&record.file_path);
        assert_eq!(converted.extension().unwrap(), "mp3");
        assert!(converted.exists());
        assert!(!converted.with_extension("webm").exists());
    }

    #[tokio::test]
    async fn test_conversion_failure_keeps_original() {
        let fixture = Fixture::new();
        let orchestrator = fixture.orchestrator(
            Arc::new(FakeFetcher::new("webm")),
            Some(Arc::new(FakeTranscoder { succeed: false })),
        );

        let result = orchestrator.run(fixture.request(MediaKind::Audio), None).await;
        match result {
            Err(DownloadError::ConversionFailed { kept, .. }) => {
                assert!(kept.exists());
                assert!(!kept.with_extension("mp3").exists());
            }
            other => panic!("expected ConversionFailed, got {:?}", other),
        }
        assert!(fixture.history.lock().is_empty());
    }

    #[tokio::test]
    async fn test_native_format_skips_transcoder() {
        let fixture = Fixture::new();
        let orchestrator = fixture.orchestrator(Arc::new(FakeFetcher::new("m4a")), None);

        let mut request = fixture.request(MediaKind::Audio);
        request.audio_format = AudioFormat::M4a;
        let record = orchestrator.run(request, None).await.unwrap();
        assert!(record.file_path.ends_with(".m4a"));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let fixture = Fixture::new();
        let orchestrator = fixture.orchestrator(Arc::new(FakeFetcher::new("mp4")), None);

        let mut request = fixture.request(MediaKind::Video);
        request.url = "not a url".into();
        let result = orchestrator.run(request, None).await;
        assert!(matches!(result, Err(DownloadError::InvalidRequest(_))));
        assert!(!orchestrator.is_busy());
    }
}

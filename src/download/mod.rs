//! Download orchestration: metadata lookup, fetch with progress, optional
//! conversion, history bookkeeping.

pub mod directory;
pub mod filename;
pub mod format;
pub mod history;
pub mod orchestrator;
pub mod progress;

pub use directory::{resolve_output_dir, validate_download_path, DownloadPathValidation};
pub use filename::sanitize_file_name;
pub use history::HistoryStore;
pub use orchestrator::{DownloadError, DownloadOrchestrator};
pub use progress::{EtaTracker, ProgressUpdate};

use crate::models::{DownloadProgressSample, MediaKind};
use crate::process_manager::ToolError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// What the fetcher reports about a URL before downloading.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaMetadata {
    pub title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchJob {
    pub url: String,
    pub kind: MediaKind,
    /// Output path template, e.g. `<dir>/<title>.%(ext)s`
    pub output_template: PathBuf,
    pub format_selector: String,
    /// Container to merge separate video/audio streams into
    pub merge_container: Option<&'static str>,
    pub want_thumbnail: bool,
    pub want_subtitles: bool,
    pub subtitle_languages: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    /// Final paths reported by the fetcher, in the order it finished them
    pub files: Vec<PathBuf>,
}

impl FetchOutcome {
    pub fn primary(&self) -> Option<&PathBuf> {
        self.files.last()
    }
}

/// The external fetcher collaborator.
///
/// Implementations push samples with `try_send` so a slow consumer can never
/// stall the transfer, and drop the sender when the transfer ends.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch_metadata(&self, url: &str) -> Result<MediaMetadata, ToolError>;

    async fn fetch(
        &self,
        job: &FetchJob,
        progress: mpsc::Sender<DownloadProgressSample>,
    ) -> Result<FetchOutcome, ToolError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Codec arguments placed between input and output
    pub args: Vec<String>,
}

/// The external transcoder collaborator. Success means a non-empty output
/// file exists; the exit code alone is not trusted.
#[async_trait]
pub trait MediaTranscoder: Send + Sync {
    async fn transcode(&self, job: &TranscodeJob) -> Result<(), ToolError>;
}

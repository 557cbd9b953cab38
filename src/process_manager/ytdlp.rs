// yt-dlp fetcher process
// Streams progress lines into a channel while the transfer runs

use super::{hidden_command, last_line, read_lossy_line, ToolError};
use crate::download::progress::{parse_progress_line, PROGRESS_MARKER};
use crate::download::{FetchJob, FetchOutcome, MediaFetcher, MediaMetadata};
use crate::models::DownloadProgressSample;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};

const TOOL: &str = "yt-dlp";
const OUTPUT_MARKER: &str = "TF_OUTPUT|";
const METADATA_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_OUTPUT_CANDIDATES: usize = 32;

pub struct YtDlp {
    binary: PathBuf,
    ffmpeg_location: Option<PathBuf>,
    metadata_timeout: Duration,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ffmpeg_location: None,
            metadata_timeout: METADATA_TIMEOUT,
        }
    }

    /// Directory holding ffmpeg, passed through for stream merging
    pub fn with_ffmpeg_location(mut self, ffmpeg_binary: Option<&Path>) -> Self {
        self.ffmpeg_location = ffmpeg_binary.and_then(Path::parent).map(Path::to_path_buf);
        self
    }

    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = hidden_command(&self.binary);
        cmd.env("PYTHONIOENCODING", "UTF-8").env("PYTHONUTF8", "1");
        cmd
    }

    async fn query_metadata(&self, url: &str) -> Result<MediaMetadata, ToolError> {
        let output = self
            .command()
            .args(["--dump-single-json", "--no-playlist", "--skip-download", "--no-warnings"])
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ToolError::Spawn { tool: TOOL, source })?;

        if !output.status.success() {
            return Err(ToolError::Exit {
                tool: TOOL,
                code: output.status.code().unwrap_or(-1),
                message: last_line(&output.stderr).unwrap_or_else(|| "unknown error".into()),
            });
        }

        serde_json::from_slice::<MediaMetadata>(&output.stdout).map_err(|e| {
            ToolError::InvalidOutput {
                tool: TOOL,
                message: format!("metadata is not valid JSON: {}", e),
            }
        })
    }
}

/// Command-line arguments for a transfer, without the binary itself.
pub fn build_fetch_args(job: &FetchJob, ffmpeg_location: Option<&Path>) -> Vec<String> {
    let mut args: Vec<String> = [
        "--no-playlist",
        "--newline",
        "--progress",
        "--no-warnings",
        "--no-part",
        "--force-overwrites",
        "--progress-template",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.push(format!(
        "download:{}%(progress._percent_str)s|%(progress._speed_str)s",
        PROGRESS_MARKER
    ));
    args.push("--print".into());
    args.push(format!("after_move:{}%(filepath)s", OUTPUT_MARKER));
    args.push("-f".into());
    args.push(job.format_selector.clone());

    if let Some(container) = job.merge_container {
        args.push("--merge-output-format".into());
        args.push(container.into());
    }
    if job.want_thumbnail {
        args.extend(["--write-thumbnail", "--convert-thumbnails", "jpg"].map(String::from));
    }
    if job.want_subtitles {
        args.push("--write-subs".into());
        args.push("--sub-langs".into());
        args.push(job.subtitle_languages.clone());
    }
    if let Some(location) = ffmpeg_location {
        args.push("--ffmpeg-location".into());
        args.push(location.to_string_lossy().to_string());
    }

    args.push("-o".into());
    args.push(job.output_template.to_string_lossy().to_string());
    args.push("--".into());
    args.push(job.url.clone());
    args
}

fn forward_progress(line: &str, progress: &mpsc::Sender<DownloadProgressSample>) {
    if let Some(sample) = parse_progress_line(line) {
        // A full queue drops the sample; the transfer never waits on the consumer
        let _ = progress.try_send(sample);
    }
}

#[async_trait]
impl MediaFetcher for YtDlp {
    async fn fetch_metadata(&self, url: &str) -> Result<MediaMetadata, ToolError> {
        match tokio::time::timeout(self.metadata_timeout, self.query_metadata(url)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Metadata query for {} timed out", url);
                Err(ToolError::Timeout {
                    tool: TOOL,
                    secs: self.metadata_timeout.as_secs(),
                })
            }
        }
    }

    async fn fetch(
        &self,
        job: &FetchJob,
        progress: mpsc::Sender<DownloadProgressSample>,
    ) -> Result<FetchOutcome, ToolError> {
        let args = build_fetch_args(job, self.ffmpeg_location.as_deref());
        debug!("Spawning {} {:?}", TOOL, args);

        let mut child = self
            .command()
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ToolError::Spawn { tool: TOOL, source })?;

        let stdout = child.stdout.take().ok_or(ToolError::InvalidOutput {
            tool: TOOL,
            message: "stdout not captured".into(),
        })?;
        let stderr = child.stderr.take().ok_or(ToolError::InvalidOutput {
            tool: TOOL,
            message: "stderr not captured".into(),
        })?;

        // Some builds print progress to stderr, others to stdout
        let stderr_tail = Arc::new(Mutex::new(None::<String>));
        let stderr_task = {
            let tail = Arc::clone(&stderr_tail);
            let progress = progress.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut buffer = Vec::new();
                while let Ok(Some(line)) = read_lossy_line(&mut reader, &mut buffer).await {
                    forward_progress(&line, &progress);
                    if !line.trim().is_empty() {
                        *tail.lock().await = Some(line.trim().to_string());
                    }
                }
            })
        };

        let mut files: Vec<PathBuf> = Vec::new();
        let mut last_stdout_line = None;
        let mut reader = BufReader::new(stdout);
        let mut buffer = Vec::new();
        loop {
            let line = match read_lossy_line(&mut reader, &mut buffer).await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(source) => return Err(ToolError::Io { tool: TOOL, source }),
            };

            if let Some(path) = line.strip_prefix(OUTPUT_MARKER) {
                let path = path.trim();
                if !path.is_empty() {
                    if files.len() >= MAX_OUTPUT_CANDIDATES {
                        files.remove(0);
                    }
                    files.push(PathBuf::from(path));
                }
                continue;
            }

            forward_progress(&line, &progress);
            if !line.trim().is_empty() {
                last_stdout_line = Some(line.trim().to_string());
            }
        }
        drop(progress);

        let status = child
            .wait()
            .await
            .map_err(|source| ToolError::Io { tool: TOOL, source })?;
        let _ = stderr_task.await;

        if !status.success() {
            let message = stderr_tail
                .lock()
                .await
                .take()
                .or(last_stdout_line)
                .unwrap_or_else(|| "yt-dlp failed".into());
            return Err(ToolError::Exit {
                tool: TOOL,
                code: status.code().unwrap_or(-1),
                message,
            });
        }

        // Relative paths are relative to the template's directory
        let base_dir = job.output_template.parent().map(Path::to_path_buf);
        let files: Vec<PathBuf> = files
            .into_iter()
            .map(|path| match (&base_dir, path.is_relative()) {
                (Some(dir), true) => dir.join(path),
                _ => path,
            })
            .filter(|path| path.is_file())
            .collect();

        if files.is_empty() {
            return Err(ToolError::InvalidOutput {
                tool: TOOL,
                message: "no output file reported".into(),
            });
        }

        info!("{} finished: {:?}", TOOL, files.last());
        Ok(FetchOutcome { files })
    }
}

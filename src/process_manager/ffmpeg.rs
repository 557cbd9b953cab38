// ffmpeg transcoder process

use super::{hidden_command, last_line, ToolError};
use crate::download::{MediaTranscoder, TranscodeJob};
use async_trait::async_trait;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::process::Stdio;

const TOOL: &str = "ffmpeg";

pub struct Ffmpeg {
    binary: PathBuf,
}

impl Ffmpeg {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

pub fn build_transcode_args(job: &TranscodeJob) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-y", "-i"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(job.input.to_string_lossy().to_string());
    args.extend(job.args.iter().cloned());
    args.push(job.output.to_string_lossy().to_string());
    args
}

fn output_is_usable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

#[async_trait]
impl MediaTranscoder for Ffmpeg {
    async fn transcode(&self, job: &TranscodeJob) -> Result<(), ToolError> {
        let args = build_transcode_args(job);
        debug!("Spawning {} {:?}", TOOL, args);

        let output = hidden_command(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ToolError::Spawn { tool: TOOL, source })?;

        // ffmpeg sometimes exits nonzero after writing a complete file
        if output_is_usable(&job.output) {
            if !output.status.success() {
                warn!(
                    "{} exited with {:?} but produced {}",
                    TOOL,
                    output.status.code(),
                    job.output.display()
                );
            }
            return Ok(());
        }

        Err(ToolError::Exit {
            tool: TOOL,
            code: output.status.code().unwrap_or(-1),
            message: last_line(&output.stderr).unwrap_or_else(|| "no output produced".into()),
        })
    }
}

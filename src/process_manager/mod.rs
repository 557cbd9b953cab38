// External process management
// Spawning and monitoring the fetcher (yt-dlp) and transcoder (ffmpeg)

pub mod ffmpeg;
pub mod install;
pub mod ytdlp;

pub use ffmpeg::Ffmpeg;
pub use install::{
    install_managed_fetcher, install_managed_transcoder, locate_tool, FETCHER_NAME, TRANSCODER_NAME,
};
pub use ytdlp::YtDlp;

use std::ffi::OsStr;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::process::Command;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} is not installed")]
    NotFound { tool: &'static str },
    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("I/O error while running {tool}: {source}")]
    Io {
        tool: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{tool} exited with code {code}: {message}")]
    Exit {
        tool: &'static str,
        code: i32,
        message: String,
    },
    #[error("{tool} did not finish within {secs}s")]
    Timeout { tool: &'static str, secs: u64 },
    #[error("Unexpected output from {tool}: {message}")]
    InvalidOutput { tool: &'static str, message: String },
    #[error("Failed to download {tool}: {message}")]
    Install { tool: &'static str, message: String },
}

/// Command that never opens a console window and dies with its handle.
pub fn hidden_command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    cmd.kill_on_drop(true);

    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    cmd
}

/// Reads one line, replacing invalid UTF-8 instead of failing on it.
pub async fn read_lossy_line<R>(reader: &mut R, buffer: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buffer.clear();
    let read = reader.read_until(b'\n', buffer).await?;
    if read == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buffer);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Last non-empty line of captured process output
pub fn last_line(output: &[u8]) -> Option<String> {
    String::from_utf8_lossy(output)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(String::from)
}

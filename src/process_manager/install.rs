// Tool discovery and the managed yt-dlp and ffmpeg downloads

use super::ToolError;
use log::{info, warn};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zip::ZipArchive;

pub const FETCHER_NAME: &str = "yt-dlp";
pub const TRANSCODER_NAME: &str = "ffmpeg";

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const ARCHIVE_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(900);

fn fetcher_download_url() -> &'static str {
    if cfg!(target_os = "windows") {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp.exe"
    } else if cfg!(target_os = "macos") {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_macos"
    } else {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_linux"
    }
}

/// Zip archive carrying a static ffmpeg build, where one is published.
fn transcoder_archive_url() -> Option<&'static str> {
    if cfg!(target_os = "windows") {
        Some("https://github.com/BtbN/FFmpeg-Builds/releases/download/latest/ffmpeg-master-latest-win64-gpl.zip")
    } else if cfg!(target_os = "macos") {
        Some("https://evermeet.cx/ffmpeg/getrelease/zip")
    } else {
        None
    }
}

/// File name of a tool binary on this platform
pub fn executable_name(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

/// Finds a tool binary. An explicit path from settings wins, then the copy in
/// the managed tools directory, then whatever is on PATH.
pub fn locate_tool(explicit: Option<&str>, managed_dir: &Path, name: &str) -> Option<PathBuf> {
    if let Some(explicit) = explicit.map(str::trim).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(explicit);
        if path.is_file() {
            return Some(path);
        }
        warn!("Configured {} path does not exist: {}", name, explicit);
    }

    let managed = managed_dir.join(executable_name(name));
    if managed.is_file() {
        return Some(managed);
    }

    which::which(name).ok()
}

/// Streams `url` into `target`. An empty or interrupted download leaves
/// nothing behind.
fn download_file(tool: &'static str, url: &str, target: &Path, timeout: Duration) -> Result<u64, ToolError> {
    let install_error = |message: String| ToolError::Install { tool, message };
    info!("Downloading {} from {}", tool, url);

    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(10))
        .timeout(timeout)
        .build();
    let response = agent
        .get(url)
        .call()
        .map_err(|e| install_error(format!("Request failed: {}", e)))?;

    let written = {
        let mut file = File::create(target)
            .map_err(|e| install_error(format!("Failed to create {}: {}", target.display(), e)))?;
        io::copy(&mut response.into_reader(), &mut file)
    };
    let message = match written {
        Ok(0) => "Downloaded file is empty".to_string(),
        Ok(bytes) => {
            info!("Downloaded {} bytes", bytes);
            return Ok(bytes);
        }
        Err(e) => format!("Download interrupted: {}", e),
    };
    let _ = fs::remove_file(target);
    Err(install_error(message))
}

/// Marks `temp_path` executable and moves it into place.
fn finish_install(tool: &'static str, temp_path: &Path, target_path: &Path) -> Result<(), ToolError> {
    let install_error = |message: String| ToolError::Install { tool, message };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp_path, fs::Permissions::from_mode(0o755))
            .map_err(|e| install_error(format!("Failed to set permissions: {}", e)))?;
    }

    fs::rename(temp_path, target_path)
        .map_err(|e| install_error(format!("Failed to complete installation: {}", e)))?;
    info!("{} installed at {}", tool, target_path.display());
    Ok(())
}

/// Downloads the standalone yt-dlp build into `tools_dir` and returns its path.
pub fn install_managed_fetcher(tools_dir: &Path) -> Result<PathBuf, ToolError> {
    fs::create_dir_all(tools_dir).map_err(|e| ToolError::Install {
        tool: FETCHER_NAME,
        message: format!("Failed to create tools directory: {}", e),
    })?;

    let target_path = tools_dir.join(executable_name(FETCHER_NAME));
    let temp_path = target_path.with_extension("tmp");
    download_file(FETCHER_NAME, fetcher_download_url(), &temp_path, DOWNLOAD_TIMEOUT)?;
    finish_install(FETCHER_NAME, &temp_path, &target_path)?;
    Ok(target_path)
}

/// Copies the first file entry named `binary_name` (in any folder) out of a
/// zip archive.
pub fn extract_binary_from_zip(archive_path: &Path, binary_name: &str, out_path: &Path) -> Result<(), String> {
    let file = File::open(archive_path).map_err(|e| format!("Failed to open archive: {}", e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| format!("Failed to read archive: {}", e))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| format!("Failed to read archive entry: {}", e))?;
        if !entry.is_file() {
            continue;
        }

        let normalized = entry.name().replace('\\', "/");
        let file_name = normalized.rsplit('/').next().unwrap_or_default();
        if !file_name.eq_ignore_ascii_case(binary_name) {
            continue;
        }

        let mut output =
            File::create(out_path).map_err(|e| format!("Failed to create {}: {}", out_path.display(), e))?;
        io::copy(&mut entry, &mut output).map_err(|e| format!("Failed to extract {}: {}", binary_name, e))?;
        return Ok(());
    }

    Err(format!("{} was not found in the archive", binary_name))
}

/// Downloads a static ffmpeg build into `tools_dir` and returns its path.
pub fn install_managed_transcoder(tools_dir: &Path) -> Result<PathBuf, ToolError> {
    let install_error = |message: String| ToolError::Install {
        tool: TRANSCODER_NAME,
        message,
    };
    let url = transcoder_archive_url()
        .ok_or_else(|| install_error("No managed build for this platform; install ffmpeg with your package manager".into()))?;

    fs::create_dir_all(tools_dir)
        .map_err(|e| install_error(format!("Failed to create tools directory: {}", e)))?;

    let binary_name = executable_name(TRANSCODER_NAME);
    let target_path = tools_dir.join(&binary_name);
    let temp_path = target_path.with_extension("tmp");
    let archive_path = tools_dir.join("ffmpeg-package.tmp.zip");

    download_file(TRANSCODER_NAME, url, &archive_path, ARCHIVE_DOWNLOAD_TIMEOUT)?;
    let extracted = extract_binary_from_zip(&archive_path, &binary_name, &temp_path);
    let _ = fs::remove_file(&archive_path);
    if let Err(message) = extracted {
        let _ = fs::remove_file(&temp_path);
        return Err(install_error(message));
    }

    finish_install(TRANSCODER_NAME, &temp_path, &target_path)?;
    Ok(target_path)
}

// Output directory resolution for downloads

use crate::models::{MediaKind, Settings};
use crate::utils::get_fallback_media_dir;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Maps special folder names such as "Downloads" or "Music" to their OS paths
pub fn resolve_special_folder(name: &str) -> Option<PathBuf> {
    match name.trim().to_lowercase().as_str() {
        "downloads" | "download" => dirs::download_dir(),
        "desktop" => dirs::desktop_dir(),
        "documents" | "document" => dirs::document_dir(),
        "videos" | "video" => dirs::video_dir(),
        "music" => dirs::audio_dir(),
        _ => None,
    }
}

fn downloads_base() -> PathBuf {
    get_fallback_media_dir()
}

/// Resolves a configured directory value. Special folder names map to their
/// OS paths, absolute paths are used as-is and relative paths land inside the
/// Downloads folder. Blank values resolve to nothing.
pub fn resolve_configured_dir(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(special) = resolve_special_folder(value) {
        return Some(special);
    }

    let path = PathBuf::from(value);
    if path.is_absolute() {
        Some(path)
    } else {
        Some(downloads_base().join(path))
    }
}

/// OS media folder for a kind of download
pub fn default_media_dir(kind: MediaKind) -> PathBuf {
    let os_dir = match kind {
        MediaKind::Video => dirs::video_dir(),
        MediaKind::Audio => dirs::audio_dir(),
    };
    os_dir.unwrap_or_else(downloads_base)
}

/// Explicit request directory, then the per-kind setting, then the OS folder.
pub fn resolve_output_dir(explicit: Option<&Path>, settings: &Settings, kind: MediaKind) -> PathBuf {
    if let Some(dir) = explicit.filter(|dir| !dir.as_os_str().is_empty()) {
        return dir.to_path_buf();
    }

    let configured = match kind {
        MediaKind::Video => &settings.default_video_download_path,
        MediaKind::Audio => &settings.default_audio_download_path,
    };
    resolve_configured_dir(configured).unwrap_or_else(|| default_media_dir(kind))
}

/// Result of validating a download path
#[derive(Debug, Clone, Serialize)]
pub struct DownloadPathValidation {
    pub valid: bool,
    pub resolved_path: String,
    pub exists: bool,
    pub is_special_folder: bool,
    pub message: String,
}

/// Checks a directory value without saving it
pub fn validate_download_path(path: &str, kind: MediaKind) -> DownloadPathValidation {
    let input = path.trim();

    if input.is_empty() {
        let default_path = default_media_dir(kind);
        return DownloadPathValidation {
            valid: true,
            resolved_path: default_path.to_string_lossy().to_string(),
            exists: default_path.exists(),
            is_special_folder: true,
            message: format!("Will use the default {} folder", kind),
        };
    }

    if let Some(special) = resolve_special_folder(input) {
        return DownloadPathValidation {
            valid: true,
            resolved_path: special.to_string_lossy().to_string(),
            exists: special.exists(),
            is_special_folder: true,
            message: format!("Recognized as the {} folder", input),
        };
    }

    let path_buf = PathBuf::from(input);
    if path_buf.is_absolute() {
        let resolved_path = path_buf.to_string_lossy().to_string();
        let parent_exists = path_buf.parent().map(Path::exists).unwrap_or(false);

        let (valid, exists, message) = if path_buf.is_dir() {
            (true, true, "Path exists and is ready to use")
        } else if path_buf.exists() {
            (false, true, "Path exists but is a file, not a directory")
        } else if parent_exists {
            (true, false, "Folder will be created when downloading")
        } else {
            (false, false, "Parent directory does not exist")
        };

        return DownloadPathValidation {
            valid,
            resolved_path,
            exists,
            is_special_folder: false,
            message: message.to_string(),
        };
    }

    let resolved = downloads_base().join(input);
    DownloadPathValidation {
        valid: true,
        resolved_path: resolved.to_string_lossy().to_string(),
        exists: resolved.exists(),
        is_special_folder: false,
        message: format!(
            "Will create \"{}\" folder inside Downloads{}",
            input,
            if resolved.exists() { " (already exists)" } else { "" }
        ),
    }
}

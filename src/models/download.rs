// Download data models
use super::Settings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Aac,
    M4a,
    Flac,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Aac => "aac",
            AudioFormat::M4a => "m4a",
            AudioFormat::Flac => "flac",
        }
    }

    /// Whether a bitrate setting means anything for this format
    pub fn is_lossy(&self) -> bool {
        matches!(self, AudioFormat::Mp3 | AudioFormat::Aac | AudioFormat::M4a)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "wav" => Ok(AudioFormat::Wav),
            "aac" => Ok(AudioFormat::Aac),
            "m4a" => Ok(AudioFormat::M4a),
            "flac" => Ok(AudioFormat::Flac),
            other => Err(format!("Unsupported audio format: {}", other)),
        }
    }
}

/// Quality selector: "best" or a maximum video height such as "1080p".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    #[default]
    Best,
    MaxHeight(u32),
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Best => write!(f, "best"),
            Quality::MaxHeight(height) => write!(f, "{}p", height),
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        if normalized.is_empty() || normalized == "best" {
            return Ok(Quality::Best);
        }

        let digits = normalized.strip_suffix('p').unwrap_or(&normalized);
        match digits.parse::<u32>() {
            Ok(height) if height > 0 => Ok(Quality::MaxHeight(height)),
            _ => Err(format!("Unrecognized quality: {}", s.trim())),
        }
    }
}

/// One download invocation, built fresh from caller state and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    pub kind: MediaKind,
    /// Explicit target directory; falls back to settings, then the OS media folder
    pub output_directory: Option<PathBuf>,
    pub quality: Quality,
    pub audio_format: AudioFormat,
    pub audio_bitrate: u32,
    pub want_thumbnail: bool,
    pub want_subtitles: bool,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            url: url.into(),
            kind,
            output_directory: None,
            quality: Quality::Best,
            audio_format: AudioFormat::Mp3,
            audio_bitrate: 192,
            want_thumbnail: false,
            want_subtitles: false,
        }
    }

    /// Request prefilled from the user's saved preferences
    pub fn from_settings(url: impl Into<String>, kind: MediaKind, settings: &Settings) -> Self {
        let mut request = Self::new(url, kind);
        request.quality = settings.default_quality.parse().unwrap_or_default();
        request.audio_format = settings.default_audio_format;
        request.audio_bitrate = settings.default_audio_bitrate;
        request.want_thumbnail = settings.download_thumbnails;
        request.want_subtitles = settings.download_subtitles;
        request
    }

    pub fn is_video_mode(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

/// A raw progress reading pushed by the fetcher process.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgressSample {
    /// 0.0 ..= 1.0, not guaranteed monotonic
    pub fraction: f64,
    /// Speed text exactly as the fetcher printed it
    pub speed: Option<String>,
    pub at: Instant,
}

impl DownloadProgressSample {
    pub fn new(fraction: f64, speed: Option<String>) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            speed,
            at: Instant::now(),
        }
    }
}

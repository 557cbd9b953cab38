// Settings data model
use super::AudioFormat;
use serde::{Deserialize, Serialize};

/// User preferences, rewritten wholesale on every change.
///
/// Absent fields fall back to their defaults and unknown fields are ignored,
/// so settings files written by older or newer builds still load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub default_video_download_path: String,
    pub default_audio_download_path: String,
    pub default_quality: String,
    pub default_audio_format: AudioFormat,
    /// kbps, lossy formats only
    pub default_audio_bitrate: u32,
    pub download_thumbnails: bool,
    pub download_subtitles: bool,
    pub subtitle_languages: String,
    pub auto_update_dependencies: bool,
    pub check_updates_on_startup: bool,
    pub update_feed_url: Option<String>,
    pub fetcher_path: Option<String>,
    pub transcoder_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_video_download_path: String::new(),
            default_audio_download_path: String::new(),
            default_quality: String::from("best"),
            default_audio_format: AudioFormat::Mp3,
            default_audio_bitrate: 192,
            download_thumbnails: false,
            download_subtitles: false,
            subtitle_languages: String::from("en"),
            auto_update_dependencies: true,
            check_updates_on_startup: true,
            update_feed_url: None,
            fetcher_path: None,
            transcoder_path: None,
        }
    }
}

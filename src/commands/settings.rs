// Settings command handlers
use crate::download::validate_download_path;
use crate::models::{AudioFormat, MediaKind, Quality, Settings};
use crate::AppState;
use log::debug;
use serde::Deserialize;

/// Partial settings update; only provided fields change.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsParams {
    pub default_video_download_path: Option<String>,
    pub default_audio_download_path: Option<String>,
    pub default_quality: Option<String>,
    pub default_audio_format: Option<AudioFormat>,
    pub default_audio_bitrate: Option<u32>,
    pub download_thumbnails: Option<bool>,
    pub download_subtitles: Option<bool>,
    pub subtitle_languages: Option<String>,
    pub auto_update_dependencies: Option<bool>,
    pub check_updates_on_startup: Option<bool>,
    pub update_feed_url: Option<String>,
    pub fetcher_path: Option<String>,
    pub transcoder_path: Option<String>,
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(format!("{} expects true or false, got \"{}\"", key, value)),
    }
}

fn empty_to_none(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

impl UpdateSettingsParams {
    /// Rejects download directories that can never be used.
    fn validate(&self) -> Result<(), String> {
        let paths = [
            (&self.default_video_download_path, MediaKind::Video),
            (&self.default_audio_download_path, MediaKind::Audio),
        ];
        for (path, kind) in paths {
            let Some(path) = path else { continue };
            let validation = validate_download_path(path, kind);
            if !validation.valid {
                return Err(format!(
                    "Invalid {} download path {}: {}",
                    kind, validation.resolved_path, validation.message
                ));
            }
            debug!("{} download path resolves to {}", kind, validation.resolved_path);
        }
        Ok(())
    }

    /// Single `key = value` update as typed on the command line
    pub fn from_key_value(key: &str, value: &str) -> Result<Self, String> {
        let mut params = Self::default();
        let owned = value.to_string();

        match key {
            "default_video_download_path" => params.default_video_download_path = Some(owned),
            "default_audio_download_path" => params.default_audio_download_path = Some(owned),
            "default_quality" => {
                let quality: Quality = value.parse()?;
                params.default_quality = Some(quality.to_string());
            }
            "default_audio_format" => params.default_audio_format = Some(value.parse()?),
            "default_audio_bitrate" => {
                let bitrate = value
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| format!("default_audio_bitrate expects kbps, got \"{}\"", value))?;
                params.default_audio_bitrate = Some(bitrate);
            }
            "download_thumbnails" => params.download_thumbnails = Some(parse_bool(key, value)?),
            "download_subtitles" => params.download_subtitles = Some(parse_bool(key, value)?),
            "subtitle_languages" => params.subtitle_languages = Some(owned),
            "auto_update_dependencies" => {
                params.auto_update_dependencies = Some(parse_bool(key, value)?)
            }
            "check_updates_on_startup" => {
                params.check_updates_on_startup = Some(parse_bool(key, value)?)
            }
            "update_feed_url" => params.update_feed_url = Some(owned),
            "fetcher_path" => params.fetcher_path = Some(owned),
            "transcoder_path" => params.transcoder_path = Some(owned),
            other => return Err(format!("Unknown setting: {}", other)),
        }

        Ok(params)
    }

    fn apply(self, current: &mut Settings) {
        if let Some(path) = self.default_video_download_path {
            current.default_video_download_path = path;
        }
        if let Some(path) = self.default_audio_download_path {
            current.default_audio_download_path = path;
        }
        if let Some(quality) = self.default_quality {
            current.default_quality = quality;
        }
        if let Some(format) = self.default_audio_format {
            current.default_audio_format = format;
        }
        if let Some(bitrate) = self.default_audio_bitrate {
            current.default_audio_bitrate = bitrate;
        }
        if let Some(enabled) = self.download_thumbnails {
            current.download_thumbnails = enabled;
        }
        if let Some(enabled) = self.download_subtitles {
            current.download_subtitles = enabled;
        }
        if let Some(languages) = self.subtitle_languages {
            current.subtitle_languages = languages;
        }
        if let Some(enabled) = self.auto_update_dependencies {
            current.auto_update_dependencies = enabled;
        }
        if let Some(enabled) = self.check_updates_on_startup {
            current.check_updates_on_startup = enabled;
        }
        if let Some(url) = self.update_feed_url {
            current.update_feed_url = empty_to_none(url);
        }
        if let Some(path) = self.fetcher_path {
            current.fetcher_path = empty_to_none(path);
        }
        if let Some(path) = self.transcoder_path {
            current.transcoder_path = empty_to_none(path);
        }
    }
}

pub fn get_settings(state: &AppState) -> Settings {
    state.settings.read().clone()
}

/// Applies a partial update and persists the whole record
pub fn update_settings(state: &AppState, params: UpdateSettingsParams) -> Result<Settings, String> {
    params.validate()?;
    let mut updated = state.settings.read().clone();
    params.apply(&mut updated);

    state
        .settings_store
        .save(&updated)
        .map_err(|e| format!("Failed to save settings: {}", e))?;
    *state.settings.write() = updated.clone();

    debug!("Updated settings: {:?}", updated);
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let dir = TempDir::new().unwrap();
        let state = AppState::open(dir.path());

        let params = UpdateSettingsParams {
            default_audio_bitrate: Some(320),
            ..Default::default()
        };
        let updated = update_settings(&state, params).unwrap();

        assert_eq!(updated.default_audio_bitrate, 320);
        assert_eq!(updated.default_quality, "best");

        let reloaded = AppState::open(dir.path());
        assert_eq!(get_settings(&reloaded).default_audio_bitrate, 320);
    }

    #[test]
    fn test_key_value_parsing() {
        let params = UpdateSettingsParams::from_key_value("default_quality", "1080").unwrap();
        assert_eq!(params.default_quality.as_deref(), Some("1080p"));

        let params = UpdateSettingsParams::from_key_value("download_subtitles", "yes").unwrap();
        assert_eq!(params.download_subtitles, Some(true));

        assert!(UpdateSettingsParams::from_key_value("default_audio_format", "ogg").is_err());
        assert!(UpdateSettingsParams::from_key_value("sidebar_order", "x").is_err());
    }

    #[test]
    fn test_unusable_download_path_is_not_saved() {
        let dir = TempDir::new().unwrap();
        let state = AppState::open(dir.path());
        let file = dir.path().join("not-a-folder.txt");
        std::fs::write(&file, b"x").unwrap();

        let params = UpdateSettingsParams::from_key_value(
            "default_video_download_path",
            &file.to_string_lossy(),
        )
        .unwrap();
        let err = update_settings(&state, params).unwrap_err();
        assert!(err.contains("not a directory"));
        assert_eq!(get_settings(&state).default_video_download_path, "");

        let folder = dir.path().join("clips");
        let params = UpdateSettingsParams::from_key_value(
            "default_audio_download_path",
            &folder.to_string_lossy(),
        )
        .unwrap();
        let updated = update_settings(&state, params).unwrap();
        assert_eq!(updated.default_audio_download_path, folder.to_string_lossy());
    }

    #[test]
    fn test_blank_optional_path_clears_it() {
        let mut settings = Settings {
            fetcher_path: Some("/opt/yt-dlp".into()),
            ..Default::default()
        };
        UpdateSettingsParams::from_key_value("fetcher_path", "")
            .unwrap()
            .apply(&mut settings);
        assert_eq!(settings.fetcher_path, None);
    }
}

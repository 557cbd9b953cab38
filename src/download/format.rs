//! Format selection for the fetcher and conversion planning for the transcoder.

use crate::models::{AudioFormat, MediaKind, Quality};
use std::path::Path;

pub const VIDEO_CONTAINER: &str = "mp4";

/// yt-dlp `-f` selector for the requested kind and quality.
pub fn format_selector(kind: MediaKind, quality: Quality) -> String {
    match (kind, quality) {
        (MediaKind::Audio, _) => "bestaudio/best".to_string(),
        (MediaKind::Video, Quality::Best) => "bestvideo+bestaudio/best".to_string(),
        (MediaKind::Video, Quality::MaxHeight(height)) => format!(
            "bestvideo[height<={h}]+bestaudio/best[height<={h}]",
            h = height
        ),
    }
}

/// Container the finished file must end up in.
pub fn target_extension(kind: MediaKind, audio_format: AudioFormat) -> &'static str {
    match kind {
        MediaKind::Video => VIDEO_CONTAINER,
        MediaKind::Audio => audio_format.extension(),
    }
}

/// A conversion is needed whenever the fetched file is not already in the
/// requested container.
pub fn needs_conversion(fetched: &Path, target_ext: &str) -> bool {
    fetched
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(true, |ext| !ext.eq_ignore_ascii_case(target_ext))
}

/// Codec arguments placed between the transcoder's input and output paths.
pub fn transcode_args(kind: MediaKind, audio_format: AudioFormat, bitrate_kbps: u32) -> Vec<String> {
    let bitrate = format!("{}k", bitrate_kbps.max(32));
    let mut args: Vec<&str> = match kind {
        MediaKind::Video => vec!["-c:v", "libx264", "-preset", "medium", "-c:a", "aac"],
        MediaKind::Audio => {
            let codec = match audio_format {
                AudioFormat::Mp3 => "libmp3lame",
                AudioFormat::Aac | AudioFormat::M4a => "aac",
                AudioFormat::Wav => "pcm_s16le",
                AudioFormat::Flac => "flac",
            };
            vec!["-vn", "-c:a", codec]
        }
    };
    if kind == MediaKind::Video || audio_format.is_lossy() {
        args.extend(["-b:a", bitrate.as_str()]);
    }
    args.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_quality_has_no_height_constraint() {
        let selector = format_selector(MediaKind::Video, Quality::Best);
        assert!(!selector.contains("height"));
    }

    #[test]
    fn test_specific_quality_constrains_height() {
        assert_eq!(
            format_selector(MediaKind::Video, Quality::MaxHeight(1080)),
            "bestvideo[height<=1080]+bestaudio/best[height<=1080]"
        );
        assert_eq!(
            format_selector(MediaKind::Audio, Quality::MaxHeight(1080)),
            "bestaudio/best"
        );
    }

    #[test]
    fn test_conversion_only_for_foreign_containers() {
        assert!(!needs_conversion(Path::new("/m/song.MP3"), "mp3"));
        assert!(needs_conversion(Path::new("/m/song.webm"), "mp3"));
        assert!(needs_conversion(Path::new("/m/noext"), "mp4"));
        assert_eq!(target_extension(MediaKind::Video, AudioFormat::Flac), "mp4");
        assert_eq!(target_extension(MediaKind::Audio, AudioFormat::Flac), "flac");
    }

    #[test]
    fn test_lossless_formats_skip_bitrate() {
        let wav = transcode_args(MediaKind::Audio, AudioFormat::Wav, 320);
        assert!(!wav.iter().any(|arg| arg == "-b:a"));

        let mp3 = transcode_args(MediaKind::Audio, AudioFormat::Mp3, 320);
        assert!(mp3.windows(2).any(|pair| pair[0] == "-b:a" && pair[1] == "320k"));

        let flac = transcode_args(MediaKind::Audio, AudioFormat::Flac, 320);
        assert!(!flac.iter().any(|arg| arg == "-b:a"));
        let video = transcode_args(MediaKind::Video, AudioFormat::Flac, 192);
        assert!(video.windows(2).any(|pair| pair[0] == "-b:a" && pair[1] == "192k"));
    }
}

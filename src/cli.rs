//! Command-line surface of the `tubefetch` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tubefetch_lib::models::{AudioFormat, Quality};

#[derive(Parser)]
#[command(name = "tubefetch")]
#[command(about = "Download YouTube videos and audio")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download a video, or its audio track with --audio
    Download {
        url: String,
        /// Download audio only
        #[arg(long)]
        audio: bool,
        /// "best" or a maximum height such as 1080p
        #[arg(short, long)]
        quality: Option<Quality>,
        /// Audio container: mp3, wav, aac, m4a or flac
        #[arg(short, long)]
        format: Option<AudioFormat>,
        /// Audio bitrate in kbps (lossy formats only)
        #[arg(short, long)]
        bitrate: Option<u32>,
        /// Target directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also save the thumbnail
        #[arg(long)]
        thumbnail: bool,
        /// Also save subtitles
        #[arg(long)]
        subtitles: bool,
    },

    /// Show or edit the download history
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,
    },

    /// Check for a newer release and install it
    Update {
        /// Only report, never install
        #[arg(long)]
        check: bool,
    },

    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(Subcommand)]
pub enum HistoryAction {
    List,
    /// Remove one entry by its position in `history list`
    Remove { index: usize },
    Clear,
}

#[derive(Subcommand)]
pub enum SettingsAction {
    Show,
    Set { key: String, value: String },
}

// Download and history command handlers
use crate::download::{DownloadError, DownloadOrchestrator, ProgressUpdate};
use crate::models::{DownloadRequest, HistoryRecord};
use crate::AppState;
use log::{info, warn};
use tokio::sync::mpsc;

/// Short status line for a failed download
pub fn describe_download_error(error: &DownloadError) -> String {
    match error {
        DownloadError::AlreadyInProgress => "A download is already in progress".to_string(),
        DownloadError::ConversionFailed { kept, reason } => format!(
            "Conversion failed: {}. The downloaded file was kept at {}",
            reason,
            kept.display()
        ),
        other => other.to_string(),
    }
}

pub async fn start_download(
    orchestrator: &DownloadOrchestrator,
    request: DownloadRequest,
    progress: Option<mpsc::Sender<ProgressUpdate>>,
) -> Result<HistoryRecord, String> {
    info!("Starting {} download: {}", request.kind, request.url);

    orchestrator.run(request, progress).await.map_err(|e| {
        warn!("Download failed: {}", e);
        describe_download_error(&e)
    })
}

pub fn list_history(state: &AppState) -> Vec<HistoryRecord> {
    state.history.lock().records().to_vec()
}

pub fn delete_history_entry(state: &AppState, index: usize) -> Result<HistoryRecord, String> {
    state
        .history
        .lock()
        .remove_at(index)
        .map_err(|e| format!("Failed to update history: {}", e))?
        .ok_or_else(|| format!("No history entry at position {}", index))
}

pub fn clear_history(state: &AppState) -> Result<usize, String> {
    state
        .history
        .lock()
        .clear()
        .map_err(|e| format!("Failed to clear history: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaKind;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn seeded_state(dir: &TempDir) -> AppState {
        let state = AppState::open(dir.path());
        for title in ["first", "second", "third"] {
            state
                .history
                .lock()
                .insert(HistoryRecord::new(
                    title.into(),
                    format!("https://youtu.be/{}", title),
                    format!("/media/{}.mp3", title),
                    MediaKind::Audio,
                ))
                .unwrap();
        }
        state
    }

    #[test]
    fn test_delete_and_clear_history() {
        let dir = TempDir::new().unwrap();
        let state = seeded_state(&dir);

        let removed = delete_history_entry(&state, 0).unwrap();
        assert_eq!(removed.title, "third");
        assert!(delete_history_entry(&state, 9).is_err());

        let titles: Vec<String> = list_history(&state).into_iter().map(|r| r.title).collect();
        assert_eq!(titles, ["second", "first"]);

        assert_eq!(clear_history(&state).unwrap(), 2);
        assert!(list_history(&AppState::open(dir.path())).is_empty());
    }

    #[test]
    fn test_conversion_error_mentions_kept_file() {
        let message = describe_download_error(&DownloadError::ConversionFailed {
            kept: PathBuf::from("/media/song.webm"),
            reason: "ffmpeg exited with code 1".into(),
        });
        assert!(message.contains("/media/song.webm"));
    }
}

use thiserror::Error;

/// Failures of the check / stage / handoff sequence. None of them leaves the
/// running installation modified.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("Update check failed: {0}")]
    CheckFailed(String),
    #[error("Update download failed: {0}")]
    DownloadFailed(String),
    #[error("Downloaded update is corrupt: {0}")]
    CorruptArtifact(String),
    #[error("Update installer helper unavailable: {0}")]
    HelperUnavailable(String),
    #[error("Failed to launch update installer: {0}")]
    HandoffFailed(String),
    #[error("No installable update: {0}")]
    NotInstallable(String),
    #[error("Update already in progress")]
    Busy,
}

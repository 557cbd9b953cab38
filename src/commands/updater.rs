// Self-update command handlers
use crate::update::{UpdateDecision, UpdateError, UpdateManager};
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Information about an available update
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateInfo {
    pub available: bool,
    pub version: Option<String>,
    pub current_version: String,
    /// Notes for every release newer than the running one, newest first
    pub notes: String,
}

impl UpdateInfo {
    fn from_decision(decision: &UpdateDecision, current_version: String) -> Self {
        Self {
            available: decision.available,
            version: decision.target_version.as_ref().map(ToString::to_string),
            current_version,
            notes: decision.cumulative_notes.clone(),
        }
    }
}

async fn check(manager: &Arc<Mutex<UpdateManager>>) -> Result<(UpdateDecision, String), String> {
    let manager = Arc::clone(manager);
    tokio::task::spawn_blocking(move || -> Result<(UpdateDecision, String), UpdateError> {
        let manager = manager.lock();
        let decision = manager.check_for_updates()?;
        Ok((decision, manager.current_version().to_string()))
    })
    .await
    .map_err(|e| format!("Update check was interrupted: {}", e))?
    .map_err(|e| e.to_string())
}

/// Check whether a newer release is published
pub async fn check_for_update(manager: &Arc<Mutex<UpdateManager>>) -> Result<UpdateInfo, String> {
    let (decision, current_version) = check(manager).await?;
    Ok(UpdateInfo::from_decision(&decision, current_version))
}

/// Downloads and hands off to the installer helper. `Ok` means the helper is
/// running and the caller must exit so it can replace the executable.
pub async fn install_update(manager: &Arc<Mutex<UpdateManager>>) -> Result<(), String> {
    let (decision, _) = check(manager).await?;
    if !decision.available {
        return Err(match decision.target_version {
            Some(version) => format!("Release {} has no download for this platform", version),
            None => "No update available".to_string(),
        });
    }

    info!("Installing update {:?}", decision.target_version);
    let manager = Arc::clone(manager);
    let result = tokio::task::spawn_blocking(move || manager.lock().install(&decision))
        .await
        .map_err(|e| format!("Update installation was interrupted: {}", e))?;

    match result {
        Ok(pid) => {
            info!("Update helper running as pid {}, exiting", pid);
            Ok(())
        }
        Err(e) => {
            warn!("Update installation failed: {}", e);
            Err(e.to_string())
        }
    }
}

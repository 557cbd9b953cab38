pub mod commands;
pub mod download;
pub mod file_manager;
pub mod logging;
pub mod models;
pub mod process_manager;
pub mod update;
pub mod utils;

use download::{DownloadOrchestrator, HistoryStore, MediaTranscoder};
use file_manager::{initialize_json_file, JsonStore};
use log::{info, warn};
use models::{HistoryRecord, Settings};
use parking_lot::{Mutex, RwLock};
use process_manager::{
    install_managed_fetcher, install_managed_transcoder, locate_tool, Ffmpeg, ToolError, YtDlp,
    FETCHER_NAME, TRANSCODER_NAME,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use update::{HttpReleaseFeed, InstallLayout, UpdateError, UpdateManager, Version, DEFAULT_FEED_URL};
use utils::{
    get_data_dir, get_history_json_path, get_settings_json_path, get_tools_dir, get_update_dir,
    initialize_data_directories, HISTORY_FILE_NAME, SETTINGS_FILE_NAME,
};

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Creates the app-data layout and seeds empty settings and history files.
pub fn initialize_app_data() -> Result<(), String> {
    initialize_data_directories()?;

    let empty_history: Vec<HistoryRecord> = vec![];
    initialize_json_file(&get_settings_json_path(), &Settings::default())
        .map_err(|e| e.to_string())?;
    initialize_json_file(&get_history_json_path(), &empty_history).map_err(|e| e.to_string())?;

    Ok(())
}

/// Shared application state, loaded once at startup and handed to whatever
/// needs it. Settings and history are rewritten wholesale on every change.
pub struct AppState {
    pub settings_store: JsonStore<Settings>,
    pub settings: Arc<RwLock<Settings>>,
    pub history: Arc<Mutex<HistoryStore>>,
    tools_dir: PathBuf,
    update_dir: PathBuf,
}

impl AppState {
    /// State backed by the per-user app-data directory
    pub fn load() -> Self {
        let mut state = Self::open(&get_data_dir());
        state.tools_dir = get_tools_dir();
        state.update_dir = get_update_dir();
        state
    }

    /// State whose settings and history files live in `data_dir`
    pub fn open(data_dir: &Path) -> Self {
        let settings_store = JsonStore::new(data_dir.join(SETTINGS_FILE_NAME));
        let settings = settings_store.load().unwrap_or_else(|e| {
            warn!("Using default settings, could not read saved ones: {}", e);
            Settings::default()
        });

        Self {
            settings_store,
            settings: Arc::new(RwLock::new(settings)),
            history: Arc::new(Mutex::new(HistoryStore::open(data_dir.join(HISTORY_FILE_NAME)))),
            tools_dir: data_dir.join("tools"),
            update_dir: data_dir.join("update"),
        }
    }

    /// Finds `name`, downloading a managed copy with `install` when allowed.
    async fn resolve_tool(
        &self,
        name: &'static str,
        explicit: Option<String>,
        install: fn(&Path) -> Result<PathBuf, ToolError>,
    ) -> Result<PathBuf, ToolError> {
        if let Some(path) = locate_tool(explicit.as_deref(), &self.tools_dir, name) {
            return Ok(path);
        }
        if !self.settings.read().auto_update_dependencies {
            return Err(ToolError::NotFound { tool: name });
        }

        info!("{} not found, installing a managed copy", name);
        let tools_dir = self.tools_dir.clone();
        tokio::task::spawn_blocking(move || install(&tools_dir))
            .await
            .map_err(|e| ToolError::Install {
                tool: name,
                message: e.to_string(),
            })?
    }

    pub async fn resolve_fetcher(&self) -> Result<PathBuf, ToolError> {
        let explicit = self.settings.read().fetcher_path.clone();
        self.resolve_tool(FETCHER_NAME, explicit, install_managed_fetcher).await
    }

    /// The transcoder is optional: without it downloads still work, but
    /// conversion and stream merging are unavailable.
    pub async fn resolve_transcoder(&self) -> Option<PathBuf> {
        let explicit = self.settings.read().transcoder_path.clone();
        match self.resolve_tool(TRANSCODER_NAME, explicit, install_managed_transcoder).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("{}; format conversion and stream merging are unavailable", e);
                None
            }
        }
    }

    /// Wires the external tools into a download orchestrator
    pub async fn build_orchestrator(&self) -> Result<DownloadOrchestrator, ToolError> {
        let fetcher_path = self.resolve_fetcher().await?;
        let transcoder_path = self.resolve_transcoder().await;
        info!("Using {} at {}", FETCHER_NAME, fetcher_path.display());

        let fetcher = YtDlp::new(fetcher_path).with_ffmpeg_location(transcoder_path.as_deref());
        let transcoder = transcoder_path.map(|path| Arc::new(Ffmpeg::new(path)) as Arc<dyn MediaTranscoder>);

        Ok(DownloadOrchestrator::new(
            Arc::new(fetcher),
            transcoder,
            Arc::clone(&self.settings),
            Arc::clone(&self.history),
        ))
    }

    pub fn build_update_manager(&self) -> Result<UpdateManager, UpdateError> {
        let current = Version::parse(APP_VERSION)
            .map_err(|e| UpdateError::CheckFailed(format!("invalid build version: {}", e)))?;
        let feed_url = self
            .settings
            .read()
            .update_feed_url
            .clone()
            .unwrap_or_else(|| DEFAULT_FEED_URL.to_string());
        let layout = InstallLayout::detect(self.update_dir.clone())?;

        Ok(UpdateManager::new(current, Box::new(HttpReleaseFeed::new(feed_url)), layout))
    }
}

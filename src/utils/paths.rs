use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

pub const APP_DIR_NAME: &str = "TubeFetch";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const HISTORY_FILE_NAME: &str = "download_history.json";

static APP_DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Per-user private application data directory.
///
/// `TUBEFETCH_DATA_DIR` overrides the platform location (portable installs, tests).
pub fn get_app_data_dir() -> PathBuf {
    APP_DATA_DIR
        .get_or_init(|| {
            if let Some(custom) = std::env::var_os("TUBEFETCH_DATA_DIR") {
                return PathBuf::from(custom);
            }
            let base_dir = dirs::data_local_dir()
                .or_else(dirs::data_dir)
                .unwrap_or_else(|| PathBuf::from("."));
            base_dir.join(APP_DIR_NAME)
        })
        .clone()
}

pub fn get_data_dir() -> PathBuf {
    get_app_data_dir().join("data")
}

pub fn get_logs_dir() -> PathBuf {
    get_app_data_dir().join("logs")
}

pub fn get_tools_dir() -> PathBuf {
    get_app_data_dir().join("tools")
}

/// Scratch area for staged updates and the cached installer helper
pub fn get_update_dir() -> PathBuf {
    get_app_data_dir().join("update")
}

pub fn get_settings_json_path() -> PathBuf {
    get_data_dir().join(SETTINGS_FILE_NAME)
}

pub fn get_history_json_path() -> PathBuf {
    get_data_dir().join(HISTORY_FILE_NAME)
}

/// Last-resort download location when neither the request nor settings name one
pub fn get_fallback_media_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| get_app_data_dir().join("downloads"))
}

pub fn initialize_data_directories() -> Result<(), String> {
    let directories = [get_data_dir(), get_logs_dir(), get_tools_dir()];

    for dir in &directories {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create directory {:?}: {}", dir, e))?;
            log::debug!("Created directory: {:?}", dir);
        }
    }

    Ok(())
}

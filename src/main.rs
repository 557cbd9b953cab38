mod cli;

use clap::Parser;
use cli::{Cli, Commands, HistoryAction, SettingsAction};
use log::{error, info, warn};
use parking_lot::Mutex;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tubefetch_lib::commands::{downloads, settings, updater};
use tubefetch_lib::download::ProgressUpdate;
use tubefetch_lib::logging::{cleanup_old_logs, init_logging};
use tubefetch_lib::models::{DownloadRequest, MediaKind};
use tubefetch_lib::utils::get_logs_dir;
use tubefetch_lib::{initialize_app_data, AppState, APP_VERSION};

/// Progress updates buffered for the terminal renderer
const PROGRESS_BUFFER: usize = 16;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = initialize_app_data() {
        eprintln!("Failed to initialize app data: {}", e);
    }
    let logs_dir = get_logs_dir();
    let _log_guard = init_logging(&logs_dir);
    cleanup_old_logs(&logs_dir);
    info!("TubeFetch {} starting", APP_VERSION);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let state = AppState::load();
    let result = runtime.block_on(run(cli.command, &state));
    // An unfinished startup check must not hold the process open
    runtime.shutdown_background();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{}", message);
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, state: &AppState) -> Result<(), String> {
    let startup_check = match &command {
        Commands::Update { .. } => None,
        _ if state.settings.read().check_updates_on_startup => spawn_startup_check(state),
        _ => None,
    };

    let result = match command {
        Commands::Download {
            url,
            audio,
            quality,
            format,
            bitrate,
            output,
            thumbnail,
            subtitles,
        } => {
            let kind = if audio { MediaKind::Audio } else { MediaKind::Video };
            let mut request = DownloadRequest::from_settings(url, kind, &state.settings.read());
            if let Some(quality) = quality {
                request.quality = quality;
            }
            if let Some(format) = format {
                request.audio_format = format;
            }
            if let Some(bitrate) = bitrate {
                request.audio_bitrate = bitrate;
            }
            request.output_directory = output;
            request.want_thumbnail |= thumbnail;
            request.want_subtitles |= subtitles;
            download(state, request).await
        }
        Commands::History { action } => history(state, action.unwrap_or(HistoryAction::List)),
        Commands::Update { check } => update(state, check).await,
        Commands::Settings { action } => settings_command(state, action.unwrap_or(SettingsAction::Show)),
    };

    if let Some(check) = startup_check {
        report_startup_check(check).await;
    }
    result
}

async fn download(state: &AppState, request: DownloadRequest) -> Result<(), String> {
    let orchestrator = state
        .build_orchestrator()
        .await
        .map_err(|e| e.to_string())?;

    let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
    let renderer = tokio::spawn(render_progress(rx));

    let result = downloads::start_download(&orchestrator, request, Some(tx)).await;
    let _ = renderer.await;
    eprintln!();

    let record = result?;
    println!("Saved \"{}\" to {}", record.title, record.file_path);
    Ok(())
}

async fn render_progress(mut updates: mpsc::Receiver<ProgressUpdate>) {
    let mut stderr = std::io::stderr();
    while let Some(update) = updates.recv().await {
        let mut line = update.status_text();
        if let Some(speed) = &update.speed {
            line.push_str(&format!("  {}", speed));
        }
        if update.eta.is_some() {
            line.push_str(&format!("  ETA {}", update.eta_text()));
        }
        let _ = write!(stderr, "\r{:<60}", line);
        let _ = stderr.flush();
    }
}

fn history(state: &AppState, action: HistoryAction) -> Result<(), String> {
    match action {
        HistoryAction::List => {
            let records = downloads::list_history(state);
            if records.is_empty() {
                println!("No downloads yet");
            }
            for (index, record) in records.iter().enumerate() {
                println!(
                    "{:>3}  {}  [{}] {}\n     {}",
                    index,
                    record.downloaded_at.format("%Y-%m-%d %H:%M"),
                    record.kind,
                    record.title,
                    record.file_path
                );
            }
        }
        HistoryAction::Remove { index } => {
            let removed = downloads::delete_history_entry(state, index)?;
            println!("Removed \"{}\"", removed.title);
        }
        HistoryAction::Clear => {
            let count = downloads::clear_history(state)?;
            println!("Cleared {} entries", count);
        }
    }
    Ok(())
}

async fn update(state: &AppState, check_only: bool) -> Result<(), String> {
    let manager = Arc::new(Mutex::new(state.build_update_manager().map_err(|e| e.to_string())?));
    let info = updater::check_for_update(&manager).await?;

    match (&info.version, info.available) {
        (None, _) => {
            println!("TubeFetch {} is up to date", info.current_version);
            return Ok(());
        }
        (Some(version), available) => {
            println!("Update available: {} -> {}\n", info.current_version, version);
            println!("{}", info.notes);
            if !available {
                return Err("This release has no download for your platform".to_string());
            }
        }
    }

    if check_only {
        return Ok(());
    }
    println!("Downloading update, TubeFetch will restart when it is installed...");
    updater::install_update(&manager).await?;
    // Returning lets main drop the log guard before the helper starts copying
    println!("Installing {}...", info.version.unwrap_or_default());
    Ok(())
}

fn settings_command(state: &AppState, action: SettingsAction) -> Result<(), String> {
    let current = match action {
        SettingsAction::Show => settings::get_settings(state),
        SettingsAction::Set { key, value } => {
            let params = settings::UpdateSettingsParams::from_key_value(&key, &value)?;
            settings::update_settings(state, params)?
        }
    };
    let json = serde_json::to_string_pretty(&current).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

/// Background update check; reports only and never installs.
fn spawn_startup_check(state: &AppState) -> Option<JoinHandle<Result<updater::UpdateInfo, String>>> {
    let manager = match state.build_update_manager() {
        Ok(manager) => Arc::new(Mutex::new(manager)),
        Err(e) => {
            warn!("Skipping startup update check: {}", e);
            return None;
        }
    };
    Some(tokio::spawn(async move { updater::check_for_update(&manager).await }))
}

async fn report_startup_check(check: JoinHandle<Result<updater::UpdateInfo, String>>) {
    if !check.is_finished() {
        check.abort();
        return;
    }
    match check.await {
        Ok(Ok(info)) if info.available => {
            if let Some(version) = info.version {
                println!("A new version ({}) is available. Run `tubefetch update` to install it.", version);
            }
        }
        Ok(Err(e)) => warn!("Startup update check failed: {}", e),
        _ => {}
    }
}

//! Update check and two-phase installation.
//!
//! A running executable cannot replace itself, so installation stages the new
//! payload under the app-data directory, starts the installer helper with
//! (running exe, staged payload, install dir) and exits. Nothing is persisted
//! between those steps: after a crash the next start checks again from scratch.

use super::error::UpdateError;
use super::feed::ReleaseFeed;
use super::selector::{platform_asset_suffix, select_update, UpdateDecision};
use super::version::Version;
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

pub const HELPER_BINARY_NAME: &str = "tubefetch-updater";

const ASSET_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateState {
    Idle,
    Downloading,
    Staged(StagedUpdate),
    HandoffRequested,
}

/// A downloaded payload waiting to be applied by the helper.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedUpdate {
    pub version: Version,
    /// Directory whose contents mirror the installation directory
    pub payload_dir: PathBuf,
    pub payload_file: PathBuf,
}

/// Where the running application lives and where update scratch goes.
#[derive(Debug, Clone)]
pub struct InstallLayout {
    pub current_exe: PathBuf,
    pub install_dir: PathBuf,
    /// Private scratch directory, e.g. `<app-data>/update`
    pub update_dir: PathBuf,
}

impl InstallLayout {
    pub fn detect(update_dir: PathBuf) -> Result<Self, UpdateError> {
        let current_exe = std::env::current_exe()
            .map_err(|e| UpdateError::HandoffFailed(format!("cannot locate running executable: {}", e)))?;
        let install_dir = current_exe
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| UpdateError::HandoffFailed("executable has no parent directory".into()))?;

        Ok(Self {
            current_exe,
            install_dir,
            update_dir,
        })
    }

    fn payload_dir(&self) -> PathBuf {
        self.update_dir.join("payload")
    }

    fn helper_cache_dir(&self) -> PathBuf {
        self.update_dir.join("helper")
    }
}

fn helper_file_name() -> String {
    format!("{}{}", HELPER_BINARY_NAME, std::env::consts::EXE_SUFFIX)
}

pub struct UpdateManager {
    current_version: Version,
    feed: Box<dyn ReleaseFeed>,
    layout: InstallLayout,
    asset_suffix: String,
    state: UpdateState,
    agent: ureq::Agent,
}

impl UpdateManager {
    pub fn new(current_version: Version, feed: Box<dyn ReleaseFeed>, layout: InstallLayout) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(ASSET_CONNECT_TIMEOUT)
            .build();

        Self {
            current_version,
            feed,
            layout,
            asset_suffix: platform_asset_suffix().to_string(),
            state: UpdateState::Idle,
            agent,
        }
    }

    pub fn with_asset_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.asset_suffix = suffix.into();
        self
    }

    pub fn current_version(&self) -> &Version {
        &self.current_version
    }

    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    pub fn check_for_updates(&self) -> Result<UpdateDecision, UpdateError> {
        let releases = self.feed.fetch_releases()?;
        let decision = select_update(&releases, &self.current_version, &self.asset_suffix);

        match (&decision.target_version, decision.available) {
            (Some(version), true) => info!("Update available: {} -> {}", self.current_version, version),
            (Some(version), false) => warn!("Release {} found but has no installable asset", version),
            (None, _) => debug!("Running version {} is current", self.current_version),
        }

        Ok(decision)
    }

    /// Idle -> Downloading -> Staged. Any failure returns to Idle.
    pub fn stage(&mut self, decision: &UpdateDecision) -> Result<StagedUpdate, UpdateError> {
        if !matches!(self.state, UpdateState::Idle) {
            return Err(UpdateError::Busy);
        }

        let (version, url) = match (&decision.target_version, &decision.download_url) {
            (Some(version), Some(url)) if decision.available => (version.clone(), url.clone()),
            _ => {
                return Err(UpdateError::NotInstallable(
                    "no update with a downloadable asset was selected".into(),
                ))
            }
        };

        self.state = UpdateState::Downloading;
        match self.download_and_verify(version, &url) {
            Ok(staged) => {
                self.state = UpdateState::Staged(staged.clone());
                Ok(staged)
            }
            Err(e) => {
                self.state = UpdateState::Idle;
                Err(e)
            }
        }
    }

    fn download_and_verify(&self, version: Version, url: &str) -> Result<StagedUpdate, UpdateError> {
        let payload_dir = self.layout.payload_dir();
        // Leftovers from an interrupted attempt are never trusted
        if payload_dir.exists() {
            fs::remove_dir_all(&payload_dir)
                .map_err(|e| UpdateError::DownloadFailed(format!("cannot clear {:?}: {}", payload_dir, e)))?;
        }
        fs::create_dir_all(&payload_dir)
            .map_err(|e| UpdateError::DownloadFailed(format!("cannot create {:?}: {}", payload_dir, e)))?;

        let exe_name = self
            .layout
            .current_exe
            .file_name()
            .ok_or_else(|| UpdateError::DownloadFailed("running executable has no file name".into()))?;
        let payload_file = payload_dir.join(exe_name);
        let partial = payload_dir.join(".download");

        info!("Downloading update {} from {}", version, url);
        let written = self.download_to(url, &partial).map_err(|e| {
            let _ = fs::remove_file(&partial);
            e
        })?;
        debug!("Downloaded {} bytes", written);

        verify_artifact(&partial)?;
        fs::rename(&partial, &payload_file)
            .map_err(|e| UpdateError::DownloadFailed(format!("cannot finalize payload: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&payload_file, fs::Permissions::from_mode(0o755))
                .map_err(|e| UpdateError::DownloadFailed(format!("cannot mark payload executable: {}", e)))?;
        }

        Ok(StagedUpdate {
            version,
            payload_dir,
            payload_file,
        })
    }

    fn download_to(&self, url: &str, target: &Path) -> Result<u64, UpdateError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| UpdateError::DownloadFailed(e.to_string()))?;

        let file = File::create(target)
            .map_err(|e| UpdateError::DownloadFailed(format!("cannot create {:?}: {}", target, e)))?;
        let mut writer = BufWriter::new(file);
        let written = io::copy(&mut response.into_reader(), &mut writer)
            .map_err(|e| UpdateError::DownloadFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| UpdateError::DownloadFailed(e.to_string()))?;

        Ok(written)
    }

    /// Returns the cached helper, copying it from beside the running
    /// executable the first time.
    pub fn locate_helper(&self) -> Result<PathBuf, UpdateError> {
        let cached = self.layout.helper_cache_dir().join(helper_file_name());
        if cached.is_file() {
            return Ok(cached);
        }

        let bundled = self.layout.install_dir.join(helper_file_name());
        if !bundled.is_file() {
            return Err(UpdateError::HelperUnavailable(format!(
                "{:?} not found",
                bundled
            )));
        }

        // Run from the cache so the helper never overwrites its own image
        fs::create_dir_all(self.layout.helper_cache_dir())
            .and_then(|_| fs::copy(&bundled, &cached))
            .map_err(|e| UpdateError::HelperUnavailable(format!("cannot cache helper: {}", e)))?;
        info!("Cached update helper at {:?}", cached);
        Ok(cached)
    }

    /// Staged -> HandoffRequested: launches the helper and returns its pid.
    /// The caller must exit right after this returns `Ok`.
    pub fn request_handoff(&mut self) -> Result<u32, UpdateError> {
        let staged = match &self.state {
            UpdateState::Staged(staged) => staged.clone(),
            _ => return Err(UpdateError::NotInstallable("no staged update".into())),
        };

        if let Err(e) = verify_artifact(&staged.payload_file) {
            self.state = UpdateState::Idle;
            return Err(e);
        }

        let helper = match self.locate_helper() {
            Ok(helper) => helper,
            Err(e) => {
                self.state = UpdateState::Idle;
                return Err(e);
            }
        };

        let child = Command::new(&helper)
            .arg(&self.layout.current_exe)
            .arg(&staged.payload_dir)
            .arg(&self.layout.install_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                self.state = UpdateState::Idle;
                UpdateError::HandoffFailed(e.to_string())
            })?;

        info!("Update helper started (pid {}), handing off", child.id());
        self.state = UpdateState::HandoffRequested;
        Ok(child.id())
    }

    /// Full install: stage, then launch the helper. Returns the helper pid.
    /// On `Ok` the caller must let the process exit right away, after
    /// flushing its own log sinks.
    pub fn install(&mut self, decision: &UpdateDecision) -> Result<u32, UpdateError> {
        self.stage(decision)?;
        self.request_handoff()
    }
}

fn verify_artifact(path: &Path) -> Result<(), UpdateError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => {
            let _ = fs::remove_file(path);
            Err(UpdateError::CorruptArtifact(format!("{:?} is empty", path)))
        }
        Err(e) => Err(UpdateError::CorruptArtifact(format!("{:?}: {}", path, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReleaseAsset, ReleaseDescriptor};
    use tempfile::TempDir;

    struct StaticFeed(Result<Vec<ReleaseDescriptor>, String>);

    impl ReleaseFeed for StaticFeed {
        fn fetch_releases(&self) -> Result<Vec<ReleaseDescriptor>, UpdateError> {
            self.0.clone().map_err(UpdateError::CheckFailed)
        }
    }

    fn layout(root: &Path) -> InstallLayout {
        let install_dir = root.join("install");
        fs::create_dir_all(&install_dir).unwrap();
        InstallLayout {
            current_exe: install_dir.join("tubefetch"),
            install_dir,
            update_dir: root.join("update"),
        }
    }

    /// Serves `body` to a single HTTP request and returns its URL.
    fn serve_once(body: &'static [u8]) -> String {
        use std::io::Read;
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
            }
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(body).unwrap();
        });
        format!("http://{}/TubeFetch.exe", addr)
    }

    fn decision_for(url: String) -> UpdateDecision {
        UpdateDecision {
            available: true,
            target_version: Some(Version::parse("2.0").unwrap()),
            download_url: Some(url),
            cumulative_notes: String::new(),
        }
    }

    fn manager(root: &Path, feed: StaticFeed) -> UpdateManager {
        UpdateManager::new(Version::parse("1.0").unwrap(), Box::new(feed), layout(root))
            .with_asset_suffix(".exe")
    }

    #[test]
    fn test_check_reports_feed_failure() {
        let root = TempDir::new().unwrap();
        let manager = manager(root.path(), StaticFeed(Err("offline".into())));

        assert!(matches!(
            manager.check_for_updates(),
            Err(UpdateError::CheckFailed(_))
        ));
    }

    #[test]
    fn test_check_selects_newest() {
        let root = TempDir::new().unwrap();
        let feed = StaticFeed(Ok(vec![ReleaseDescriptor {
            tag_name: "v1.1".into(),
            body: Some("notes".into()),
            assets: vec![ReleaseAsset {
                name: "TubeFetch.exe".into(),
                browser_download_url: "https://example.com/TubeFetch.exe".into(),
            }],
        }]));

        let decision = manager(root.path(), feed).check_for_updates().unwrap();
        assert!(decision.available);
    }

    #[test]
    fn test_stage_rejects_unavailable_decision() {
        let root = TempDir::new().unwrap();
        let mut manager = manager(root.path(), StaticFeed(Ok(vec![])));

        let result = manager.stage(&UpdateDecision::unavailable());

        assert!(matches!(result, Err(UpdateError::NotInstallable(_))));
        assert_eq!(manager.state(), &UpdateState::Idle);
    }

    #[test]
    fn test_failed_download_returns_to_idle() {
        let root = TempDir::new().unwrap();
        let mut manager = manager(root.path(), StaticFeed(Ok(vec![])));
        let decision = UpdateDecision {
            available: true,
            target_version: Some(Version::parse("2.0").unwrap()),
            // Nothing listens on port 9 of localhost
            download_url: Some("http://127.0.0.1:9/TubeFetch.exe".into()),
            cumulative_notes: String::new(),
        };

        let result = manager.stage(&decision);

        assert!(matches!(result, Err(UpdateError::DownloadFailed(_))));
        assert_eq!(manager.state(), &UpdateState::Idle);
    }

    #[test]
    fn test_stage_downloads_payload() {
        let root = TempDir::new().unwrap();
        let mut manager = manager(root.path(), StaticFeed(Ok(vec![])));

        let staged = manager.stage(&decision_for(serve_once(b"new build"))).unwrap();

        assert_eq!(manager.state(), &UpdateState::Staged(staged.clone()));
        assert_eq!(staged.version, Version::parse("2.0").unwrap());
        assert_eq!(staged.payload_file, staged.payload_dir.join("tubefetch"));
        assert_eq!(fs::read(&staged.payload_file).unwrap(), b"new build");
        assert!(!staged.payload_dir.join(".download").exists());

        // A second stage is refused until the first is handed off
        assert!(matches!(
            manager.stage(&decision_for("http://127.0.0.1:9/x".into())),
            Err(UpdateError::Busy)
        ));
    }

    #[test]
    fn test_empty_payload_is_corrupt() {
        let root = TempDir::new().unwrap();
        let mut manager = manager(root.path(), StaticFeed(Ok(vec![])));

        let result = manager.stage(&decision_for(serve_once(b"")));

        assert!(matches!(result, Err(UpdateError::CorruptArtifact(_))));
        assert_eq!(manager.state(), &UpdateState::Idle);
        assert!(!manager.layout.payload_dir().join("tubefetch").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_handoff_launches_helper_with_paths() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let mut manager = manager(root.path(), StaticFeed(Ok(vec![])));
        let record = root.path().join("handoff.txt");

        let bundled = manager.layout.install_dir.join(helper_file_name());
        fs::write(
            &bundled,
            format!("#!/bin/sh\necho \"$1|$2|$3\" > \"{}\"\n", record.display()),
        )
        .unwrap();
        fs::set_permissions(&bundled, fs::Permissions::from_mode(0o755)).unwrap();

        // Control comes back to the caller, which owns the process exit
        let pid = manager.install(&decision_for(serve_once(b"new build"))).unwrap();
        assert!(pid > 0);
        assert_eq!(manager.state(), &UpdateState::HandoffRequested);
        let payload_dir = manager.layout.payload_dir();
        assert_eq!(fs::read(payload_dir.join("tubefetch")).unwrap(), b"new build");

        let mut written = String::new();
        for _ in 0..50 {
            written = fs::read_to_string(&record).unwrap_or_default();
            if written.ends_with('\n') {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        let expected = format!(
            "{}|{}|{}\n",
            manager.layout.current_exe.display(),
            payload_dir.display(),
            manager.layout.install_dir.display()
        );
        assert_eq!(written, expected);
    }

    #[test]
    fn test_empty_artifact_is_corrupt() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("empty.exe");
        File::create(&path).unwrap();

        assert!(matches!(
            verify_artifact(&path),
            Err(UpdateError::CorruptArtifact(_))
        ));
        assert!(!path.exists());
        assert!(matches!(
            verify_artifact(&root.path().join("absent")),
            Err(UpdateError::CorruptArtifact(_))
        ));
    }

    #[test]
    fn test_helper_cached_once() {
        let root = TempDir::new().unwrap();
        let manager = manager(root.path(), StaticFeed(Ok(vec![])));

        assert!(matches!(
            manager.locate_helper(),
            Err(UpdateError::HelperUnavailable(_))
        ));

        let bundled = manager.layout.install_dir.join(helper_file_name());
        fs::write(&bundled, "helper-v1").unwrap();
        let cached = manager.locate_helper().unwrap();
        assert_eq!(fs::read_to_string(&cached).unwrap(), "helper-v1");

        // Later bundled changes do not replace the cached copy
        fs::write(&bundled, "helper-v2").unwrap();
        let again = manager.locate_helper().unwrap();
        assert_eq!(again, cached);
        assert_eq!(fs::read_to_string(&again).unwrap(), "helper-v1");
    }

    #[test]
    fn test_handoff_requires_staged_update() {
        let root = TempDir::new().unwrap();
        let mut manager = manager(root.path(), StaticFeed(Ok(vec![])));

        assert!(matches!(
            manager.request_handoff(),
            Err(UpdateError::NotInstallable(_))
        ));
    }
}

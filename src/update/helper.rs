//! Update installer helper.
//!
//! Runs as its own process after the application has exited: copies the
//! staged payload over the installation directory, removes the payload and
//! relaunches the application. Failures are appended to `update_error.log`
//! next to the application executable and the process exits non-zero.

use chrono::Local;
use log::{error, info, warn};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use thiserror::Error;

pub const SETTLE_DELAY: Duration = Duration::from_secs(2);
pub const ERROR_LOG_NAME: &str = "update_error.log";

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILED: u8 = 1;
pub const EXIT_USAGE: u8 = 2;

#[derive(Debug, Error)]
pub enum HelperError {
    #[error("expected 3 arguments (app path, update path, install dir), got {0}")]
    Usage(usize),
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to copy {from:?} to {to:?}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove staged update {path:?}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to relaunch {path:?}: {source}")]
    Relaunch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HelperArgs {
    pub app_path: PathBuf,
    pub staged_path: PathBuf,
    pub install_dir: PathBuf,
}

impl HelperArgs {
    pub fn from_args<I>(args: I) -> Result<Self, HelperError>
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
    {
        let mut args: Vec<PathBuf> = args.into_iter().map(Into::into).collect();
        if args.len() != 3 {
            return Err(HelperError::Usage(args.len()));
        }

        let install_dir = args.remove(2);
        let staged_path = args.remove(1);
        let app_path = args.remove(0);
        Ok(Self {
            app_path,
            staged_path,
            install_dir,
        })
    }

    /// Plain-text failure log beside the application executable
    pub fn error_log_path(&self) -> PathBuf {
        self.app_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(&self.install_dir)
            .join(ERROR_LOG_NAME)
    }
}

/// Copies every file under `staged` into `install_dir`, creating directories
/// and overwriting existing files. A missing payload copies nothing, which
/// makes a second run with the same arguments harmless.
pub fn copy_payload(staged: &Path, install_dir: &Path) -> Result<usize, HelperError> {
    if !staged.exists() {
        warn!("Staged update {:?} not found, nothing to copy", staged);
        return Ok(0);
    }

    if staged.is_file() {
        let file_name = staged.file_name().unwrap_or_default();
        let target = install_dir.join(file_name);
        copy_file(staged, &target)?;
        return Ok(1);
    }

    let mut copied = 0;
    copy_tree(staged, staged, install_dir, &mut copied)?;
    Ok(copied)
}

fn copy_tree(
    root: &Path,
    dir: &Path,
    install_dir: &Path,
    copied: &mut usize,
) -> Result<(), HelperError> {
    let read_error = |source| HelperError::Read {
        path: dir.to_path_buf(),
        source,
    };

    for entry in fs::read_dir(dir).map_err(read_error)? {
        let entry = entry.map_err(read_error)?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(read_error)?;

        if file_type.is_dir() {
            copy_tree(root, &path, install_dir, copied)?;
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(&path);
        copy_file(&path, &install_dir.join(relative))?;
        *copied += 1;
    }

    Ok(())
}

fn copy_file(from: &Path, to: &Path) -> Result<(), HelperError> {
    let copy_error = |source| HelperError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(copy_error)?;
    }
    fs::copy(from, to).map_err(copy_error)?;
    Ok(())
}

fn remove_payload(staged: &Path) -> Result<(), HelperError> {
    let result = if staged.is_dir() {
        fs::remove_dir_all(staged)
    } else if staged.exists() {
        fs::remove_file(staged)
    } else {
        Ok(())
    };

    result.map_err(|source| HelperError::Cleanup {
        path: staged.to_path_buf(),
        source,
    })
}

/// Copy then delete the payload. The application is not touched.
pub fn apply_update(args: &HelperArgs) -> Result<usize, HelperError> {
    let copied = copy_payload(&args.staged_path, &args.install_dir)?;
    remove_payload(&args.staged_path)?;
    info!("Applied {} file(s) to {:?}", copied, args.install_dir);
    Ok(copied)
}

pub fn relaunch(app_path: &Path) -> Result<(), HelperError> {
    let mut command = Command::new(app_path);
    if let Some(dir) = app_path.parent().filter(|dir| dir.is_dir()) {
        command.current_dir(dir);
    }

    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| HelperError::Relaunch {
            path: app_path.to_path_buf(),
            source,
        })?;
    Ok(())
}

pub fn run_helper(args: &HelperArgs, settle: Duration) -> Result<(), HelperError> {
    // Let the exiting application release its file locks
    thread::sleep(settle);
    apply_update(args)?;
    relaunch(&args.app_path)
}

pub fn append_error_log(log_path: &Path, failure: &HelperError) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    writeln!(
        file,
        "Update failed at {}:\n{:?}\n{}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        failure,
        failure
    )
}

/// Entry point shared by the helper binary. Returns the process exit code.
pub fn run_from_args<I>(args: I, settle: Duration) -> u8
where
    I: IntoIterator,
    I::Item: Into<PathBuf>,
{
    let args = match HelperArgs::from_args(args) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("usage: tubefetch-updater <app-path> <update-path> <install-dir>");
            return EXIT_USAGE;
        }
    };

    match run_helper(&args, settle) {
        Ok(()) => EXIT_OK,
        Err(failure) => {
            error!("{}", failure);
            let log_path = args.error_log_path();
            if let Err(e) = append_error_log(&log_path, &failure) {
                error!("Could not write {:?}: {}", log_path, e);
            }
            EXIT_FAILED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scratch_tree() -> (TempDir, HelperArgs) {
        let root = TempDir::new().unwrap();
        let install_dir = root.path().join("install");
        let staged = root.path().join("staged");
        fs::create_dir_all(install_dir.join("lib")).unwrap();
        fs::create_dir_all(staged.join("lib").join("nested")).unwrap();

        fs::write(install_dir.join("app.bin"), "old").unwrap();
        fs::write(install_dir.join("keep.txt"), "untouched").unwrap();
        fs::write(staged.join("app.bin"), "new").unwrap();
        fs::write(staged.join("lib").join("nested").join("extra.dat"), "extra").unwrap();

        let args = HelperArgs {
            app_path: install_dir.join("missing-app-binary"),
            staged_path: staged,
            install_dir,
        };
        (root, args)
    }

    #[test]
    fn test_wrong_argument_count_rejected() {
        assert!(matches!(
            HelperArgs::from_args(["a", "b"]),
            Err(HelperError::Usage(2))
        ));
        assert_eq!(run_from_args(["a", "b", "c", "d"], Duration::ZERO), EXIT_USAGE);
    }

    #[test]
    fn test_arguments_in_order() {
        let args = HelperArgs::from_args(["/opt/app/app", "/tmp/staged", "/opt/app"]).unwrap();
        assert_eq!(args.app_path, PathBuf::from("/opt/app/app"));
        assert_eq!(args.staged_path, PathBuf::from("/tmp/staged"));
        assert_eq!(args.install_dir, PathBuf::from("/opt/app"));
    }

    #[test]
    fn test_apply_overwrites_and_removes_payload() {
        let (_root, args) = scratch_tree();

        let copied = apply_update(&args).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(fs::read_to_string(args.install_dir.join("app.bin")).unwrap(), "new");
        assert_eq!(
            fs::read_to_string(args.install_dir.join("lib/nested/extra.dat")).unwrap(),
            "extra"
        );
        assert_eq!(
            fs::read_to_string(args.install_dir.join("keep.txt")).unwrap(),
            "untouched"
        );
        assert!(!args.staged_path.exists());
    }

    #[test]
    fn test_second_apply_is_harmless() {
        let (_root, args) = scratch_tree();

        apply_update(&args).unwrap();
        let copied_again = apply_update(&args).unwrap();

        assert_eq!(copied_again, 0);
        assert_eq!(fs::read_to_string(args.install_dir.join("app.bin")).unwrap(), "new");
    }

    #[test]
    fn test_failure_writes_error_log_and_exits_non_zero() {
        let (_root, args) = scratch_tree();

        let code = run_from_args(
            [
                args.app_path.clone(),
                args.staged_path.clone(),
                args.install_dir.clone(),
            ],
            Duration::ZERO,
        );

        assert_eq!(code, EXIT_FAILED);
        // Copy succeeded before the relaunch failed
        assert_eq!(fs::read_to_string(args.install_dir.join("app.bin")).unwrap(), "new");
        let log = fs::read_to_string(args.error_log_path()).unwrap();
        assert!(log.contains("Update failed at"));
        assert!(log.contains("relaunch"));
    }
}

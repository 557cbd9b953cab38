//! Picks the installable update out of a release list.

use super::version::Version;
use crate::models::ReleaseDescriptor;
use log::warn;
use serde::Serialize;

const MISSING_NOTES: &str = "No release notes provided.";

/// Outcome of comparing the release feed against the running version.
///
/// `target_version` and `cumulative_notes` are filled whenever newer releases
/// exist, even when the newest one ships no installable asset (in which case
/// `available` is false and `download_url` is `None`).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UpdateDecision {
    pub available: bool,
    pub target_version: Option<Version>,
    pub download_url: Option<String>,
    pub cumulative_notes: String,
}

impl UpdateDecision {
    pub fn unavailable() -> Self {
        Self {
            available: false,
            target_version: None,
            download_url: None,
            cumulative_notes: String::new(),
        }
    }
}

/// Asset filename suffix identifying the installable payload on this platform.
pub fn platform_asset_suffix() -> &'static str {
    if cfg!(target_os = "windows") {
        ".exe"
    } else if cfg!(target_os = "macos") {
        "-macos"
    } else {
        "-linux"
    }
}

/// Scans releases newest-first, collecting every release newer than
/// `current`. Only the single newest one may supply the download; an older
/// release's asset is never used as a substitute.
pub fn select_update(
    releases: &[ReleaseDescriptor],
    current: &Version,
    asset_suffix: &str,
) -> UpdateDecision {
    let mut parsed: Vec<(Version, &ReleaseDescriptor)> = releases
        .iter()
        .filter_map(|release| match Version::parse(&release.tag_name) {
            Ok(version) => Some((version, release)),
            Err(e) => {
                warn!("Skipping release with unparseable tag: {}", e);
                None
            }
        })
        .collect();

    // Feed order is never trusted
    parsed.sort_by(|a, b| b.0.cmp(&a.0));

    let missed: Vec<&(Version, &ReleaseDescriptor)> = parsed
        .iter()
        .take_while(|(version, _)| version > current)
        .collect();

    let Some((newest_version, newest_release)) = missed.first().map(|entry| (&entry.0, entry.1))
    else {
        return UpdateDecision::unavailable();
    };

    let cumulative_notes = missed
        .iter()
        .map(|(_, release)| {
            let body = release
                .body
                .as_deref()
                .map(str::trim)
                .filter(|body| !body.is_empty())
                .unwrap_or(MISSING_NOTES);
            format!("## {}\n{}\n", release.tag_name, body)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let download_url = newest_release
        .asset_with_suffix(asset_suffix)
        .map(|asset| asset.browser_download_url.clone())
        .filter(|url| !url.is_empty());

    if download_url.is_none() {
        warn!(
            "Release {} has no '{}' asset; not offering an update",
            newest_release.tag_name, asset_suffix
        );
    }

    UpdateDecision {
        available: download_url.is_some(),
        target_version: Some(newest_version.clone()),
        download_url,
        cumulative_notes,
    }
}

// Release feed data models
use serde::{Deserialize, Serialize};

/// A downloadable file attached to a release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(default)]
    pub browser_download_url: String,
}

/// One published release as returned by the releases endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReleaseDescriptor {
    /// Version tag (e.g. "v1.1.12")
    pub tag_name: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseDescriptor {
    /// First asset whose name ends with `suffix` (case-insensitive).
    pub fn asset_with_suffix(&self, suffix: &str) -> Option<&ReleaseAsset> {
        let suffix = suffix.to_lowercase();
        self.assets
            .iter()
            .find(|asset| asset.name.to_lowercase().ends_with(&suffix))
    }
}

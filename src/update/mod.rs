//! Self-update: version ordering, release selection, staged installation and
//! the installer helper run after the application exits.

pub mod error;
pub mod feed;
pub mod helper;
pub mod manager;
pub mod selector;
pub mod version;

pub use error::UpdateError;
pub use feed::{HttpReleaseFeed, ReleaseFeed, DEFAULT_FEED_URL};
pub use manager::{InstallLayout, StagedUpdate, UpdateManager, UpdateState};
pub use selector::{platform_asset_suffix, select_update, UpdateDecision};
pub use version::{compare, Version, VersionParseError};

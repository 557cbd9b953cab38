//! Release feed client.

use super::error::UpdateError;
use crate::models::ReleaseDescriptor;
use log::{debug, warn};
use std::thread;
use std::time::Duration;

pub const DEFAULT_FEED_URL: &str = "https://api.github.com/repos/XenonYTDE/YoutubeDownloader/releases";

const USER_AGENT: &str = concat!("TubeFetch/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_ATTEMPTS: u32 = 2;

/// Source of published releases.
pub trait ReleaseFeed: Send + Sync {
    fn fetch_releases(&self) -> Result<Vec<ReleaseDescriptor>, UpdateError>;
}

/// Reads the first page of a GitHub-style releases endpoint.
pub struct HttpReleaseFeed {
    url: String,
    agent: ureq::Agent,
}

impl HttpReleaseFeed {
    pub fn new(url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build();

        Self {
            url: url.into(),
            agent,
        }
    }

    fn fetch_once(&self) -> Result<Vec<ReleaseDescriptor>, String> {
        let response = self
            .agent
            .get(&self.url)
            .set("Accept", "application/vnd.github+json")
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => format!("Release feed returned HTTP {}", code),
                other => format!("Release feed unreachable: {}", other),
            })?;

        response
            .into_json::<Vec<ReleaseDescriptor>>()
            .map_err(|e| format!("Release feed returned invalid JSON: {}", e))
    }
}

impl Default for HttpReleaseFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_URL)
    }
}

impl ReleaseFeed for HttpReleaseFeed {
    fn fetch_releases(&self) -> Result<Vec<ReleaseDescriptor>, UpdateError> {
        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            match self.fetch_once() {
                Ok(releases) => {
                    debug!("Release feed returned {} releases", releases.len());
                    return Ok(releases);
                }
                Err(e) => {
                    warn!("Release feed attempt {}/{} failed: {}", attempt, MAX_ATTEMPTS, e);
                    last_error = e;
                    if attempt < MAX_ATTEMPTS {
                        thread::sleep(RETRY_DELAY);
                    }
                }
            }
        }

        Err(UpdateError::CheckFailed(last_error))
    }
}

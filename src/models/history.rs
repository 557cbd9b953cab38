// Download history data model
use super::MediaKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub title: String,
    pub url: String,
    pub file_path: String,
    pub kind: MediaKind,
    pub downloaded_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(title: String, url: String, file_path: String, kind: MediaKind) -> Self {
        Self {
            title,
            url,
            file_path,
            kind,
            downloaded_at: Utc::now(),
        }
    }
}

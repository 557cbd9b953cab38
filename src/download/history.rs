// Download history, newest first, persisted as a whole list on every change

use crate::file_manager::{JsonStore, StoreError};
use crate::models::HistoryRecord;
use log::{info, warn};
use std::path::PathBuf;

pub struct HistoryStore {
    store: JsonStore<Vec<HistoryRecord>>,
    records: Vec<HistoryRecord>,
}

impl HistoryStore {
    /// Loads the history file. A missing file is an empty history; an
    /// unreadable one is logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = JsonStore::new(path);
        let records = match store.load() {
            Ok(records) => records,
            Err(e) => {
                warn!("Discarding unreadable download history: {}", e);
                Vec::new()
            }
        };
        info!("Loaded {} history entries", records.len());
        Self { store, records }
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Places `record` at index 0 and rewrites the file.
    pub fn insert(&mut self, record: HistoryRecord) -> Result<(), StoreError> {
        self.records.insert(0, record);
        if let Err(e) = self.store.save(&self.records) {
            self.records.remove(0);
            return Err(e);
        }
        Ok(())
    }

    /// Removes the first entry equal to `record`. Returns whether one was found.
    pub fn remove(&mut self, record: &HistoryRecord) -> Result<bool, StoreError> {
        match self.records.iter().position(|r| r == record) {
            Some(index) => self.remove_at(index).map(|removed| removed.is_some()),
            None => Ok(false),
        }
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Option<HistoryRecord>, StoreError> {
        if index >= self.records.len() {
            return Ok(None);
        }
        let removed = self.records.remove(index);
        if let Err(e) = self.store.save(&self.records) {
            self.records.insert(index, removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    pub fn clear(&mut self) -> Result<usize, StoreError> {
        let previous = std::mem::take(&mut self.records);
        if let Err(e) = self.store.save(&self.records) {
            self.records = previous;
            return Err(e);
        }
        Ok(previous.len())
    }
}

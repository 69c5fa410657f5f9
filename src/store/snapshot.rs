use super::{DataStore, StoreError};
use crate::model::{Collection, Record};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Whole-dataset JSON document: `{pis, sponsors, files}`. Also the shape of
/// legacy hosted-store exports, whose extra columns are carried through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub pis: Vec<Record>,
    #[serde(default)]
    pub sponsors: Vec<Record>,
    #[serde(default)]
    pub files: Vec<Record>,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path).map_err(|e| snapshot_err(path, e))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&text).map_err(|e| snapshot_err(path, e))
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| snapshot_err(path, e))?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|e| snapshot_err(path, e))?;
        std::fs::write(path, text).map_err(|e| snapshot_err(path, e))
    }

    /// Reads every collection of a store.
    pub fn collect(store: &dyn DataStore) -> Result<Self, StoreError> {
        Ok(Self {
            pis: store.list_all(Collection::Pis)?,
            sponsors: store.list_all(Collection::Sponsors)?,
            files: store.list_all(Collection::Files)?,
        })
    }

    pub fn records(&self, collection: Collection) -> &Vec<Record> {
        match collection {
            Collection::Pis => &self.pis,
            Collection::Sponsors => &self.sponsors,
            Collection::Files => &self.files,
        }
    }

    pub fn records_mut(&mut self, collection: Collection) -> &mut Vec<Record> {
        match collection {
            Collection::Pis => &mut self.pis,
            Collection::Sponsors => &mut self.sponsors,
            Collection::Files => &mut self.files,
        }
    }

    pub fn counts(&self) -> serde_json::Value {
        serde_json::json!({
            "pis": self.pis.len(),
            "sponsors": self.sponsors.len(),
            "files": self.files.len(),
        })
    }
}

fn snapshot_err(path: &Path, e: impl std::fmt::Display) -> StoreError {
    StoreError::Snapshot {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

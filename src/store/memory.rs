use super::{DataStore, Snapshot, StoreError};
use crate::model::{Collection, Record};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// In-process store for development and tests. When opened on a snapshot
/// file, every mutation is written back to it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Snapshot,
    persist_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(data: Snapshot) -> Self {
        Self {
            data,
            persist_path: None,
        }
    }

    /// Loads the snapshot if the file exists; a missing file starts empty and
    /// is created on first write.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let data = if path.exists() {
            Snapshot::load(path)?
        } else {
            Snapshot::default()
        };
        Ok(Self {
            persist_path: Some(path.to_path_buf()),
            ..Self::from_snapshot(data)
        })
    }

    /// Installs `next` only once it is safely on disk, so a failed save
    /// leaves the store exactly as it was.
    /// Like `open`, but a missing file is an error. Used where the snapshot
    /// is something to read from, such as a migration source.
    pub fn open_existing(path: &Path) -> Result<Self, StoreError> {
        if !path.is_file() {
            return Err(StoreError::Snapshot {
                path: path.to_path_buf(),
                message: "no such snapshot file".into(),
            });
        }
        Self::open(path)
    }

    fn commit(&mut self, next: Snapshot) -> Result<(), StoreError> {
        if let Some(p) = &self.persist_path {
            next.save(p)?;
        }
        self.data = next;
        Ok(())
    }

    fn check_constraints(
        &self,
        collection: Collection,
        id: Option<&str>,
        fields: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        match collection {
            Collection::Pis | Collection::Sponsors => {
                let Some(name) = fields.get("name").and_then(|v| v.as_str()) else {
                    return Ok(());
                };
                if name.trim().is_empty() {
                    return Err(StoreError::rejected(collection, "name cannot be blank"));
                }
                let taken = self
                    .data
                    .records(collection)
                    .iter()
                    .any(|r| Some(r.id.as_str()) != id && r.str_field("name") == Some(name));
                if taken {
                    return Err(StoreError::rejected(
                        collection,
                        format!("name \"{name}\" must be unique"),
                    ));
                }
            }
            Collection::Files => {
                for (field, target) in [("pi_id", Collection::Pis), ("sponsor_id", Collection::Sponsors)] {
                    let Some(v) = fields.get(field) else {
                        continue;
                    };
                    let ref_id = v.as_str().unwrap_or_default();
                    if !self.data.records(target).iter().any(|r| r.id == ref_id) {
                        return Err(StoreError::rejected(
                            collection,
                            format!("{field} does not reference an existing {}", target.label()),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

impl DataStore for MemoryStore {
    fn describe(&self) -> String {
        match &self.persist_path {
            Some(p) => format!("memory:{}", p.to_string_lossy()),
            None => "memory".to_string(),
        }
    }

    fn create(&mut self, collection: Collection, fields: &Map<String, Value>) -> Result<Record, StoreError> {
        self.check_constraints(collection, None, fields)?;
        let mut fields = fields.clone();
        fields.remove("id");
        let record = Record::new(Uuid::new_v4().to_string(), fields);
        let mut next = self.data.clone();
        next.records_mut(collection).push(record.clone());
        self.commit(next)?;
        Ok(record)
    }

    fn update(
        &mut self,
        collection: Collection,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<Record, StoreError> {
        self.check_constraints(collection, Some(id), patch)?;
        let mut next = self.data.clone();
        let record = next
            .records_mut(collection)
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        for (k, v) in patch {
            if k != "id" {
                record.fields.insert(k.clone(), v.clone());
            }
        }
        let updated = record.clone();
        self.commit(next)?;
        Ok(updated)
    }

    fn find_first(&self, collection: Collection, field: &str, value: &str) -> Result<Record, StoreError> {
        self.data
            .records(collection)
            .iter()
            .find(|r| {
                if field == "id" {
                    r.id == value
                } else {
                    r.fields.get(field).and_then(|v| v.as_str()) == Some(value)
                }
            })
            .cloned()
            .ok_or_else(|| StoreError::not_found(collection, format!("{field}={value}")))
    }

    fn list_all(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        Ok(self.data.records(collection).clone())
    }

    fn delete(&mut self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let mut next = self.data.clone();
        let records = next.records_mut(collection);
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(StoreError::not_found(collection, id));
        }
        self.commit(next)
    }
}

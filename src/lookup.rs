use crate::model::Named;
use crate::normalize::{clean_value, normalize_name};
use std::collections::HashMap;

/// Normalized name -> store-local id. Keys are always `normalize_name`
/// output; the first name inserted for a key wins and later variants resolve
/// to the same id.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    ids: HashMap<String, String>,
}

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a full store listing. Records without a usable name are ignored.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Named>) -> Self {
        let mut index = Self::new();
        for r in records {
            index.insert(&r.name, r.id.clone());
        }
        index
    }

    /// Returns false (and keeps the existing id) when the key is taken.
    pub fn insert(&mut self, name: &str, id: impl Into<String>) -> bool {
        let key = normalize_name(name);
        if key.is_empty() || self.ids.contains_key(&key) {
            return false;
        }
        self.ids.insert(key, id.into());
        true
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.ids.get(&normalize_name(name)).map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ids.contains_key(&normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// First occurrence of each normalized name in batch order, as
/// `(row, stored name)`. Blank names are dropped.
pub fn unique_names<'a>(rows: impl IntoIterator<Item = (usize, &'a str)>) -> Vec<(usize, String)> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for (row, raw) in rows {
        let Some(name) = clean_value(raw) else {
            continue;
        };
        if seen.insert(normalize_name(&name)) {
            out.push((row, name));
        }
    }
    out
}

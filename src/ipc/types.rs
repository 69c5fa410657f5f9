use crate::store::{open_store, DataStore, StoreConfig, StoreError};
use crate::wizard::ImportWizard;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub store: Option<Box<dyn DataStore>>,
    pub store_config: Option<StoreConfig>,
    pub wizard: ImportWizard,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            store: None,
            store_config: None,
            wizard: ImportWizard::new(),
        }
    }

    /// Opens and installs a store. On failure the previous store stays.
    pub fn select_store(&mut self, config: StoreConfig) -> Result<(), StoreError> {
        let store = open_store(&config)?;
        self.store = Some(store);
        self.store_config = Some(config);
        self.wizard.reset();
        Ok(())
    }

    pub fn store_description(&self) -> Option<String> {
        self.store.as_ref().map(|s| s.describe())
    }
}

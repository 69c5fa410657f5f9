mod memory;
mod pocketbase;
mod snapshot;
mod sqlite;

pub use memory::MemoryStore;
pub use pocketbase::PocketBaseStore;
pub use snapshot::Snapshot;
pub use sqlite::SqliteStore;

use crate::api_client::ApiError;
use crate::model::{Collection, Record};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection} record not found: {what}")]
    NotFound { collection: Collection, what: String },
    #[error("{collection} write rejected: {message}")]
    Rejected {
        collection: Collection,
        message: String,
    },
    #[error("invalid store configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Api(ApiError),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("snapshot {path}: {message}")]
    Snapshot { path: PathBuf, message: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn not_found(collection: Collection, what: impl Into<String>) -> Self {
        StoreError::NotFound {
            collection,
            what: what.into(),
        }
    }

    pub fn rejected(collection: Collection, message: impl Into<String>) -> Self {
        StoreError::Rejected {
            collection,
            message: message.into(),
        }
    }
}

/// The persistence capability the import and migration engines write
/// through. Calls are blocking and made one at a time.
pub trait DataStore {
    /// Human-readable identity, e.g. `sqlite:/path/to/file`.
    fn describe(&self) -> String;

    fn create(&mut self, collection: Collection, fields: &Map<String, Value>) -> Result<Record, StoreError>;

    fn update(
        &mut self,
        collection: Collection,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<Record, StoreError>;

    /// First record whose `field` equals `value` exactly, or
    /// `StoreError::NotFound`.
    fn find_first(&self, collection: Collection, field: &str, value: &str) -> Result<Record, StoreError>;

    fn list_all(&self, collection: Collection) -> Result<Vec<Record>, StoreError>;

    fn delete(&mut self, collection: Collection, id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Sqlite,
    PocketBase,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// Snapshot file for `memory`, database file for `sqlite`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl StoreConfig {
    pub fn new(kind: StoreKind) -> Self {
        Self {
            kind,
            path: None,
            url: None,
            admin_email: None,
            admin_password: None,
            timeout_secs: None,
        }
    }

    pub fn with_credentials(mut self, email: Option<String>, password: Option<String>) -> Self {
        if email.is_some() {
            self.admin_email = email;
        }
        if password.is_some() {
            self.admin_password = password;
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

/// `memory`, `memory:<snapshot.json>`, `sqlite:<file>`, `pocketbase:<url>`.
impl FromStr for StoreConfig {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (kind, rest) = match s.split_once(':') {
            Some((k, r)) => (k, Some(r.trim())),
            None => (s, None),
        };
        let rest = rest.filter(|r| !r.is_empty());
        match kind.to_ascii_lowercase().as_str() {
            "memory" | "mock" => Ok(Self {
                path: rest.map(PathBuf::from),
                ..Self::new(StoreKind::Memory)
            }),
            "sqlite" => {
                let path = rest.ok_or_else(|| StoreError::Config("sqlite needs a file path".into()))?;
                Ok(Self {
                    path: Some(PathBuf::from(path)),
                    ..Self::new(StoreKind::Sqlite)
                })
            }
            "pocketbase" => {
                let url = rest.ok_or_else(|| StoreError::Config("pocketbase needs a base url".into()))?;
                Ok(Self {
                    url: Some(url.to_string()),
                    ..Self::new(StoreKind::PocketBase)
                })
            }
            other => Err(StoreError::Config(format!("unknown store kind: {other}"))),
        }
    }
}

/// Resolves the configured backend once; callers hold the trait object.
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn DataStore>, StoreError> {
    let store: Box<dyn DataStore> = match config.kind {
        StoreKind::Memory => match &config.path {
            Some(path) => Box::new(MemoryStore::open(path)?),
            None => Box::new(MemoryStore::new()),
        },
        StoreKind::Sqlite => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| StoreError::Config("sqlite store requires path".into()))?;
            Box::new(SqliteStore::open(path)?)
        }
        StoreKind::PocketBase => Box::new(PocketBaseStore::open(config)?),
    };
    tracing::info!(store = %store.describe(), "store opened");
    Ok(store)
}

/// Opens a store that will only be read from. A memory source must name a
/// snapshot file that exists; an empty stand-in would migrate nothing.
pub fn open_source_store(config: &StoreConfig) -> Result<Box<dyn DataStore>, StoreError> {
    match (config.kind, &config.path) {
        (StoreKind::Memory, Some(path)) => {
            let store = MemoryStore::open_existing(path)?;
            tracing::info!(store = %store.describe(), "source store opened");
            Ok(Box::new(store))
        }
        (StoreKind::Memory, None) => Err(StoreError::Config(
            "a memory source needs a snapshot file (memory:<path>)".into(),
        )),
        _ => open_store(config),
    }
}

use super::{DataStore, StoreError};
use crate::model::{Collection, Record};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const NAMED_COLUMNS: &[&str] = &["name"];
const FILE_COLUMNS: &[&str] = &[
    "db_no",
    "status",
    "date_received",
    "date_status_change",
    "notes",
    "external_link",
    "cayuse",
    "to_set_up",
    "pi_id",
    "sponsor_id",
];

fn columns(collection: Collection) -> &'static [&'static str] {
    match collection {
        Collection::Pis | Collection::Sponsors => NAMED_COLUMNS,
        Collection::Files => FILE_COLUMNS,
    }
}

pub fn open_db(path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pis(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            created TEXT,
            updated TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sponsors(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            created TEXT,
            updated TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS files(
            id TEXT PRIMARY KEY,
            db_no TEXT NOT NULL,
            status TEXT NOT NULL,
            date_received TEXT,
            date_status_change TEXT,
            notes TEXT,
            external_link TEXT,
            cayuse TEXT,
            to_set_up TEXT,
            pi_id TEXT NOT NULL,
            sponsor_id TEXT NOT NULL,
            created TEXT,
            updated TEXT,
            FOREIGN KEY(pi_id) REFERENCES pis(id),
            FOREIGN KEY(sponsor_id) REFERENCES sponsors(id)
        )",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_files_db_no ON files(db_no)", [])?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_files_pi ON files(pi_id)", [])?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_files_sponsor ON files(sponsor_id)",
        [],
    )?;

    ensure_files_to_set_up(&conn)?;
    Ok(conn)
}

// Databases created before to_set_up was tracked lack the column.
fn ensure_files_to_set_up(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "files", "to_set_up")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE files ADD COLUMN to_set_up TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn to_sql(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        other => SqlValue::Text(other.to_string()),
    }
}

pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = open_db(path).map_err(|e| StoreError::Config(format!("{e:#}")))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    fn map_write_err(collection: Collection, e: rusqlite::Error) -> StoreError {
        match &e {
            rusqlite::Error::SqliteFailure(f, msg) if f.code == ErrorCode::ConstraintViolation => {
                StoreError::rejected(collection, msg.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => StoreError::Sqlite(e),
        }
    }

    fn select_sql(collection: Collection) -> String {
        format!(
            "SELECT id, {} FROM {}",
            columns(collection).join(", "),
            collection.as_str()
        )
    }

    fn read_record(collection: Collection, row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
        let id: String = row.get(0)?;
        let mut fields = Map::new();
        for (i, col) in columns(collection).iter().enumerate() {
            let v: Option<String> = row.get(i + 1)?;
            fields.insert((*col).to_string(), v.map(Value::String).unwrap_or(Value::Null));
        }
        Ok(Record::new(id, fields))
    }

    fn get_by_id(&self, collection: Collection, id: &str) -> Result<Record, StoreError> {
        self.find_first(collection, "id", id)
    }

    /// Known columns present in `fields`, in table order.
    fn writable<'a>(collection: Collection, fields: &'a Map<String, Value>) -> Vec<(&'static str, &'a Value)> {
        columns(collection)
            .iter()
            .filter_map(|c| fields.get(*c).map(|v| (*c, v)))
            .collect()
    }
}

impl DataStore for SqliteStore {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.to_string_lossy())
    }

    fn create(&mut self, collection: Collection, fields: &Map<String, Value>) -> Result<Record, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let cols = Self::writable(collection, fields);

        let mut names = vec!["id"];
        let mut values = vec![SqlValue::Text(id.clone())];
        for &(c, v) in &cols {
            names.push(c);
            values.push(to_sql(v));
        }
        names.push("created");
        values.push(SqlValue::Text(now.clone()));
        names.push("updated");
        values.push(SqlValue::Text(now));

        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "INSERT INTO {}({}) VALUES({})",
            collection.as_str(),
            names.join(", "),
            placeholders
        );
        self.conn
            .execute(&sql, params_from_iter(values))
            .map_err(|e| Self::map_write_err(collection, e))?;
        self.get_by_id(collection, &id)
    }

    fn update(
        &mut self,
        collection: Collection,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<Record, StoreError> {
        let cols = Self::writable(collection, patch);
        let mut sets = cols.iter().map(|(c, _)| format!("{c} = ?")).collect::<Vec<_>>();
        sets.push("updated = ?".to_string());
        let mut values = cols.iter().map(|(_, v)| to_sql(v)).collect::<Vec<_>>();
        values.push(SqlValue::Text(Utc::now().to_rfc3339()));
        values.push(SqlValue::Text(id.to_string()));

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            collection.as_str(),
            sets.join(", ")
        );
        let changed = self
            .conn
            .execute(&sql, params_from_iter(values))
            .map_err(|e| Self::map_write_err(collection, e))?;
        if changed == 0 {
            return Err(StoreError::not_found(collection, id));
        }
        self.get_by_id(collection, id)
    }

    fn find_first(&self, collection: Collection, field: &str, value: &str) -> Result<Record, StoreError> {
        if field != "id" && !columns(collection).contains(&field) {
            return Err(StoreError::Config(format!(
                "{} has no field {}",
                collection.as_str(),
                field
            )));
        }
        let sql = format!(
            "{} WHERE {} = ? ORDER BY rowid LIMIT 1",
            Self::select_sql(collection),
            field
        );
        self.conn
            .query_row(&sql, [value], |r| Self::read_record(collection, r))
            .optional()?
            .ok_or_else(|| StoreError::not_found(collection, format!("{field}={value}")))
    }

    fn list_all(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        let sql = format!("{} ORDER BY rowid", Self::select_sql(collection));
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([], |r| Self::read_record(collection, r))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn delete(&mut self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = ?", collection.as_str());
        let changed = self
            .conn
            .execute(&sql, [id])
            .map_err(|e| Self::map_write_err(collection, e))?;
        if changed == 0 {
            return Err(StoreError::not_found(collection, id));
        }
        Ok(())
    }
}

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Pis,
    Sponsors,
    Files,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Pis, Collection::Sponsors, Collection::Files];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Pis => "pis",
            Collection::Sponsors => "sponsors",
            Collection::Files => "files",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pis" => Some(Collection::Pis),
            "sponsors" => Some(Collection::Sponsors),
            "files" => Some(Collection::Files),
            _ => None,
        }
    }

    /// Singular label used in log lines and error messages.
    pub fn label(self) -> &'static str {
        match self {
            Collection::Pis => "PI",
            Collection::Sponsors => "Sponsor",
            Collection::Files => "File",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proposal lifecycle status. Wire values are the labels shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    In,
    Pending,
    #[serde(rename = "Pending Signatures")]
    PendingSignatures,
    Process,
    Done,
    #[serde(rename = "On Hold")]
    OnHold,
    Withdrawn,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::In,
        Status::Pending,
        Status::PendingSignatures,
        Status::Process,
        Status::Done,
        Status::OnHold,
        Status::Withdrawn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::In => "In",
            Status::Pending => "Pending",
            Status::PendingSignatures => "Pending Signatures",
            Status::Process => "Process",
            Status::Done => "Done",
            Status::OnHold => "On Hold",
            Status::Withdrawn => "Withdrawn",
        }
    }

    /// Exact match against the canonical labels. Synonyms are handled by
    /// `normalize::normalize_status` before this is called.
    pub fn from_label(label: &str) -> Option<Self> {
        Status::ALL.into_iter().find(|s| s.as_str() == label)
    }

    pub fn permitted_labels() -> String {
        Status::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored record: an opaque store-local id plus the collection's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Non-empty string value of a field, if any.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

/// View over a PI or Sponsor record; both collections share the shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Named {
    pub id: String,
    pub name: String,
}

impl Named {
    pub fn from_record(record: &Record) -> Option<Self> {
        let name = record.str_field("name")?;
        Some(Self {
            id: record.id.clone(),
            name: name.to_string(),
        })
    }

    pub fn fields(name: &str) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("name".into(), json!(name));
        m
    }
}

/// Fully resolved proposal ready to be written to a store.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalFields {
    pub db_no: String,
    pub status: Status,
    pub pi_id: String,
    pub sponsor_id: String,
    pub date_received: Option<NaiveDate>,
    pub date_status_change: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub external_link: Option<String>,
    pub cayuse: Option<String>,
    pub to_set_up: Option<NaiveDate>,
}

impl ProposalFields {
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("db_no".into(), json!(self.db_no));
        m.insert("status".into(), json!(self.status.as_str()));
        m.insert("pi_id".into(), json!(self.pi_id));
        m.insert("sponsor_id".into(), json!(self.sponsor_id));
        m.insert(
            "date_received".into(),
            json!(self.date_received.map(format_date)),
        );
        m.insert(
            "date_status_change".into(),
            json!(self.date_status_change.map(format_timestamp)),
        );
        m.insert("notes".into(), json!(self.notes));
        m.insert("external_link".into(), json!(self.external_link));
        m.insert("cayuse".into(), json!(self.cayuse));
        m.insert("to_set_up".into(), json!(self.to_set_up.map(format_date)));
        m
    }
}

pub fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    MissingField,
    InvalidEnum,
    UnresolvedReference,
    InvalidDate,
    DuplicateKey,
    EmptyName,
    RecordWrite,
    ReferenceResolution,
}

/// One row-attributed problem: a blocking validation error, a warning, or a
/// per-record write failure recorded in an outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub row: usize,
    pub field: String,
    pub code: IssueCode,
    pub message: String,
}

impl Issue {
    pub fn new(row: usize, field: &str, code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            row,
            field: field.to_string(),
            code,
            message: message.into(),
        }
    }
}

/// Emitted after each record processed so a caller can render progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub stage: String,
    pub current: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(stage: &str, current: usize, total: usize) -> Self {
        Self {
            stage: stage.to_string(),
            current,
            total,
        }
    }
}

/// Counts processed records across stages and reports each one.
pub struct ProgressCounter<'a> {
    current: usize,
    total: usize,
    sink: &'a mut dyn FnMut(&Progress),
}

impl<'a> ProgressCounter<'a> {
    pub fn new(total: usize, sink: &'a mut dyn FnMut(&Progress)) -> Self {
        Self {
            current: 0,
            total,
            sink,
        }
    }

    pub fn tick(&mut self, stage: &str) {
        self.current += 1;
        (self.sink)(&Progress::new(stage, self.current, self.total));
    }
}

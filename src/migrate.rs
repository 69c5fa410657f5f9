use crate::lookup::NameIndex;
use crate::model::{format_date, format_timestamp, Collection, Issue, IssueCode, Named, Progress, ProgressCounter, Record, Status};
use crate::normalize::{clean_value, normalize_name, normalize_status, parse_date, parse_timestamp};
use crate::store::{DataStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

pub const STAGE_PIS: &str = "Migrating PIs...";
pub const STAGE_SPONSORS: &str = "Migrating Sponsors...";
pub const STAGE_FILES: &str = "Migrating Files...";

/// How existing destination records are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPolicy {
    /// Destination assumed empty: every PI, Sponsor and File is created.
    #[default]
    Fresh,
    /// PIs and Sponsors reuse a destination record with the same normalized
    /// name; Files upsert by db_no.
    Reconcile,
}

impl FromStr for MigrationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fresh" => Ok(MigrationPolicy::Fresh),
            "reconcile" => Ok(MigrationPolicy::Reconcile),
            other => Err(format!("unknown migration policy: {other} (expected fresh or reconcile)")),
        }
    }
}

impl fmt::Display for MigrationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MigrationPolicy::Fresh => "fresh",
            MigrationPolicy::Reconcile => "reconcile",
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    pub policy: MigrationPolicy,
    /// Only Files whose normalized status equals this are migrated.
    pub status_filter: Option<Status>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub found: usize,
    pub created: usize,
    pub reused: usize,
    pub updated: usize,
    pub filtered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationOutcome {
    pub policy: MigrationPolicy,
    pub pis: Tally,
    pub sponsors: Tally,
    pub files: Tally,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

/// Source id -> name, plus the destination index keyed by normalized name.
struct NameMap {
    source_names: HashMap<String, String>,
    dest: NameIndex,
}

impl NameMap {
    fn dest_id(&self, source_id: &str) -> Option<&str> {
        let name = self.source_names.get(source_id)?;
        self.dest.resolve(name)
    }
}

/// Copies every PI, Sponsor and File from `source` into `dest`, translating
/// foreign keys through names. Only a failed listing aborts; per-record
/// failures land in the outcome.
pub fn migrate(
    source: &dyn DataStore,
    dest: &mut dyn DataStore,
    options: &MigrationOptions,
    progress: &mut dyn FnMut(&Progress),
) -> Result<MigrationOutcome, StoreError> {
    tracing::info!(
        source = %source.describe(),
        dest = %dest.describe(),
        policy = %options.policy,
        "starting migration"
    );
    let pis = source.list_all(Collection::Pis)?;
    let sponsors = source.list_all(Collection::Sponsors)?;
    let files = source.list_all(Collection::Files)?;

    let mut outcome = MigrationOutcome {
        policy: options.policy,
        ..Default::default()
    };
    if options.policy == MigrationPolicy::Fresh {
        for collection in Collection::ALL {
            let existing = dest.list_all(collection)?.len();
            if existing > 0 {
                let message = format!(
                    "destination already holds {existing} {collection} records; fresh policy may create duplicates"
                );
                tracing::warn!("{}", message);
                outcome
                    .warnings
                    .push(Issue::new(0, collection.as_str(), IssueCode::DuplicateKey, message));
            }
        }
    }

    let mut counter = ProgressCounter::new(pis.len() + sponsors.len() + files.len(), progress);

    let pi_map = migrate_named(dest, Collection::Pis, &pis, options.policy, &mut outcome, &mut counter)?;
    let sponsor_map = migrate_named(
        dest,
        Collection::Sponsors,
        &sponsors,
        options.policy,
        &mut outcome,
        &mut counter,
    )?;

    tracing::info!(count = files.len(), "{}", STAGE_FILES);
    outcome.files.found = files.len();
    for (i, record) in files.iter().enumerate() {
        migrate_file(dest, i + 1, record, &pi_map, &sponsor_map, options, &mut outcome);
        counter.tick(STAGE_FILES);
    }

    tracing::info!(
        pis = outcome.pis.created + outcome.pis.reused,
        sponsors = outcome.sponsors.created + outcome.sponsors.reused,
        files_created = outcome.files.created,
        files_updated = outcome.files.updated,
        errors = outcome.errors.len(),
        "migration finished"
    );
    Ok(outcome)
}

fn tally_mut(outcome: &mut MigrationOutcome, collection: Collection) -> &mut Tally {
    match collection {
        Collection::Pis => &mut outcome.pis,
        Collection::Sponsors => &mut outcome.sponsors,
        Collection::Files => &mut outcome.files,
    }
}

fn migrate_named(
    dest: &mut dyn DataStore,
    collection: Collection,
    records: &[Record],
    policy: MigrationPolicy,
    outcome: &mut MigrationOutcome,
    counter: &mut ProgressCounter<'_>,
) -> Result<NameMap, StoreError> {
    let stage = if collection == Collection::Pis {
        STAGE_PIS
    } else {
        STAGE_SPONSORS
    };
    tracing::info!(count = records.len(), "{}", stage);
    tally_mut(outcome, collection).found = records.len();

    let mut map = NameMap {
        source_names: HashMap::new(),
        dest: NameIndex::new(),
    };
    // Reconcile matches destination names the same way batch names match.
    let existing = match policy {
        MigrationPolicy::Fresh => NameIndex::new(),
        MigrationPolicy::Reconcile => {
            let named: Vec<Named> = dest
                .list_all(collection)?
                .iter()
                .filter_map(Named::from_record)
                .collect();
            NameIndex::from_records(&named)
        }
    };
    if !existing.is_empty() {
        tracing::debug!(count = existing.len(), "{} names already in destination", collection.label());
    }

    let mut seen = HashSet::new();
    for (i, record) in records.iter().enumerate() {
        let row = i + 1;
        let Some(named) = Named::from_record(record) else {
            let message = format!("{} {} has no name; skipped", collection.label(), record.id);
            tracing::warn!("{}", message);
            outcome.warnings.push(Issue::new(row, "name", IssueCode::EmptyName, message));
            tally_mut(outcome, collection).failed += 1;
            counter.tick(stage);
            continue;
        };
        let name = named.name.trim().to_string();
        map.source_names.insert(named.id, name.clone());

        // Later variants of a name share the first variant's fate.
        if !seen.insert(normalize_name(&name)) {
            let tally = tally_mut(outcome, collection);
            if map.dest.contains(&name) {
                tally.reused += 1;
            } else {
                tally.failed += 1;
            }
            counter.tick(stage);
            continue;
        }

        let written = match existing.resolve(&name) {
            Some(id) => Ok((id.to_string(), false)),
            None => dest.create(collection, &Named::fields(&name)).map(|r| (r.id, true)),
        };
        match written {
            Ok((id, created)) => {
                let tally = tally_mut(outcome, collection);
                if created {
                    tally.created += 1;
                } else {
                    tally.reused += 1;
                }
                map.dest.insert(&name, id);
            }
            Err(e) => {
                let message = format!("Failed to migrate {} {name}: {e}", collection.label());
                tracing::warn!("{}", message);
                outcome.errors.push(Issue::new(row, "name", IssueCode::RecordWrite, message));
                tally_mut(outcome, collection).failed += 1;
            }
        }
        counter.tick(stage);
    }
    Ok(map)
}

fn fail_file(outcome: &mut MigrationOutcome, row: usize, field: &str, code: IssueCode, message: String) {
    tracing::warn!(row, field, "{}", message);
    outcome.files.failed += 1;
    outcome.errors.push(Issue::new(row, field, code, message));
}

fn migrate_file(
    dest: &mut dyn DataStore,
    row: usize,
    record: &Record,
    pi_map: &NameMap,
    sponsor_map: &NameMap,
    options: &MigrationOptions,
    outcome: &mut MigrationOutcome,
) {
    let text = |key: &str| record.fields.get(key).and_then(|v| v.as_str()).and_then(clean_value);

    let Some(db_no) = text("db_no") else {
        let message = format!("File {} has no db_no", record.id);
        return fail_file(outcome, row, "db_no", IssueCode::MissingField, message);
    };

    let label = text("status")
        .map(|s| normalize_status(&s))
        .unwrap_or_else(|| Status::In.as_str().to_string());
    let Some(status) = Status::from_label(&label) else {
        let message = format!(
            "File {db_no}: Invalid status: {label}. Must be one of: {}",
            Status::permitted_labels()
        );
        return fail_file(outcome, row, "status", IssueCode::InvalidEnum, message);
    };
    if options.status_filter.is_some_and(|f| f != status) {
        outcome.files.filtered += 1;
        return;
    }

    let mut ids = Vec::with_capacity(2);
    for (field, label, map) in [("pi_id", "PI", pi_map), ("sponsor_id", "Sponsor", sponsor_map)] {
        let source_id = text(field).unwrap_or_default();
        match map.dest_id(&source_id) {
            Some(id) => ids.push(id.to_string()),
            None => {
                let message = format!("File {db_no}: no destination {label} for source id {source_id}");
                return fail_file(outcome, row, field, IssueCode::ReferenceResolution, message);
            }
        }
    }

    let mut fields = Map::new();
    fields.insert("db_no".into(), json!(db_no));
    fields.insert("status".into(), json!(status.as_str()));
    fields.insert("pi_id".into(), json!(ids[0]));
    fields.insert("sponsor_id".into(), json!(ids[1]));
    for key in ["notes", "external_link", "cayuse"] {
        fields.insert(key.into(), json!(text(key)));
    }
    for key in ["date_received", "to_set_up"] {
        let raw = text(key);
        let parsed = raw.as_deref().and_then(parse_date);
        if raw.is_some() && parsed.is_none() {
            outcome.warnings.push(Issue::new(
                row,
                key,
                IssueCode::InvalidDate,
                format!("File {db_no}: unparseable {key} treated as empty"),
            ));
        }
        fields.insert(key.into(), json!(parsed.map(format_date)));
    }
    let changed = text("date_status_change").and_then(|s| parse_timestamp(&s));
    fields.insert("date_status_change".into(), json!(changed.map(format_timestamp)));

    let written = match options.policy {
        MigrationPolicy::Fresh => dest.create(Collection::Files, &fields).map(|_| true),
        MigrationPolicy::Reconcile => match dest.find_first(Collection::Files, "db_no", &db_no) {
            Ok(existing) => dest.update(Collection::Files, &existing.id, &fields).map(|_| false),
            Err(e) if e.is_not_found() => dest.create(Collection::Files, &fields).map(|_| true),
            Err(e) => Err(e),
        },
    };
    match written {
        Ok(true) => outcome.files.created += 1,
        Ok(false) => outcome.files.updated += 1,
        Err(e) => fail_file(
            outcome,
            row,
            "db_no",
            IssueCode::RecordWrite,
            format!("Failed to migrate File {db_no}: {e}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Snapshot};

    fn rec(id: &str, fields: Value) -> Record {
        let Value::Object(map) = fields else {
            panic!("fields must be an object")
        };
        Record::new(id, map)
    }

    fn legacy_export() -> MemoryStore {
        MemoryStore::from_snapshot(Snapshot {
            pis: vec![
                rec("p1", json!({"name": "Smith, J."})),
                rec("p2", json!({"name": "smith, j. "})),
                rec("p3", json!({"name": "Doe"})),
            ],
            sponsors: vec![rec("s1", json!({"name": "NSF"}))],
            files: vec![
                rec(
                    "f1",
                    json!({"db_no": "100", "status": "Pending Signature", "pi_id": "p2", "sponsor_id": "s1",
                           "date_received": "2024-01-05", "created_at": "ignored"}),
                ),
                rec("f2", json!({"db_no": "101", "status": null, "pi_id": "p3", "sponsor_id": "s1"})),
                rec("f3", json!({"db_no": "102", "status": "Done", "pi_id": "gone", "sponsor_id": "s1"})),
            ],
        })
    }

    fn run(source: &MemoryStore, dest: &mut MemoryStore, options: &MigrationOptions) -> MigrationOutcome {
        migrate(source, dest, options, &mut |_: &Progress| {}).unwrap()
    }

    #[test]
    fn fresh_migration_remaps_ids_through_names() {
        let source = legacy_export();
        let mut dest = MemoryStore::new();
        let out = run(&source, &mut dest, &MigrationOptions::default());

        assert_eq!(out.pis.found, 3);
        assert_eq!(out.pis.created, 2);
        assert_eq!(out.pis.reused, 1);
        assert_eq!(out.files.created, 2);
        assert_eq!(out.files.failed, 1);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].code, IssueCode::ReferenceResolution);
        assert!(out.errors[0].message.contains("102"));

        let smith = dest.find_first(Collection::Pis, "name", "Smith, J.").unwrap();
        let f100 = dest.find_first(Collection::Files, "db_no", "100").unwrap();
        assert_eq!(f100.str_field("pi_id"), Some(smith.id.as_str()));
        assert_eq!(f100.str_field("status"), Some("Pending Signatures"));
        assert_eq!(f100.str_field("date_received"), Some("2024-01-05"));
        assert!(!f100.fields.contains_key("created_at"));

        let f101 = dest.find_first(Collection::Files, "db_no", "101").unwrap();
        assert_eq!(f101.str_field("status"), Some("In"));
    }

    #[test]
    fn rerunning_fresh_hits_unique_names() {
        let source = legacy_export();
        let mut dest = MemoryStore::new();
        run(&source, &mut dest, &MigrationOptions::default());
        let out = run(&source, &mut dest, &MigrationOptions::default());

        assert!(!out.warnings.is_empty());
        assert_eq!(out.pis.created, 0);
        assert_eq!(out.pis.failed, 3);
        assert_eq!(dest.list_all(Collection::Pis).unwrap().len(), 2);
    }

    #[test]
    fn rerunning_reconcile_creates_nothing_new() {
        let source = legacy_export();
        let mut dest = MemoryStore::new();
        let options = MigrationOptions {
            policy: MigrationPolicy::Reconcile,
            status_filter: None,
        };
        run(&source, &mut dest, &options);
        let out = run(&source, &mut dest, &options);

        assert_eq!(out.pis.created, 0);
        assert_eq!(out.pis.reused, 3);
        assert_eq!(out.sponsors.reused, 1);
        assert_eq!(out.files.created, 0);
        assert_eq!(out.files.updated, 2);
        assert_eq!(dest.list_all(Collection::Files).unwrap().len(), 2);
    }

    #[test]
    fn status_filter_matches_after_normalization() {
        let source = legacy_export();
        let mut dest = MemoryStore::new();
        let options = MigrationOptions {
            policy: MigrationPolicy::Fresh,
            status_filter: Some(Status::PendingSignatures),
        };
        let out = run(&source, &mut dest, &options);
        assert_eq!(out.files.created, 1);
        assert_eq!(out.files.filtered, 2);
        let files = dest.list_all(Collection::Files).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].str_field("db_no"), Some("100"));
    }

    #[test]
    fn policy_parses_from_cli_text() {
        assert_eq!("Reconcile".parse::<MigrationPolicy>(), Ok(MigrationPolicy::Reconcile));
        assert_eq!("fresh".parse::<MigrationPolicy>(), Ok(MigrationPolicy::Fresh));
        assert!("merge".parse::<MigrationPolicy>().is_err());
    }

    #[test]
    fn progress_counts_every_source_record() {
        let source = legacy_export();
        let mut dest = MemoryStore::new();
        let mut last = None;
        migrate(&source, &mut dest, &MigrationOptions::default(), &mut |p: &Progress| {
            last = Some(p.clone())
        })
        .unwrap();
        let last = last.unwrap();
        assert_eq!((last.current, last.total), (7, 7));
        assert_eq!(last.stage, STAGE_FILES);
    }
}

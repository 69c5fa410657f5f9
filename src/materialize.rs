use crate::batch::{ImportBatches, ProposalRow};
use crate::lookup::{unique_names, NameIndex};
use crate::model::{Collection, Issue, IssueCode, Named, Progress, ProgressCounter, ProposalFields};
use crate::normalize::normalize_proposal;
use crate::store::{DataStore, StoreError};
use chrono::Utc;
use serde::Serialize;

pub const STAGE_PIS: &str = "Creating PIs...";
pub const STAGE_SPONSORS: &str = "Creating Sponsors...";
pub const STAGE_FILES: &str = "Creating Files...";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub pis_created: usize,
    pub pis_reused: usize,
    pub sponsors_created: usize,
    pub sponsors_reused: usize,
    pub files_created: usize,
    pub files_updated: usize,
    pub skipped: usize,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

/// Reuse the record with this exact name, or create it. Only a NotFound
/// lookup leads to a create; any other lookup failure is returned.
pub fn ensure_named(
    store: &mut dyn DataStore,
    collection: Collection,
    name: &str,
) -> Result<(String, bool), StoreError> {
    match store.find_first(collection, "name", name) {
        Ok(existing) => Ok((existing.id, false)),
        Err(e) if e.is_not_found() => {
            let created = store.create(collection, &Named::fields(name))?;
            Ok((created.id, true))
        }
        Err(e) => Err(e),
    }
}

/// Writes PIs, then Sponsors, then Proposals. Per-record failures are
/// recorded in the outcome and never stop the batch.
pub fn materialize(
    store: &mut dyn DataStore,
    batches: &ImportBatches,
    progress: &mut dyn FnMut(&Progress),
) -> ImportOutcome {
    let pis = unique_names(batches.pis.iter().map(|r| (r.row, r.name.as_str())));
    let sponsors = unique_names(batches.sponsors.iter().map(|r| (r.row, r.sponsor.as_str())));
    let mut counter = ProgressCounter::new(pis.len() + sponsors.len() + batches.files.len(), progress);
    let mut outcome = ImportOutcome::default();

    tracing::info!(count = pis.len(), store = %store.describe(), "{}", STAGE_PIS);
    let mut pi_index = NameIndex::new();
    for (row, name) in &pis {
        match ensure_named(store, Collection::Pis, name) {
            Ok((id, created)) => {
                if created {
                    outcome.pis_created += 1;
                } else {
                    outcome.pis_reused += 1;
                }
                tracing::debug!(row, name = %name, created, "PI ready");
                pi_index.insert(name, id);
            }
            Err(e) => record_failure(&mut outcome, *row, "name", format!("Failed to create PI {name}: {e}")),
        }
        counter.tick(STAGE_PIS);
    }

    tracing::info!(count = sponsors.len(), "{}", STAGE_SPONSORS);
    let mut sponsor_index = NameIndex::new();
    for (row, name) in &sponsors {
        match ensure_named(store, Collection::Sponsors, name) {
            Ok((id, created)) => {
                if created {
                    outcome.sponsors_created += 1;
                } else {
                    outcome.sponsors_reused += 1;
                }
                tracing::debug!(row, name = %name, created, "Sponsor ready");
                sponsor_index.insert(name, id);
            }
            Err(e) => record_failure(
                &mut outcome,
                *row,
                "sponsor",
                format!("Failed to create Sponsor {name}: {e}"),
            ),
        }
        counter.tick(STAGE_SPONSORS);
    }

    tracing::info!(count = batches.files.len(), "{}", STAGE_FILES);
    for raw in &batches.files {
        import_file(store, raw, &mut pi_index, &mut sponsor_index, &mut outcome);
        counter.tick(STAGE_FILES);
    }

    tracing::info!(
        pis_created = outcome.pis_created,
        sponsors_created = outcome.sponsors_created,
        files_created = outcome.files_created,
        files_updated = outcome.files_updated,
        skipped = outcome.skipped,
        "import finished"
    );
    outcome
}

fn record_failure(outcome: &mut ImportOutcome, row: usize, field: &str, message: String) {
    tracing::warn!(row, field, "{}", message);
    outcome.skipped += 1;
    outcome.errors.push(Issue::new(row, field, IssueCode::RecordWrite, message));
}

/// Resolves from the run's index first, then from records already in the
/// store, so forced imports may reference existing PIs and Sponsors.
fn resolve(
    store: &dyn DataStore,
    index: &mut NameIndex,
    collection: Collection,
    name: &str,
) -> Result<Option<String>, StoreError> {
    if let Some(id) = index.resolve(name) {
        return Ok(Some(id.to_string()));
    }
    match store.find_first(collection, "name", name) {
        Ok(r) => {
            index.insert(name, r.id.clone());
            Ok(Some(r.id))
        }
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

fn import_file(
    store: &mut dyn DataStore,
    raw: &ProposalRow,
    pi_index: &mut NameIndex,
    sponsor_index: &mut NameIndex,
    outcome: &mut ImportOutcome,
) {
    let row = raw.row;
    let n = normalize_proposal(raw);
    outcome.warnings.extend(n.date_warnings());

    let Some(db_no) = n.db_no.clone() else {
        return record_failure(outcome, row, "db_no", "File without db_no skipped".into());
    };
    let Some(status) = n.status else {
        let shown = n.status_label.as_deref().unwrap_or("(empty)");
        return record_failure(outcome, row, "status", format!("File {db_no}: invalid status {shown}"));
    };

    let mut ids = Vec::with_capacity(2);
    for (field, label, collection, name, index) in [
        ("pi_name", "PI", Collection::Pis, &n.pi_name, &mut *pi_index),
        ("sponsor_name", "Sponsor", Collection::Sponsors, &n.sponsor_name, &mut *sponsor_index),
    ] {
        let name = name.as_deref().unwrap_or_default();
        match resolve(store, index, collection, name) {
            Ok(Some(id)) => ids.push(id),
            Ok(None) => {
                outcome.skipped += 1;
                let message = format!("File {db_no}: {label} not found: {name}");
                tracing::warn!(row, field, "{}", message);
                outcome
                    .errors
                    .push(Issue::new(row, field, IssueCode::ReferenceResolution, message));
                return;
            }
            Err(e) => {
                return record_failure(outcome, row, field, format!("File {db_no}: {label} lookup failed: {e}"));
            }
        }
    }
    let sponsor_id = ids.pop().unwrap_or_default();
    let pi_id = ids.pop().unwrap_or_default();

    let fields = ProposalFields {
        db_no: db_no.clone(),
        status,
        pi_id,
        sponsor_id,
        date_received: n.date_received.value,
        date_status_change: Some(n.date_status_change.value.unwrap_or_else(Utc::now)),
        notes: n.notes.clone(),
        external_link: n.external_link.clone(),
        cayuse: n.cayuse.clone(),
        to_set_up: n.to_set_up.value,
    }
    .to_fields();

    let written = match store.find_first(Collection::Files, "db_no", &db_no) {
        Ok(existing) => store.update(Collection::Files, &existing.id, &fields).map(|_| false),
        Err(e) if e.is_not_found() => store.create(Collection::Files, &fields).map(|_| true),
        Err(e) => Err(e),
    };
    match written {
        Ok(true) => {
            outcome.files_created += 1;
            tracing::debug!(row, db_no = %db_no, "file created");
        }
        Ok(false) => {
            outcome.files_updated += 1;
            tracing::debug!(row, db_no = %db_no, "file updated");
        }
        Err(e) => record_failure(outcome, row, "db_no", format!("Failed to write File {db_no}: {e}")),
    }
}

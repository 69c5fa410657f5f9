use crate::batch::ImportBatches;
use crate::model::{Issue, IssueCode, Status};
use crate::normalize::{clean_value, normalize_name, normalize_proposal};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub pis_to_create: usize,
    pub sponsors_to_create: usize,
    pub files_to_create: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub stats: ValidationStats,
}

impl ValidationReport {
    /// Import may only proceed when this holds.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks all three batches and collects every problem. Pure: no store is
/// consulted, so references resolve only against the companion batches.
pub fn validate(batches: &ImportBatches) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let pi_names = collect_names(
        batches.pis.iter().map(|r| (r.row, r.name.as_str())),
        "name",
        "PI",
        &mut warnings,
    );
    let sponsor_names = collect_names(
        batches.sponsors.iter().map(|r| (r.row, r.sponsor.as_str())),
        "sponsor",
        "Sponsor",
        &mut warnings,
    );

    let mut files_to_create = 0usize;
    let mut first_row_by_db_no: HashMap<String, usize> = HashMap::new();
    for raw in &batches.files {
        let row = raw.row;
        let n = normalize_proposal(raw);
        let errors_before = errors.len();

        match n.db_no.as_deref() {
            None => errors.push(Issue::new(
                row,
                "db_no",
                IssueCode::MissingField,
                "db_no is required",
            )),
            Some(db_no) => {
                if let Some(first) = first_row_by_db_no.get(db_no) {
                    warnings.push(Issue::new(
                        row,
                        "db_no",
                        IssueCode::DuplicateKey,
                        format!("db_no {db_no} also appears on row {first}; this row will update it"),
                    ));
                } else {
                    first_row_by_db_no.insert(db_no.to_string(), row);
                }
            }
        }

        match (&n.status_label, n.status) {
            (None, _) => errors.push(Issue::new(
                row,
                "status",
                IssueCode::MissingField,
                "status is required",
            )),
            (Some(_), None) => errors.push(Issue::new(
                row,
                "status",
                IssueCode::InvalidEnum,
                format!(
                    "Invalid status: {}. Must be one of: {}",
                    raw.status.trim(),
                    Status::permitted_labels()
                ),
            )),
            (Some(_), Some(_)) => {}
        }

        check_reference(&mut errors, row, "pi_name", "PI", n.pi_name.as_deref(), &pi_names);
        check_reference(
            &mut errors,
            row,
            "sponsor_name",
            "Sponsor",
            n.sponsor_name.as_deref(),
            &sponsor_names,
        );

        for (field, invalid, raw_value) in [
            ("date_received", n.date_received.is_invalid(), &n.date_received.raw),
            (
                "date_status_change",
                n.date_status_change.is_invalid(),
                &n.date_status_change.raw,
            ),
            ("to_set_up", n.to_set_up.is_invalid(), &n.to_set_up.raw),
        ] {
            if invalid {
                errors.push(Issue::new(
                    row,
                    field,
                    IssueCode::InvalidDate,
                    format!(
                        "Invalid date format: {}. Expected YYYY-MM-DD",
                        raw_value.as_deref().unwrap_or_default()
                    ),
                ));
            }
        }

        if errors.len() == errors_before {
            files_to_create += 1;
        }
    }

    ValidationReport {
        errors,
        warnings,
        stats: ValidationStats {
            pis_to_create: pi_names.len(),
            sponsors_to_create: sponsor_names.len(),
            files_to_create,
        },
    }
}

fn collect_names<'a>(
    rows: impl Iterator<Item = (usize, &'a str)>,
    field: &str,
    label: &str,
    warnings: &mut Vec<Issue>,
) -> HashSet<String> {
    let mut names = HashSet::new();
    for (row, raw) in rows {
        match clean_value(raw) {
            Some(name) => {
                names.insert(normalize_name(&name));
            }
            None => warnings.push(Issue::new(
                row,
                field,
                IssueCode::EmptyName,
                format!("{label} row has no name and will be ignored"),
            )),
        }
    }
    names
}

fn check_reference(
    errors: &mut Vec<Issue>,
    row: usize,
    field: &str,
    label: &str,
    name: Option<&str>,
    known: &HashSet<String>,
) {
    match name {
        None => errors.push(Issue::new(
            row,
            field,
            IssueCode::MissingField,
            format!("{field} is required"),
        )),
        Some(name) if !known.contains(&normalize_name(name)) => errors.push(Issue::new(
            row,
            field,
            IssueCode::UnresolvedReference,
            format!("{label} not found: {name}"),
        )),
        Some(_) => {}
    }
}

use crate::batch::ProposalRow;
use crate::model::{Issue, IssueCode, Status};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Case-insensitive prefix some legacy proposal numbers carry ("DB 1234").
pub const DB_NO_PREFIX: &str = "DB ";

/// Legacy labels accepted on input and rewritten to their canonical form.
const STATUS_SYNONYMS: &[(&str, &str)] = &[("Pending Signature", "Pending Signatures")];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%m-%d-%Y", "%b %d, %Y", "%B %d, %Y"];

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.fZ",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Trim, drop one layer of surrounding double quotes, and map the absent
/// markers (empty, `null`, `NULL`) to `None`.
pub fn clean_value(raw: &str) -> Option<String> {
    let mut t = raw.trim();
    if is_absent(t) {
        return None;
    }
    if t.len() >= 2 && t.starts_with('"') && t.ends_with('"') {
        t = t[1..t.len() - 1].trim();
    }
    if is_absent(t) {
        None
    } else {
        Some(t.to_string())
    }
}

fn is_absent(t: &str) -> bool {
    t.is_empty() || t == "null" || t == "NULL"
}

/// Stable natural key for PI and Sponsor names across stores.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn normalize_status(raw: &str) -> String {
    let t = raw.trim();
    STATUS_SYNONYMS
        .iter()
        .find(|(from, _)| *from == t)
        .map(|(_, to)| to.to_string())
        .unwrap_or_else(|| t.to_string())
}

pub fn parse_status(raw: &str) -> Option<Status> {
    Status::from_label(&normalize_status(raw))
}

pub fn strip_db_prefix(db_no: &str) -> String {
    let t = db_no.trim();
    match t.get(..DB_NO_PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(DB_NO_PREFIX) => t[DB_NO_PREFIX.len()..].trim().to_string(),
        _ => t.to_string(),
    }
}

/// Calendar date; timestamps are accepted and truncated to their date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            return Some(d);
        }
    }
    parse_timestamp_only(t).map(|ts| ts.date_naive())
}

/// Instant in UTC; bare dates are taken as midnight UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    if let Some(ts) = parse_timestamp_only(t) {
        return Some(ts);
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(t, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn parse_timestamp_only(t: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Utc));
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(t, fmt).ok())
        .map(|dt| dt.and_utc())
}

/// A field parsed leniently: the cleaned input is kept next to the parse
/// result so callers can tell "absent" from "present but unparseable".
#[derive(Debug, Clone, PartialEq)]
pub struct Lenient<T> {
    pub raw: Option<String>,
    pub value: Option<T>,
}

impl<T> Lenient<T> {
    fn parse(raw: &str, f: impl Fn(&str) -> Option<T>) -> Self {
        let raw = clean_value(raw);
        let value = raw.as_deref().and_then(f);
        Self { raw, value }
    }

    pub fn is_invalid(&self) -> bool {
        self.raw.is_some() && self.value.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedProposal {
    pub row: usize,
    pub db_no: Option<String>,
    /// Status after the synonym map, before enum membership is checked.
    pub status_label: Option<String>,
    pub status: Option<Status>,
    pub pi_name: Option<String>,
    pub sponsor_name: Option<String>,
    pub cayuse: Option<String>,
    pub date_received: Lenient<NaiveDate>,
    pub date_status_change: Lenient<DateTime<Utc>>,
    pub notes: Option<String>,
    pub to_set_up: Lenient<NaiveDate>,
    pub external_link: Option<String>,
}

impl NormalizedProposal {
    /// Warnings for date fields that were present but did not parse and will
    /// be stored as absent.
    pub fn date_warnings(&self) -> Vec<Issue> {
        let mut out = Vec::new();
        let checks = [
            ("date_received", self.date_received.is_invalid(), &self.date_received.raw),
            (
                "date_status_change",
                self.date_status_change.is_invalid(),
                &self.date_status_change.raw,
            ),
            ("to_set_up", self.to_set_up.is_invalid(), &self.to_set_up.raw),
        ];
        for (field, invalid, raw) in checks {
            if invalid {
                out.push(Issue::new(
                    self.row,
                    field,
                    IssueCode::InvalidDate,
                    format!(
                        "Unparseable date \"{}\" treated as empty",
                        raw.as_deref().unwrap_or_default()
                    ),
                ));
            }
        }
        out
    }
}

/// Never fails: malformed fields are carried forward for the validator.
pub fn normalize_proposal(row: &ProposalRow) -> NormalizedProposal {
    let status_label = clean_value(&row.status).map(|s| normalize_status(&s));
    NormalizedProposal {
        row: row.row,
        db_no: clean_value(&row.db_no)
            .map(|s| strip_db_prefix(&s))
            .filter(|s| !s.is_empty()),
        status: status_label.as_deref().and_then(Status::from_label),
        status_label,
        pi_name: clean_value(&row.pi_name),
        sponsor_name: clean_value(&row.sponsor_name),
        cayuse: clean_value(&row.cayuse),
        date_received: Lenient::parse(&row.date_received, parse_date),
        date_status_change: Lenient::parse(&row.date_status_change, parse_timestamp),
        notes: clean_value(&row.notes),
        to_set_up: Lenient::parse(&row.to_set_up, parse_date),
        external_link: clean_value(&row.external_link),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_value_handles_absent_markers_and_quotes() {
        assert_eq!(clean_value("  "), None);
        assert_eq!(clean_value("null"), None);
        assert_eq!(clean_value("NULL"), None);
        assert_eq!(clean_value("\"\""), None);
        assert_eq!(clean_value(" \" NSF \" "), Some("NSF".to_string()));
        assert_eq!(clean_value("\"\"x\"\""), Some("\"x\"".to_string()));
        assert_eq!(clean_value("Null"), Some("Null".to_string()));
    }

    #[test]
    fn names_normalize_to_trimmed_lowercase() {
        assert_eq!(normalize_name("  Smith, J. "), "smith, j.");
        assert_eq!(normalize_name("SMITH, J."), normalize_name("smith, j."));
    }

    #[test]
    fn legacy_singular_status_maps_to_plural() {
        assert_eq!(normalize_status(" Pending Signature "), "Pending Signatures");
        assert_eq!(parse_status("Pending Signature"), Some(Status::PendingSignatures));
        assert_eq!(parse_status("On Hold"), Some(Status::OnHold));
        assert_eq!(parse_status("on hold"), None);
        assert_eq!(parse_status("Submitted"), None);
    }

    #[test]
    fn db_prefix_is_stripped_case_insensitively() {
        assert_eq!(strip_db_prefix("DB 100"), "100");
        assert_eq!(strip_db_prefix("db  2041 "), "2041");
        assert_eq!(strip_db_prefix("DB100"), "DB100");
        assert_eq!(strip_db_prefix("100"), "100");
    }

    #[test]
    fn dates_parse_common_layouts_and_reject_impossible_days() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(parse_date("2024-01-05"), Some(d));
        assert_eq!(parse_date("01/05/2024"), Some(d));
        assert_eq!(parse_date("Jan 05, 2024"), Some(d));
        assert_eq!(parse_date("2024-01-05T10:00:00Z"), Some(d));
        assert_eq!(parse_date("2024-02-30"), None);
        assert_eq!(parse_date("soon"), None);
    }

    #[test]
    fn timestamps_accept_store_and_iso_layouts() {
        let ts = parse_timestamp("2025-11-03 03:29:55.285Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-11-03T03:29:55.285+00:00");
        let midnight = parse_timestamp("2024-01-05").unwrap();
        assert_eq!(midnight.to_rfc3339(), "2024-01-05T00:00:00+00:00");
    }

    #[test]
    fn normalized_row_reports_lenient_date_warnings() {
        let row = ProposalRow {
            row: 7,
            db_no: "DB 100".into(),
            status: "Pending Signature".into(),
            pi_name: "Smith, J.".into(),
            sponsor_name: "NSF".into(),
            date_received: "not a date".into(),
            to_set_up: "2024-06-01".into(),
            ..Default::default()
        };
        let n = normalize_proposal(&row);
        assert_eq!(n.db_no.as_deref(), Some("100"));
        assert_eq!(n.status, Some(Status::PendingSignatures));
        assert_eq!(n.date_received.value, None);
        assert!(n.date_received.is_invalid());
        assert!(!n.date_status_change.is_invalid());
        let w = n.date_warnings();
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].row, 7);
        assert_eq!(w[0].field, "date_received");
    }
}

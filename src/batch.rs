use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Header row occupies line 1, so the first data row is reported as row 2.
pub const HEADER_ROW_OFFSET: usize = 2;

pub const PI_COLUMNS: &[&str] = &["name"];
pub const SPONSOR_COLUMNS: &[&str] = &["sponsor"];
pub const FILE_COLUMNS: &[&str] = &[
    "db_no",
    "status",
    "pi_name",
    "sponsor_name",
    "cayuse",
    "date_received",
    "date_status_change",
    "notes",
    "to_set_up",
    "external_link",
];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {batch} file {path}: {source}")]
    Io {
        batch: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV parsing error in {batch} batch: {source}")]
    Csv {
        batch: &'static str,
        source: csv::Error,
    },
    #[error("{batch} batch is missing required column \"{column}\"")]
    MissingColumn {
        batch: &'static str,
        column: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiRow {
    pub row: usize,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SponsorRow {
    pub row: usize,
    pub sponsor: String,
}

/// Raw proposal row exactly as read; normalization happens later.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposalRow {
    pub row: usize,
    pub db_no: String,
    pub status: String,
    pub pi_name: String,
    pub sponsor_name: String,
    pub cayuse: String,
    pub date_received: String,
    pub date_status_change: String,
    pub notes: String,
    pub to_set_up: String,
    pub external_link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportBatches {
    pub pis: Vec<PiRow>,
    pub sponsors: Vec<SponsorRow>,
    pub files: Vec<ProposalRow>,
}

impl ImportBatches {
    pub fn from_paths(pis: &Path, sponsors: &Path, files: &Path) -> Result<Self, ParseError> {
        Ok(Self {
            pis: parse_pis(&read_batch("PI", pis)?)?,
            sponsors: parse_sponsors(&read_batch("Sponsor", sponsors)?)?,
            files: parse_files(&read_batch("File", files)?)?,
        })
    }
}

fn read_batch(batch: &'static str, path: &Path) -> Result<String, ParseError> {
    std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        batch,
        path: path.to_path_buf(),
        source,
    })
}

/// Header-keyed rows of one delimited file. Only truly empty lines are
/// skipped (the reader does that); a row of empty fields is kept so the
/// validator can report it.
struct Table {
    columns: HashMap<String, usize>,
    rows: Vec<csv::StringRecord>,
}

impl Table {
    fn parse(batch: &'static str, text: &str, required: &[&'static str]) -> Result<Self, ParseError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|source| ParseError::Csv { batch, source })?
            .clone();
        let mut columns = HashMap::new();
        for (i, h) in headers.iter().enumerate() {
            columns
                .entry(h.trim().to_ascii_lowercase())
                .or_insert(i);
        }
        for column in required {
            if !columns.contains_key(*column) {
                return Err(ParseError::MissingColumn { batch, column });
            }
        }

        let mut rows = Vec::new();
        for rec in reader.records() {
            rows.push(rec.map_err(|source| ParseError::Csv { batch, source })?);
        }
        Ok(Self { columns, rows })
    }

    fn get(&self, rec: &csv::StringRecord, column: &str) -> String {
        self.columns
            .get(column)
            .and_then(|i| rec.get(*i))
            .unwrap_or_default()
            .to_string()
    }
}

pub fn parse_pis(text: &str) -> Result<Vec<PiRow>, ParseError> {
    let t = Table::parse("PI", text, PI_COLUMNS)?;
    Ok(t.rows
        .iter()
        .enumerate()
        .map(|(i, rec)| PiRow {
            row: i + HEADER_ROW_OFFSET,
            name: t.get(rec, "name"),
        })
        .collect())
}

pub fn parse_sponsors(text: &str) -> Result<Vec<SponsorRow>, ParseError> {
    let t = Table::parse("Sponsor", text, SPONSOR_COLUMNS)?;
    Ok(t.rows
        .iter()
        .enumerate()
        .map(|(i, rec)| SponsorRow {
            row: i + HEADER_ROW_OFFSET,
            sponsor: t.get(rec, "sponsor"),
        })
        .collect())
}

pub fn parse_files(text: &str) -> Result<Vec<ProposalRow>, ParseError> {
    let t = Table::parse("File", text, FILE_COLUMNS)?;
    Ok(t.rows
        .iter()
        .enumerate()
        .map(|(i, rec)| ProposalRow {
            row: i + HEADER_ROW_OFFSET,
            db_no: t.get(rec, "db_no"),
            status: t.get(rec, "status"),
            pi_name: t.get(rec, "pi_name"),
            sponsor_name: t.get(rec, "sponsor_name"),
            cayuse: t.get(rec, "cayuse"),
            date_received: t.get(rec, "date_received"),
            date_status_change: t.get(rec, "date_status_change"),
            notes: t.get(rec, "notes"),
            to_set_up: t.get(rec, "to_set_up"),
            external_link: t.get(rec, "external_link"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILES_HEADER: &str = "db_no,status,pi_name,sponsor_name,cayuse,date_received,date_status_change,notes,to_set_up,external_link";

    #[test]
    fn pi_rows_are_numbered_after_header_and_skip_empty_lines() {
        let rows = parse_pis("\u{feff}Name\n\"Smith, J.\"\n\n  \nDoe\n").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].row, 2);
        assert_eq!(rows[0].name, "Smith, J.");
        assert_eq!(rows[1].name.trim(), "");
        assert_eq!(rows[2].row, 4);
        assert_eq!(rows[2].name, "Doe");
    }

    #[test]
    fn rows_of_empty_fields_are_kept_for_validation() {
        let text = format!("{FILES_HEADER}\n,,,,,,,,,\n\n1,In,Smith,NSF,,,,,,\n");
        let rows = parse_files(&text).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row, 2);
        assert_eq!(rows[0].db_no, "");
        assert_eq!(rows[1].row, 3);
        assert_eq!(rows[1].db_no, "1");
    }

    #[test]
    fn quoted_fields_keep_embedded_commas() {
        let text = format!(
            "{FILES_HEADER}\n\"DB 100\",Pending,\"Smith, J.\",NSF,,2024-01-05,,\"a, b\",,\n"
        );
        let rows = parse_files(&text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pi_name, "Smith, J.");
        assert_eq!(rows[0].notes, "a, b");
        assert_eq!(rows[0].db_no, "DB 100");
    }

    #[test]
    fn missing_required_column_is_a_parse_error() {
        let err = parse_sponsors("name\nNSF\n").unwrap_err();
        assert!(matches!(
            err,
            ParseError::MissingColumn {
                column: "sponsor",
                ..
            }
        ));
    }

    #[test]
    fn ragged_rows_are_a_parse_error() {
        let err = parse_pis("name\nA,extra\n").unwrap_err();
        assert!(matches!(err, ParseError::Csv { batch: "PI", .. }));
    }
}

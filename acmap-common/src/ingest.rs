//! Ingestion of account mapping exports
//!
//! Reads the CRM mapping export (one row per account/alias pair, as CSV or as an Excel
//! workbook) and feeds every row to
//! a [`MappingResolver`]. A bad row is logged and counted, then processing moves on.
//! Only store failures stop a run.

use calamine::{open_workbook_auto, Data, Reader};
use serde::Serialize;
use std::path::Path;
use tracing::{error, info, warn};

use crate::resolver::{MappingResolver, ResolveOutcome};
use crate::{Error, Result};

/// Header of the canonical account name column
pub const ACCOUNT_COLUMN: &str = "Account Name";
/// Header of the alias column
pub const ALIAS_COLUMN: &str = "Salesforce Account Name";

/// One data row of the export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRow {
    /// 1-based line number in the source file
    pub line: u64,
    pub account_name: String,
    pub alias_name: String,
}

/// A data row the CSV reader could not turn into a [`MappingRow`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub line: u64,
    pub reason: String,
}

pub type RowResult = std::result::Result<MappingRow, RowError>;

/// Counts for one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Unreadable rows or rows with blank fields
    pub skipped: usize,
    /// Rows refused by the resolver's uniqueness rule
    pub rejected: usize,
    /// Rows that failed for any other per-row reason
    pub failed: usize,
}

impl IngestReport {
    /// Rows that reached the store (including no-ops)
    pub fn applied(&self) -> usize {
        self.created + self.updated + self.unchanged
    }
}

/// Read a mapping export, picking the reader from the file extension.
///
/// Workbook extensions (`xlsx`, `xlsm`, `xlsb`, `xls`, `ods`) go to
/// [`read_mapping_xlsx`]; anything else is read as CSV.
pub fn read_mapping_file(path: &Path) -> Result<Vec<RowResult>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => read_mapping_xlsx(path),
        _ => read_mapping_csv(path),
    }
}

/// Read a mapping export from disk
pub fn read_mapping_csv(path: &Path) -> Result<Vec<RowResult>> {
    let bytes = std::fs::read(path)?;
    parse_mapping_csv(&decode_text(bytes))
}

/// Decode as UTF-8, falling back to ISO-8859-1 for exports saved by older tools
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => match text.strip_prefix('\u{feff}') {
            Some(rest) => rest.to_string(),
            None => text,
        },
        Err(e) => {
            warn!("UTF-8 decode failed, retrying with ISO-8859-1 encoding");
            // ISO-8859-1 maps each byte to the code point of the same value
            e.into_bytes().into_iter().map(char::from).collect()
        }
    }
}

/// Parse export text. The header row must name both mapping columns.
pub fn parse_mapping_csv(text: &str) -> Result<Vec<RowResult>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let account_idx = column_index(&headers, ACCOUNT_COLUMN)?;
    let alias_idx = column_index(&headers, ALIAS_COLUMN)?;

    let rows = reader
        .records()
        .enumerate()
        .map(|(n, record)| {
            // Header occupies line 1
            let fallback_line = n as u64 + 2;
            match record {
                Ok(record) => Ok(MappingRow {
                    line: record.position().map_or(fallback_line, |p| p.line()),
                    account_name: record.get(account_idx).unwrap_or_default().to_string(),
                    alias_name: record.get(alias_idx).unwrap_or_default().to_string(),
                }),
                Err(e) => Err(RowError {
                    line: e.position().map_or(fallback_line, |p| p.line()),
                    reason: e.to_string(),
                }),
            }
        })
        .collect();

    Ok(rows)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    find_column(headers.iter(), name)
}

fn find_column<'a>(mut headers: impl Iterator<Item = &'a str>, name: &str) -> Result<usize> {
    headers
        .position(|h| h.trim() == name)
        .ok_or_else(|| Error::Validation(format!("missing column '{}'", name)))
}

/// Read the first worksheet of a mapping workbook.
///
/// The first used row is the header. Every cell is read as text and empty cells as
/// blank strings, so a gap row comes back as a row with blank fields.
pub fn read_mapping_xlsx(path: &Path) -> Result<Vec<RowResult>> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::Validation(format!("{} has no worksheets", path.display())))??;

    let first_line = range.start().map_or(1, |(row, _)| u64::from(row) + 1);
    let mut rows = range.rows();

    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(cell_text).collect(),
        None => return Ok(Vec::new()),
    };
    let account_idx = find_column(headers.iter().map(String::as_str), ACCOUNT_COLUMN)?;
    let alias_idx = find_column(headers.iter().map(String::as_str), ALIAS_COLUMN)?;

    Ok(rows
        .enumerate()
        .map(|(n, cells)| {
            Ok(MappingRow {
                line: first_line + n as u64 + 1,
                account_name: cells.get(account_idx).map(cell_text).unwrap_or_default(),
                alias_name: cells.get(alias_idx).map(cell_text).unwrap_or_default(),
            })
        })
        .collect())
}

/// Cell value as text. Whole numbers lose the `.0` spreadsheets add to them.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

/// Feeds mapping rows to a resolver
pub struct Ingestor {
    resolver: MappingResolver,
}

impl Ingestor {
    pub fn new(resolver: MappingResolver) -> Self {
        Self { resolver }
    }

    /// Resolve every row, isolating per-row failures.
    ///
    /// Returns early only when the store itself fails.
    pub async fn run<I>(&self, rows: I) -> Result<IngestReport>
    where
        I: IntoIterator<Item = RowResult>,
    {
        let mut report = IngestReport::default();

        for row in rows {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(line = e.line, "Skipping unreadable row: {}", e.reason);
                    report.skipped += 1;
                    continue;
                }
            };

            match self.resolver.resolve(&row.account_name, &row.alias_name).await {
                Ok(ResolveOutcome::Created { .. }) => report.created += 1,
                Ok(ResolveOutcome::Updated { .. }) => report.updated += 1,
                Ok(ResolveOutcome::Unchanged { .. }) => report.unchanged += 1,
                Err(Error::Validation(msg)) => {
                    warn!(
                        line = row.line,
                        account = %row.account_name,
                        alias = %row.alias_name,
                        "Skipping invalid row: {}",
                        msg
                    );
                    report.skipped += 1;
                }
                Err(e @ Error::Conflict { .. }) => {
                    warn!(line = row.line, "Row rejected: {}", e);
                    report.rejected += 1;
                }
                Err(e) if e.is_store_failure() => {
                    error!(line = row.line, "Store failure, aborting ingestion: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    error!(line = row.line, "Row failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            rejected = report.rejected,
            failed = report.failed,
            policy = %self.resolver.policy(),
            "Ingestion finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_located_by_header_name() {
        let rows = parse_mapping_csv(
            "Owner,Salesforce Account Name,Account Name\n\
             ops,Acme Inc,Acme\n",
        )
        .unwrap();

        assert_eq!(
            rows,
            vec![Ok(MappingRow {
                line: 2,
                account_name: "Acme".into(),
                alias_name: "Acme Inc".into(),
            })]
        );
    }

    #[test]
    fn test_missing_column_is_rejected() {
        let err = parse_mapping_csv("Account Name,Owner\nAcme,ops\n").unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg.contains(ALIAS_COLUMN)));
    }

    #[test]
    fn test_short_rows_read_as_blank_fields() {
        let rows = parse_mapping_csv("Account Name,Salesforce Account Name\nAcme\n").unwrap();
        let row = rows[0].as_ref().unwrap();
        assert_eq!(row.account_name, "Acme");
        assert_eq!(row.alias_name, "");
    }

    #[test]
    fn test_special_characters_preserved() {
        let rows = parse_mapping_csv(
            "Account Name,Salesforce Account Name\n\"Smith, Jones & Co\",\"S&J \"\"Intl\"\"\"\n",
        )
        .unwrap();
        let row = rows[0].as_ref().unwrap();
        assert_eq!(row.account_name, "Smith, Jones & Co");
        assert_eq!(row.alias_name, "S&J \"Intl\"");
    }

    #[test]
    fn test_cells_read_as_text() {
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::String("Acme & Co".into())), "Acme & Co");
        assert_eq!(cell_text(&Data::Float(4021.0)), "4021");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::Int(-7)), "-7");
        assert_eq!(cell_text(&Data::Bool(true)), "true");
    }

    #[test]
    fn test_latin1_fallback() {
        // "Société" encoded as ISO-8859-1
        let bytes = b"Soci\xe9t\xe9".to_vec();
        assert_eq!(decode_text(bytes), "Société");
    }

    #[test]
    fn test_utf8_bom_is_dropped() {
        let bytes = "\u{feff}Account Name".as_bytes().to_vec();
        assert_eq!(decode_text(bytes), "Account Name");
    }
}

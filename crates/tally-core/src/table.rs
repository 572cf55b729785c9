//! Tabular input/output for statements and ledgers
//!
//! Statements and ledgers arrive as CSV or spreadsheet files (XLSX, XLS, ODS).
//! Both are read into a [`Table`] of display strings: ordered header names and
//! ordered rows. Bank statement exports carry a preamble (account number,
//! balances) above the real header, so the header row is located with a
//! [`HeaderLocator`].

use std::fmt::Write as _;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::format::{Item, StrftimeItems};
use chrono::{Duration, NaiveDate};
use csv::{ReaderBuilder, WriterBuilder};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Transaction;

/// Header row used by ASB statement exports
pub const DEFAULT_HEADER_ROW: usize = 5;

/// How spreadsheet date cells are rendered unless configured otherwise
pub const DEFAULT_DATE_FORMAT: &str = "%d/%m/%Y";

/// Source file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Spreadsheet,
}

impl TableFormat {
    /// Pick a format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "txt" => Ok(Self::Csv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(Self::Spreadsheet),
            _ => Err(Error::UnsupportedFormat(format!(
                "{} (expected .csv, .xlsx, .xls or .ods)",
                path.display()
            ))),
        }
    }

    /// Guess the format of uploaded bytes
    ///
    /// XLSX/ODS are zip archives and XLS is an OLE compound document; anything
    /// else is treated as CSV.
    pub fn sniff(bytes: &[u8]) -> Self {
        const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
        const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
            Self::Spreadsheet
        } else {
            Self::Csv
        }
    }
}

/// Where the header row sits in the raw sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderLocator {
    /// Zero-based row index of the header
    Fixed(usize),
    /// Header is the row after the first row with a cell containing this text
    AfterMarker(String),
}

impl Default for HeaderLocator {
    fn default() -> Self {
        Self::Fixed(0)
    }
}

impl HeaderLocator {
    fn locate(&self, rows: &[Vec<String>]) -> Result<usize> {
        match self {
            Self::Fixed(index) => {
                if *index < rows.len() {
                    Ok(*index)
                } else {
                    Err(Error::InvalidTable(format!(
                        "header row {} is past the end of the sheet ({} rows)",
                        index,
                        rows.len()
                    )))
                }
            }
            Self::AfterMarker(marker) => rows
                .iter()
                .position(|row| row.iter().any(|cell| cell.contains(marker.as_str())))
                .and_then(|marker_row| {
                    (marker_row + 1..rows.len()).find(|&i| !is_blank_row(&rows[i]))
                })
                .ok_or_else(|| {
                    Error::InvalidTable(format!("no header row found after \"{}\"", marker))
                }),
        }
    }
}

/// Options for reading a statement or ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    pub header: HeaderLocator,
    /// chrono format string for spreadsheet date cells
    pub date_format: String,
}

impl ReadOptions {
    pub fn new(header: HeaderLocator) -> Self {
        Self {
            header,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }

    pub fn with_date_format(mut self, date_format: impl Into<String>) -> Self {
        self.date_format = date_format.into();
        self
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::new(HeaderLocator::default())
    }
}

/// Check a chrono format string renders without error
pub fn validate_date_format(format: &str) -> Result<()> {
    if format.is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(Error::Config(format!("invalid date format \"{}\"", format)));
    }
    Ok(())
}

fn is_blank_row(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

/// An ordered table of string cells
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Read a table from a file, choosing the parser by extension
    pub fn read_path(path: &Path, options: &ReadOptions) -> Result<Self> {
        let format = TableFormat::from_path(path)?;
        let bytes = std::fs::read(path)?;
        debug!(path = %path.display(), ?format, "Reading table");
        Self::read_bytes(&bytes, format, options)
    }

    /// Read a table from in-memory bytes
    ///
    /// Row indices seen by the header locator are physical line (or sheet
    /// row) numbers for both formats, blank lines included.
    pub fn read_bytes(bytes: &[u8], format: TableFormat, options: &ReadOptions) -> Result<Self> {
        let raw = match format {
            TableFormat::Csv => read_csv_rows(bytes)?,
            TableFormat::Spreadsheet => read_spreadsheet_rows(bytes, &options.date_format)?,
        };
        Self::from_raw_rows(raw, &options.header)
    }

    /// Split raw rows into header and data using the locator
    pub fn from_raw_rows(raw: Vec<Vec<String>>, locator: &HeaderLocator) -> Result<Self> {
        let header_index = locator.locate(&raw)?;
        let mut rows = raw.into_iter().skip(header_index);

        let headers: Vec<String> = rows
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(Error::InvalidTable("header row is empty".into()));
        }

        let rows: Vec<Vec<String>> = rows.filter(|row| !is_blank_row(row)).collect();

        debug!(
            "Table has {} columns and {} data rows",
            headers.len(),
            rows.len()
        );
        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One transaction per row keyed by header name
    ///
    /// Every transaction gets the full header key set; short rows are padded
    /// with empty strings and unnamed columns are dropped.
    pub fn to_transactions(&self) -> Vec<Transaction> {
        self.rows
            .iter()
            .map(|row| {
                Transaction::from_pairs(
                    self.headers
                        .iter()
                        .enumerate()
                        .filter(|(_, h)| !h.is_empty())
                        .map(|(i, h)| (h.clone(), row.get(i).cloned().unwrap_or_default())),
                )
            })
            .collect()
    }

    /// Build a table from transactions, columns in first-seen order
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for tx in transactions {
            for key in tx.keys() {
                if !headers.iter().any(|h| h == key) {
                    headers.push(key.to_string());
                }
            }
        }
        let rows = transactions
            .iter()
            .map(|tx| {
                headers
                    .iter()
                    .map(|h| tx.get(h).unwrap_or_default().to_string())
                    .collect()
            })
            .collect();
        Self { headers, rows }
    }

    /// Write the table as CSV (header row first)
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = WriterBuilder::new().from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn read_csv_rows<R: Read>(reader: R) -> Result<Vec<Vec<String>>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        // The reader skips empty lines; pad so indices match the file
        if let Some(position) = record.position() {
            let line = position.line().saturating_sub(1) as usize;
            while rows.len() < line {
                rows.push(Vec::new());
            }
        }
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    Ok(rows)
}

fn read_spreadsheet_rows(bytes: &[u8], date_format: &str) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::InvalidTable("workbook has no sheets".into()))??;

    // Ranges start at the first used cell; pad so row indices match the sheet
    let (top, left) = range.start().unwrap_or((0, 0));
    let mut rows: Vec<Vec<String>> = (0..top).map(|_| Vec::new()).collect();
    for row in range.rows() {
        let mut cells: Vec<String> = vec![String::new(); left as usize];
        cells.extend(row.iter().map(|cell| cell_to_string(cell, date_format)));
        rows.push(cells);
    }
    Ok(rows)
}

/// Render a cell as text
///
/// Dates use `date_format`. Numbers use their shortest decimal form, so a
/// cell displayed as "-1,000.00" reads as "-1000".
fn cell_to_string(cell: &Data, date_format: &str) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .and_then(|d| format_date(d, date_format))
            .unwrap_or_else(|| dt.as_f64().to_string()),
        other => other.to_string(),
    }
}

fn format_date(date: NaiveDate, format: &str) -> Option<String> {
    let mut out = String::new();
    write!(out, "{}", date.format(format)).ok()?;
    Some(out)
}

/// Convert an Excel day serial (1900 date system) to a calendar date
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    // Day 0 is 1899-12-30 once the fictitious 1900-02-29 is accounted for
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

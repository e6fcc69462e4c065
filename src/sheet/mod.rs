// src/sheet/mod.rs

use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::fetch::LookupResult;

mod delimited;
mod xlsx;

/// Header of the output spreadsheet, in column order.
pub const OUTPUT_COLUMNS: [&str; 4] = ["nome", "cnpj", "simples_nacional", "mei"];

pub type SheetResult<T> = std::result::Result<T, SheetError>;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required part: {0}")]
    MissingPart(String),

    #[error("Invalid XLSX format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported spreadsheet format: {0:?} (expected .xlsx or .csv)")]
    UnsupportedFormat(String),
}

/// One untyped spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for CellValue {
    /// Integral numbers print without a fractional part, so a CNPJ stored as a
    /// numeric cell stringifies to its digits.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e18 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// One input row: column name → cell, in header order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: Vec<(String, CellValue)>,
}

impl RawRecord {
    pub fn new(fields: Vec<(String, CellValue)>) -> Self {
        Self { fields }
    }

    /// Missing columns read as `CellValue::Empty`.
    pub fn get(&self, column: &str) -> &CellValue {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
            .unwrap_or(&CellValue::Empty)
    }
}

/// A header plus its data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<RawRecord>,
}

impl Table {
    /// Builds a table from a header and positional rows. Short rows are padded
    /// with empty cells; rows with no non-empty cell are dropped.
    pub fn from_grid(columns: Vec<String>, grid: Vec<Vec<CellValue>>) -> Self {
        let rows = grid
            .into_iter()
            .filter(|cells| cells.iter().any(|c| !c.is_empty()))
            .map(|mut cells| {
                cells.resize(columns.len(), CellValue::Empty);
                RawRecord::new(columns.iter().cloned().zip(cells).collect())
            })
            .collect();
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Header name for a blank header cell at zero-based `index`.
pub(crate) fn unnamed_column(index: usize) -> String {
    format!("Unnamed: {}", index)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Xlsx,
    Csv,
}

fn format_of(path: &Path) -> SheetResult<Format> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "xlsx" => Ok(Format::Xlsx),
        "csv" => Ok(Format::Csv),
        _ => Err(SheetError::UnsupportedFormat(path.display().to_string())),
    }
}

/// Reads the first worksheet (xlsx) or the whole file (csv); the first row is the header.
pub fn read_table(path: impl AsRef<Path>) -> SheetResult<Table> {
    let path = path.as_ref();
    match format_of(path)? {
        Format::Xlsx => xlsx::read_first_sheet(path),
        Format::Csv => delimited::read(path),
    }
}

/// Writes one row per result under [`OUTPUT_COLUMNS`].
pub fn write_results(path: impl AsRef<Path>, results: &[LookupResult]) -> SheetResult<()> {
    let path = path.as_ref();
    let rows: Vec<[String; 4]> = results.iter().map(LookupResult::to_row).collect();
    match format_of(path)? {
        Format::Xlsx => xlsx::write_sheet(path, &OUTPUT_COLUMNS, &rows),
        Format::Csv => delimited::write(path, &OUTPUT_COLUMNS, &rows),
    }
}

// Spreadsheet input: CSV (delimiter sniffed) and workbooks (xlsx/xls/ods).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to open workbook: {0}")]
    Workbook(String),
    #[error("workbook contains no sheets")]
    NoSheets,
    #[error("unsupported spreadsheet format: {0}")]
    UnsupportedFormat(String),
}

/// A single spreadsheet cell as the reader saw it.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Float(n) => n.is_nan(),
            _ => false,
        }
    }

    /// Display form. Integral floats render without a decimal part so numeric
    /// keys read from workbooks match their CSV spelling.
    pub fn render(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Bool(b) => b.to_string(),
            Cell::Int(n) => n.to_string(),
            Cell::Float(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Cell::Text(s) => s.clone(),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

/// One data row keyed by normalized header name.
#[derive(Clone, Debug, Default)]
pub struct Row {
    pub line_no: usize,
    cells: HashMap<String, Cell>,
}

impl Row {
    pub fn new(line_no: usize) -> Self {
        Self {
            line_no,
            cells: HashMap::new(),
        }
    }

    /// Builds a row from `(header, cell)` pairs; the first occurrence of a
    /// header wins.
    pub fn from_pairs<K: AsRef<str>>(line_no: usize, pairs: impl IntoIterator<Item = (K, Cell)>) -> Self {
        let mut row = Self::new(line_no);
        for (k, v) in pairs {
            row.insert(k.as_ref(), v);
        }
        row
    }

    pub fn insert(&mut self, header: &str, cell: Cell) {
        let key = normalize_header(header);
        if key.is_empty() {
            return;
        }
        self.cells.entry(key).or_insert(cell);
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells.get(column)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.values().all(Cell::is_empty)
    }
}

pub fn normalize_header(h: &str) -> String {
    h.trim().trim_start_matches('\u{feff}').trim().to_lowercase()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SheetFormat {
    Auto,
    Csv,
    Workbook,
}

impl SheetFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Some(Self::Auto),
            "csv" | "tsv" | "txt" => Some(Self::Csv),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" | "workbook" => Some(Self::Workbook),
            _ => None,
        }
    }

    fn resolve(self, path: &Path) -> Result<Self, SheetError> {
        if self != Self::Auto {
            return Ok(self);
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match Self::parse(&ext) {
            Some(Self::Auto) | None => Err(SheetError::UnsupportedFormat(ext)),
            Some(f) => Ok(f),
        }
    }
}

/// Reads every data row of a spreadsheet. Headers are trimmed and lowercased;
/// fully blank rows are dropped.
pub fn read_rows(path: &Path, format: SheetFormat) -> Result<Vec<Row>, SheetError> {
    match format.resolve(path)? {
        SheetFormat::Csv => {
            let bytes = std::fs::read(path).map_err(|source| SheetError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            rows_from_csv_str(&decode_bytes(bytes))
        }
        _ => rows_from_workbook(path),
    }
}

/// UTF-8 first; Excel-exported CSVs are often Windows-1252.
fn decode_bytes(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    }
}

pub fn rows_from_csv_str(content: &str) -> Result<Vec<Row>, SheetError> {
    let delimiter = sniff_delimiter(content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let header: Vec<String> = match records.next() {
        Some(first) => first?.iter().map(str::to_string).collect(),
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for (idx, result) in records.enumerate() {
        let record = result?;
        let row = Row::from_pairs(
            idx + 2,
            header
                .iter()
                .zip(record.iter().map(|f| Cell::text(f))),
        );
        if !row.is_blank() {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Picks the delimiter whose leading records agree on a field count above
/// one; wider records break ties. Records are sampled through the csv reader
/// itself, so quoted fields spanning lines count once.
fn sniff_delimiter(content: &str) -> u8 {
    const SAMPLE_RECORDS: usize = 10;

    let mut best = b',';
    let mut best_score = 0usize;
    for delim in [b'\t', b';', b',', b'|'] {
        let widths: Vec<usize> = csv::ReaderBuilder::new()
            .delimiter(delim)
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes())
            .records()
            .take(SAMPLE_RECORDS)
            .map_while(Result::ok)
            .map(|r| r.len())
            .collect();

        let Some(&header_width) = widths.first() else {
            continue;
        };
        if header_width <= 1 {
            continue;
        }
        let score = widths.iter().filter(|&&w| w == header_width).count() * header_width;
        if score > best_score {
            best_score = score;
            best = delim;
        }
    }
    best
}

fn rows_from_workbook(path: &Path) -> Result<Vec<Row>, SheetError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| SheetError::Workbook(e.to_string()))?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(SheetError::NoSheets)?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| SheetError::Workbook(format!("sheet '{}': {}", first, e)))?;

    let mut grid = range.rows();
    let header: Vec<String> = match grid.next() {
        Some(cells) => cells.iter().map(|c| data_to_cell(c).render()).collect(),
        None => return Ok(Vec::new()),
    };

    let (start_row, _) = range.start().unwrap_or((0, 0));
    let mut rows = Vec::new();
    for (idx, cells) in grid.enumerate() {
        let row = Row::from_pairs(
            start_row as usize + idx + 2,
            header.iter().zip(cells.iter().map(data_to_cell)),
        );
        if !row.is_blank() {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(n) => Cell::Float(*n),
        Data::Int(n) => Cell::Int(*n),
        Data::Bool(b) => Cell::Bool(*b),
        Data::Error(_) => Cell::Empty,
        // Assumes the 1900 date system, as most workbooks use.
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(Cell::Date)
            .unwrap_or(Cell::Float(dt.as_f64())),
        Data::DateTimeIso(s) => Cell::Text(s.clone()),
        Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

/// Converts a spreadsheet date serial (1900 system) into a calendar date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

// Consolidated report output: one row per ficha, xlsx or csv.

use std::collections::HashMap;
use std::path::Path;

use rust_xlsxwriter::{Format, Workbook, XlsxError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("xlsx write failed: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    Xlsx,
    Csv,
}

impl ReportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xlsx" => Some(Self::Xlsx),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    /// Format implied by a file extension, if any.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|e| e.to_str()).and_then(Self::parse)
    }
}

#[derive(Clone, Debug)]
pub struct ReportOptions {
    pub format: ReportFormat,
    pub max_column_width: usize,
    pub sheet_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportSummary {
    pub row_count: usize,
    pub columns: Vec<String>,
}

/// Preferred columns that occur in at least one row come first, in their
/// declared order; any other column follows in first-seen order.
pub fn ordered_columns(rows: &[Vec<(String, String)>], preferred: &[String]) -> Vec<String> {
    let mut seen: Vec<&str> = Vec::new();
    for row in rows {
        for (col, _) in row {
            if !seen.contains(&col.as_str()) {
                seen.push(col);
            }
        }
    }
    let mut out: Vec<String> = preferred
        .iter()
        .filter(|c| seen.contains(&c.as_str()))
        .cloned()
        .collect();
    for col in seen {
        if !preferred.iter().any(|p| p == col) {
            out.push(col.to_string());
        }
    }
    out
}

/// Longest header or value plus padding, capped.
pub fn column_widths(
    columns: &[String],
    rows: &[HashMap<&str, &str>],
    max_width: usize,
) -> Vec<usize> {
    columns
        .iter()
        .map(|c| {
            let longest = rows
                .iter()
                .filter_map(|r| r.get(c.as_str()))
                .map(|v| v.chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0);
            (longest + 2).min(max_width)
        })
        .collect()
}

pub fn write_report(
    rows: &[Vec<(String, String)>],
    preferred: &[String],
    path: &Path,
    opts: &ReportOptions,
) -> Result<ReportSummary, ReportError> {
    let columns = ordered_columns(rows, preferred);
    let lookup: Vec<HashMap<&str, &str>> = rows
        .iter()
        .map(|r| r.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect())
        .collect();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    match opts.format {
        ReportFormat::Xlsx => write_xlsx(&columns, &lookup, path, opts)?,
        ReportFormat::Csv => write_csv(&columns, &lookup, path)?,
    }
    Ok(ReportSummary {
        row_count: rows.len(),
        columns,
    })
}

fn write_xlsx(
    columns: &[String],
    rows: &[HashMap<&str, &str>],
    path: &Path,
    opts: &ReportOptions,
) -> Result<(), ReportError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let worksheet = workbook.add_worksheet().set_name(&opts.sheet_name)?;

    for (c, name) in columns.iter().enumerate() {
        worksheet.write_string_with_format(0, c as u16, name, &header)?;
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, name) in columns.iter().enumerate() {
            if let Some(v) = row.get(name.as_str()) {
                if !v.is_empty() {
                    worksheet.write_string((r + 1) as u32, c as u16, *v)?;
                }
            }
        }
    }
    for (c, width) in column_widths(columns, rows, opts.max_column_width)
        .into_iter()
        .enumerate()
    {
        worksheet.set_column_width(c as u16, width as f64)?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    workbook.save(path)?;
    Ok(())
}

fn write_csv(
    columns: &[String],
    rows: &[HashMap<&str, &str>],
    path: &Path,
) -> Result<(), ReportError> {
    let mut writer = csv::WriterBuilder::new().from_path(path)?;
    writer.write_record(columns)?;
    for row in rows {
        let record: Vec<&str> = columns
            .iter()
            .map(|c| row.get(c.as_str()).copied().unwrap_or(""))
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook_auto, Data, Reader};
    use tempfile::tempdir;

    fn row(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn preferred_columns_first_then_first_seen() {
        let rows = vec![
            row(&[("Extra", "1"), ("B", "x")]),
            row(&[("Outra", "2"), ("A", "y")]),
        ];
        let cols = ordered_columns(&rows, &strings(&["A", "B", "Ausente"]));
        assert_eq!(cols, strings(&["A", "B", "Extra", "Outra"]));
    }

    #[test]
    fn widths_are_capped() {
        let cols = strings(&["Nº", "Observações"]);
        let long = "x".repeat(200);
        let rows = vec![HashMap::from([("Nº", "12345"), ("Observações", long.as_str())])];
        assert_eq!(column_widths(&cols, &rows, 50), vec![7, 50]);
    }

    #[test]
    fn csv_report_fills_missing_cells() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("rel.csv");
        let rows = vec![row(&[("A", "1"), ("B", "dois, três")]), row(&[("A", "2")])];
        let opts = ReportOptions {
            format: ReportFormat::Csv,
            max_column_width: 50,
            sheet_name: "Fichas".into(),
        };
        let summary = write_report(&rows, &strings(&["A", "B"]), &out, &opts).unwrap();
        assert_eq!(summary.row_count, 2);
        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(text, "A,B\n1,\"dois, três\"\n2,\n");
    }

    #[test]
    fn xlsx_report_reads_back() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("rel.xlsx");
        let rows = vec![row(&[("Nº Ficha", "042"), ("Título", "Atlas")])];
        let opts = ReportOptions {
            format: ReportFormat::Xlsx,
            max_column_width: 50,
            sheet_name: "Acervo".into(),
        };
        write_report(&rows, &strings(&["Nº Ficha", "Título"]), &out, &opts).unwrap();

        let mut wb = open_workbook_auto(&out).unwrap();
        assert_eq!(wb.sheet_names(), vec!["Acervo".to_string()]);
        let range = wb.worksheet_range("Acervo").unwrap();
        assert_eq!(range.get_value((0, 0)), Some(&Data::String("Nº Ficha".into())));
        assert_eq!(range.get_value((1, 0)), Some(&Data::String("042".into())));
        assert_eq!(range.get_value((1, 1)), Some(&Data::String("Atlas".into())));
    }
}

use chrono::NaiveDate;

use crate::model::Rating;
use crate::sheet::{excel_serial_to_date, Cell};

const TRUTHY_TOKENS: [&str; 8] = [
    "sim",
    "s",
    "true",
    "x",
    "yes",
    "checked",
    "on",
    "verdadeiro",
];

/// Converts any cell into a boolean. `None` stands for a missing column.
///
/// Booleans pass through, numbers (including numeric strings) are true when
/// positive, anything else is matched case-insensitively against a fixed set
/// of truthy tokens.
pub fn coerce_boolean(value: Option<&Cell>) -> bool {
    let Some(cell) = value else {
        return false;
    };
    match cell {
        Cell::Empty => false,
        Cell::Bool(b) => *b,
        Cell::Int(n) => *n > 0,
        Cell::Float(n) => *n > 0.0,
        Cell::Date(_) => false,
        Cell::Text(s) => {
            let t = s.trim();
            if t.is_empty() {
                return false;
            }
            if let Ok(n) = t.parse::<f64>() {
                return n > 0.0;
            }
            let lowered = t.to_lowercase();
            TRUTHY_TOKENS.contains(&lowered.as_str())
        }
    }
}

pub fn coerce_rating(value: Option<&Cell>) -> Rating {
    let Some(cell) = value else {
        return Rating::Regular;
    };
    match cell.render().trim().to_lowercase().as_str() {
        "1" | "bom" => Rating::Bom,
        "3" | "mau" | "ruim" => Rating::Mau,
        _ => Rating::Regular,
    }
}

/// Trimmed display text of a cell; empty cells read as `None`.
pub fn coerce_text(value: Option<&Cell>) -> Option<String> {
    let cell = value?;
    if cell.is_empty() {
        return None;
    }
    let s = cell.render().trim().to_string();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Parses a fill date, falling back to `today` for anything unreadable.
pub fn coerce_date(value: Option<&Cell>, today: NaiveDate, day_first: bool) -> NaiveDate {
    let Some(cell) = value else {
        return today;
    };
    match cell {
        Cell::Date(d) => *d,
        Cell::Int(n) => excel_serial_to_date(*n as f64).unwrap_or(today),
        Cell::Float(n) => excel_serial_to_date(*n).unwrap_or(today),
        Cell::Text(s) => parse_date_text(s, day_first).unwrap_or(today),
        Cell::Empty | Cell::Bool(_) => today,
    }
}

pub fn parse_date_text(s: &str, day_first: bool) -> Option<NaiveDate> {
    let t = s.trim();
    // Drop any time-of-day suffix ("2021-03-04 00:00:00", "2021-03-04T10:00").
    let date_part = t.split([' ', 'T']).next().unwrap_or("").trim();
    if date_part.is_empty() {
        return None;
    }

    let segments: Vec<&str> = date_part.split(['/', '-', '.']).collect();
    if segments.len() != 3 {
        return None;
    }
    // `%Y` also accepts one or two digits, so the segment widths pick the
    // format family before any parse is tried.
    let formats: Vec<&str> = if segments[0].len() == 4 {
        vec!["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"]
    } else {
        let short_year = segments[2].len() == 2;
        let day_month: [&str; 3] = if short_year {
            ["%d/%m/%y", "%d-%m-%y", "%d.%m.%y"]
        } else {
            ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"]
        };
        let month_day: [&str; 2] = if short_year {
            ["%m/%d/%y", "%m-%d-%y"]
        } else {
            ["%m/%d/%Y", "%m-%d-%Y"]
        };
        if day_first {
            day_month.into_iter().chain(month_day).collect()
        } else {
            month_day.into_iter().chain(day_month).collect()
        }
    };

    formats
        .into_iter()
        .find_map(|f| NaiveDate::parse_from_str(date_part, f).ok())
}

//! Mixed-format timestamp normalization.
//!
//! Trip-record exports are inconsistent about datetime formatting, so the
//! designated pickup/dropoff columns accept a family of formats and collapse
//! to one canonical representation before loading. Values that fit none of
//! the formats become NULL; they never abort a batch.

use chrono::{NaiveDate, NaiveDateTime};

use super::Batch;

/// Datetime formats tried in order. `%.f` also matches an absent fraction.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

/// Date-only formats; US order wins for ambiguous slash dates, matching the
/// source feeds. Parsed dates land at midnight.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y", "%d/%m/%Y"];

pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// Parse a timestamp string in any accepted format.
pub fn parse_mixed(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    parse_datetime(value).or_else(|| parse_date(value).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Canonical textual form written back into the batch. The fraction is only
/// printed when non-zero.
pub fn canonical(value: &NaiveDateTime) -> String {
    value.format("%Y-%m-%d %H:%M:%S%.f").to_string()
}

/// Rewrite the designated timestamp columns of `batch` in place.
///
/// Designated names missing from the header are ignored; all other columns
/// and the row order are untouched. Unparseable values become `None`.
pub fn normalize_batch(batch: &mut Batch, columns: &[String]) {
    let indexes: Vec<usize> = columns
        .iter()
        .filter_map(|name| batch.column_index(name))
        .collect();
    if indexes.is_empty() {
        return;
    }

    for row in &mut batch.rows {
        for &index in &indexes {
            if let Some(cell) = row.get_mut(index) {
                *cell = cell
                    .as_deref()
                    .and_then(parse_mixed)
                    .map(|dt| canonical(&dt));
            }
        }
    }
}

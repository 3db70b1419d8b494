use calamine::DataType;
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;

use crate::recon::*;

/// A named column and the header texts it may appear under.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

/// Opens a worksheet: the named one if a name is provided, else the first one.
pub fn get_range(path: &str, worksheet_name: Option<&str>) -> RIResult<calamine::Range<DataType>> {
    debug!("get_range: path: {:?} worksheet: {:?}", path, worksheet_name);
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;

    if let Some(name) = worksheet_name {
        let wrange = workbook
            .worksheet_range(name)
            .context(MissingWorksheetSnafu { path, name })?
            .context(OpeningExcelSnafu { path })?;
        Ok(wrange)
    } else {
        let wrange = workbook
            .worksheet_range_at(0)
            .context(EmptyExcelSnafu { path })?
            .context(OpeningExcelSnafu { path })?;
        Ok(wrange)
    }
}

// Days between the Excel epoch and a cell serial number.
fn excel_serial_to_date(serial: f64) -> Option<String> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = epoch.checked_add_signed(Duration::days(serial.floor() as i64))?;
    Some(date.format("%d.%m.%Y").to_string())
}

/// The text of a cell, as it would be typed. `None` for blank cells.
///
/// Whole numbers lose their decimal part and dates are written `DD.MM.YYYY`.
pub fn cell_text(cell: &DataType) -> Option<String> {
    match cell {
        DataType::Empty => None,
        DataType::String(s) if s.trim().is_empty() => None,
        DataType::String(s) => Some(s.clone()),
        DataType::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
        DataType::Float(f) => Some(f.to_string()),
        DataType::Int(i) => Some(i.to_string()),
        DataType::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
        DataType::DateTime(serial) => excel_serial_to_date(*serial),
        DataType::Error(e) => {
            debug!("cell_text: error cell {:?}", e);
            None
        }
        #[allow(unreachable_patterns)]
        _ => {
            debug!("cell_text: unsupported cell {:?}", cell);
            None
        }
    }
}

pub fn row_cell(row: &[DataType], idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| row.get(i)).and_then(cell_text)
}

pub fn header_names(header: &[DataType]) -> Vec<Option<String>> {
    header
        .iter()
        .map(|dt| cell_text(dt).map(|s| s.replace('\u{a0}', " ").trim().to_lowercase()))
        .collect()
}

/// Finds a column by its aliases: the leftmost header equal (case-insensitive)
/// to any alias first, then the leftmost header containing one of them.
pub fn find_column(header: &[Option<String>], aliases: &[&str]) -> Option<usize> {
    let lowered: Vec<String> = aliases.iter().map(|a| a.to_lowercase()).collect();
    let names = || header.iter().enumerate().filter_map(|(idx, h)| h.as_deref().map(|s| (idx, s)));
    names()
        .find(|(_, s)| lowered.iter().any(|a| a == s))
        .or_else(|| names().find(|(_, s)| lowered.iter().any(|a| s.contains(a.as_str()))))
        .map(|(idx, _)| idx)
}

/// Locates the columns of a sheet. A missing required column fails the read,
/// a missing optional one is left out of the mapping.
pub fn get_col_index_mapping(
    path: &str,
    header: &[DataType],
    required: &[ColumnSpec],
    optional: &[ColumnSpec],
) -> RIResult<HashMap<&'static str, usize>> {
    let names = header_names(header);
    debug!("get_col_index_mapping: {}: header: {:?}", path, names);
    let mut res: HashMap<&'static str, usize> = HashMap::new();
    let mut missing: Vec<String> = Vec::new();
    for col in required.iter() {
        match find_column(&names, col.aliases) {
            Some(idx) => {
                res.insert(col.name, idx);
            }
            None => missing.push(col.name.to_string()),
        }
    }
    ensure!(
        missing.is_empty(),
        MissingRequiredColumnsSnafu {
            path,
            columns: missing
        }
    );
    for col in optional.iter() {
        if let Some(idx) = find_column(&names, col.aliases) {
            res.insert(col.name, idx);
        } else {
            debug!("get_col_index_mapping: {}: no column {}", path, col.name);
        }
    }
    Ok(res)
}

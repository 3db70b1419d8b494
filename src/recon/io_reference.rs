use calamine::DataType;

use crate::recon::io_common::{get_range, row_cell};
use crate::recon::*;

/// Reads the monthly reference workbook. Its first row is a header and is skipped.
pub fn read_references(path: &str, src: &ReferenceSource) -> RIResult<Vec<RawReferenceRow>> {
    let cols = src.columns()?;
    debug!("read_references: columns: {:?}", cols);
    let wrange = get_range(path, src.excel_worksheet_name.as_deref())?;

    let mut iter = wrange.rows();
    let header = iter.next().context(EmptyExcelSnafu { path })?;
    debug!("read_references: header: {:?}", header);
    let width = header.len();
    let widest = [
        cols.label,
        cols.route,
        cols.length,
        cols.departures,
        cols.trips,
        cols.drivers,
    ]
    .iter()
    .cloned()
    .max()
    .unwrap_or(0);
    if widest >= width {
        warn!(
            "read_references: {}: only {} columns, the cells after them are read as blanks",
            path, width
        );
    }

    let mut res: Vec<RawReferenceRow> = Vec::new();
    for row in iter {
        if row.iter().all(|c| *c == DataType::Empty) {
            continue;
        }
        res.push(RawReferenceRow {
            label: row_cell(row, Some(cols.label)),
            route: row_cell(row, Some(cols.route)),
            route_length_km: row_cell(row, Some(cols.length)),
            departures: row_cell(row, Some(cols.departures)),
            trips: row_cell(row, Some(cols.trips)),
            drivers: row_cell(row, Some(cols.drivers)),
        });
    }
    info!("read_references: {}: {} rows", path, res.len());
    Ok(res)
}

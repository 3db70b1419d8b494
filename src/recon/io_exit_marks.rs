use calamine::DataType;

use crate::recon::io_common::{get_col_index_mapping, get_range, row_cell, ColumnSpec};
use crate::recon::io_trips::KEY5;
use crate::recon::*;

const EXIT_ID: ColumnSpec = ColumnSpec {
    name: "ExitId",
    aliases: &["ExitId", "Exit", "Выход"],
};
const NON_ZERO_TRIPS: ColumnSpec = ColumnSpec {
    name: "NonZeroTrips",
    aliases: &["NonZeroTrips", "Не ноль рейсов"],
};
const FACT_TRIPS: ColumnSpec = ColumnSpec {
    name: "FactTrips",
    aliases: &["FactTrips", "Факт рейсов"],
};

/// Reads the per-exit dispatch log.
pub fn read_exit_marks(path: &str, cfs: &FileSource) -> RIResult<Vec<RawExitMark>> {
    let wrange = get_range(path, cfs.excel_worksheet_name.as_deref())?;
    let mut iter = wrange.rows();
    let header = iter.next().context(EmptyExcelSnafu { path })?;
    let cols = get_col_index_mapping(
        path,
        header,
        &[KEY5, EXIT_ID],
        &[NON_ZERO_TRIPS, FACT_TRIPS],
    )?;
    if !cols.contains_key(NON_ZERO_TRIPS.name) {
        warn!(
            "read_exit_marks: {}: no column {}, the trip counts decide which exits ran",
            path, NON_ZERO_TRIPS.name
        );
    }

    let mut res: Vec<RawExitMark> = Vec::new();
    for row in iter {
        if row.iter().all(|c| *c == DataType::Empty) {
            continue;
        }
        let get = |name: &str| row_cell(row, cols.get(name).cloned());
        res.push(RawExitMark {
            key5: get(KEY5.name),
            exit_id: get(EXIT_ID.name),
            non_zero_trips: get(NON_ZERO_TRIPS.name),
            fact_trips: get(FACT_TRIPS.name),
        });
    }
    info!("read_exit_marks: {}: {} rows", path, res.len());
    Ok(res)
}

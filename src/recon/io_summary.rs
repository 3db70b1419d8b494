use calamine::DataType;

use crate::recon::io_common::{get_col_index_mapping, get_range, row_cell, ColumnSpec};
use crate::recon::io_trips::{KEY2, KEY4};
use crate::recon::*;

const VEHICLE_TYPE: ColumnSpec = ColumnSpec {
    name: "VehicleType",
    aliases: &["VehicleType", "ТипТС", "Вид ТС"],
};
const SPECIAL_ROUTE_FLAG: ColumnSpec = ColumnSpec {
    name: "SpecialRouteFlag",
    aliases: &["SpecialRouteFlag", "КТР", "Ктр", "Ктр."],
};
const PLANNED_DEPARTURES: ColumnSpec = ColumnSpec {
    name: "PlannedDepartures",
    aliases: &["PlannedDepartures", "ПланВыпуск", "План Выпуск", "ПланВып", "План_Выпуск"],
};
const ACTUAL_DEPARTURES: ColumnSpec = ColumnSpec {
    name: "ActualDepartures",
    aliases: &["ActualDepartures", "ФактВыпуск", "Факт Выпуск", "Факт_Выпуск"],
};
const PLANNED_TRIPS: ColumnSpec = ColumnSpec {
    name: "PlannedTrips",
    aliases: &["PlannedTrips", "ПланРейсы", "План Рейсы", "План_Рейсы"],
};
const ACTUAL_TRIPS: ColumnSpec = ColumnSpec {
    name: "ActualTrips",
    aliases: &["ActualTrips", "ФактРейсы", "Факт Рейсы", "Факт_Рейсы"],
};

/// Reads the release summary.
///
/// Only one of the key columns is needed: without Key2 there is no vehicle
/// type or special-route backfill, without Key4 there are no authoritative totals.
pub fn read_summary_rows(path: &str, cfs: &FileSource) -> RIResult<Vec<RawSummaryRow>> {
    let wrange = get_range(path, cfs.excel_worksheet_name.as_deref())?;
    let mut iter = wrange.rows();
    let header = iter.next().context(EmptyExcelSnafu { path })?;
    let cols = get_col_index_mapping(
        path,
        header,
        &[],
        &[
            KEY2,
            KEY4,
            VEHICLE_TYPE,
            SPECIAL_ROUTE_FLAG,
            PLANNED_DEPARTURES,
            ACTUAL_DEPARTURES,
            PLANNED_TRIPS,
            ACTUAL_TRIPS,
        ],
    )?;
    ensure!(
        cols.contains_key(KEY2.name) || cols.contains_key(KEY4.name),
        MissingRequiredColumnsSnafu {
            path,
            columns: vec![KEY2.name.to_string(), KEY4.name.to_string()]
        }
    );
    for col in [KEY2, KEY4, VEHICLE_TYPE] {
        if !cols.contains_key(col.name) {
            warn!("read_summary_rows: {}: no column {}", path, col.name);
        }
    }

    let mut res: Vec<RawSummaryRow> = Vec::new();
    for row in iter {
        if row.iter().all(|c| *c == DataType::Empty) {
            continue;
        }
        let get = |name: &str| row_cell(row, cols.get(name).cloned());
        res.push(RawSummaryRow {
            key2: get(KEY2.name),
            key4: get(KEY4.name),
            vehicle_type: get(VEHICLE_TYPE.name),
            special_route_flag: get(SPECIAL_ROUTE_FLAG.name),
            planned_departures: get(PLANNED_DEPARTURES.name),
            actual_departures: get(ACTUAL_DEPARTURES.name),
            planned_trips: get(PLANNED_TRIPS.name),
            actual_trips: get(ACTUAL_TRIPS.name),
        });
    }
    info!("read_summary_rows: {}: {} rows", path, res.len());
    Ok(res)
}

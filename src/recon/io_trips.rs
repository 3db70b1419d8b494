use calamine::DataType;
use std::collections::HashMap;

use crate::recon::io_common::{get_col_index_mapping, get_range, row_cell, ColumnSpec};
use crate::recon::*;

const DATE: ColumnSpec = ColumnSpec {
    name: "Date",
    aliases: &["Date", "Дата"],
};
const ROUTE: ColumnSpec = ColumnSpec {
    name: "Route",
    aliases: &["Route", "Маршрут"],
};
const BRANCH: ColumnSpec = ColumnSpec {
    name: "Branch",
    aliases: &["Branch", "Филиал", "ТП"],
};
const VEHICLE_TYPE: ColumnSpec = ColumnSpec {
    name: "VehicleType",
    aliases: &["VehicleType", "Vehicle type", "Вид ТС", "ТипТС", "Авт/Эл"],
};
const SPECIAL_ROUTE_FLAG: ColumnSpec = ColumnSpec {
    name: "SpecialRouteFlag",
    aliases: &["SpecialRouteFlag", "Special route", "КТР"],
};
const PLANNED_DEPARTURES: ColumnSpec = ColumnSpec {
    name: "PlannedDepartures",
    aliases: &["PlannedDepartures", "Planned departures", "Выпуск", "ПланВыпуск", "План Выпуск"],
};
const ACTUAL_DEPARTURES: ColumnSpec = ColumnSpec {
    name: "ActualDepartures",
    aliases: &["ActualDepartures", "Actual departures", "ФактВыпуск", "Факт Выпуск"],
};
const PLANNED_TRIPS: ColumnSpec = ColumnSpec {
    name: "PlannedTrips",
    aliases: &["PlannedTrips", "Planned trips", "Количество рейсов произ.", "ПланРейсы", "План Рейсы"],
};
const ACTUAL_TRIPS: ColumnSpec = ColumnSpec {
    name: "ActualTrips",
    aliases: &["ActualTrips", "Actual trips", "ФактРейсы", "Факт Рейсы"],
};
const LOST_TRIPS: ColumnSpec = ColumnSpec {
    name: "LostTrips",
    aliases: &["LostTrips", "Lost trips", "Потери"],
};
pub const KEY2: ColumnSpec = ColumnSpec {
    name: "Key2",
    aliases: &["Key2", "Key 2", "Ключ 2", "Ключ2", "Ключ_2"],
};
pub const KEY4: ColumnSpec = ColumnSpec {
    name: "Key4",
    aliases: &["Key4", "Key 4", "Ключ 4", "Ключ4", "Ключ_4", "Ключ  4"],
};
pub const KEY5: ColumnSpec = ColumnSpec {
    name: "Key5",
    aliases: &["Key5", "Key 5", "Ключ 5", "Ключ5", "Ключ_5"],
};
const SITE: ColumnSpec = ColumnSpec {
    name: "Site",
    aliases: &["Site", "Площадка", "Территория"],
};
const DRIVER_COUNT: ColumnSpec = ColumnSpec {
    name: "DriverCount",
    aliases: &["DriverCount", "Drivers", "Кол-во водителей"],
};
const ROUTE_LENGTH: ColumnSpec = ColumnSpec {
    name: "RouteLengthKm",
    aliases: &["RouteLengthKm", "Route length", "Длина маршр., км", "Длина маршрута"],
};
const MANUAL_PLANNED_DEPARTURES: ColumnSpec = ColumnSpec {
    name: "ManualPlannedDepartures",
    aliases: &["ManualPlannedDepartures", "Ручной выпуск план"],
};
const MANUAL_ACTUAL_DEPARTURES: ColumnSpec = ColumnSpec {
    name: "ManualActualDepartures",
    aliases: &["ManualActualDepartures", "Ручной выпуск факт"],
};
const MANUAL_PLANNED_TRIPS: ColumnSpec = ColumnSpec {
    name: "ManualPlannedTrips",
    aliases: &["ManualPlannedTrips", "Ручной рейсы план"],
};
const MANUAL_ACTUAL_TRIPS: ColumnSpec = ColumnSpec {
    name: "ManualActualTrips",
    aliases: &["ManualActualTrips", "Ручной рейсы факт"],
};

const REQUIRED: [ColumnSpec; 13] = [
    DATE,
    ROUTE,
    BRANCH,
    VEHICLE_TYPE,
    SPECIAL_ROUTE_FLAG,
    PLANNED_DEPARTURES,
    ACTUAL_DEPARTURES,
    PLANNED_TRIPS,
    ACTUAL_TRIPS,
    LOST_TRIPS,
    KEY2,
    KEY4,
    KEY5,
];

const OPTIONAL: [ColumnSpec; 7] = [
    SITE,
    DRIVER_COUNT,
    ROUTE_LENGTH,
    MANUAL_PLANNED_DEPARTURES,
    MANUAL_ACTUAL_DEPARTURES,
    MANUAL_PLANNED_TRIPS,
    MANUAL_ACTUAL_TRIPS,
];

/// Reads the primary trips sheet. Every required column must be present.
pub fn read_trips(path: &str, cfs: &FileSource) -> RIResult<Vec<RawTripRow>> {
    let wrange = get_range(path, cfs.excel_worksheet_name.as_deref())?;
    let mut iter = wrange.rows();
    let header = iter.next().context(EmptyExcelSnafu { path })?;
    let cols: HashMap<&'static str, usize> = get_col_index_mapping(path, header, &REQUIRED, &OPTIONAL)?;
    debug!("read_trips: columns: {:?}", cols);

    let mut res: Vec<RawTripRow> = Vec::new();
    for (idx, row) in iter.enumerate() {
        if row.iter().all(|c| *c == DataType::Empty) {
            continue;
        }
        let get = |name: &str| row_cell(row, cols.get(name).cloned());
        res.push(RawTripRow {
            // Header is row 1 in the sheet.
            source_row: idx + 2,
            date: get(DATE.name),
            route: get(ROUTE.name),
            branch: get(BRANCH.name),
            vehicle_type: get(VEHICLE_TYPE.name),
            special_route_flag: get(SPECIAL_ROUTE_FLAG.name),
            planned_departures: get(PLANNED_DEPARTURES.name),
            actual_departures: get(ACTUAL_DEPARTURES.name),
            planned_trips: get(PLANNED_TRIPS.name),
            actual_trips: get(ACTUAL_TRIPS.name),
            lost_trips: get(LOST_TRIPS.name),
            site: get(SITE.name),
            driver_count: get(DRIVER_COUNT.name),
            route_length_km: get(ROUTE_LENGTH.name),
            manual_planned_departures: get(MANUAL_PLANNED_DEPARTURES.name),
            manual_actual_departures: get(MANUAL_ACTUAL_DEPARTURES.name),
            manual_planned_trips: get(MANUAL_PLANNED_TRIPS.name),
            manual_actual_trips: get(MANUAL_ACTUAL_TRIPS.name),
            key2: get(KEY2.name),
            key4: get(KEY4.name),
            key5: get(KEY5.name),
        });
    }
    info!("read_trips: {}: {} rows", path, res.len());
    Ok(res)
}

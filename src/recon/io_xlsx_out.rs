use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use crate::recon::*;

pub const DUPLICATES_SHEET: &str = "Duplicates";
pub const BRANCH_TOTALS_SHEET: &str = "BranchTotals";

/// The columns of the result sheet, in order.
pub const RESULT_HEADERS: [&str; 46] = [
    "Дата",
    "Маршрут",
    "Длина маршр., км",
    "Выпуск",
    "ФактВыпуск",
    "Количество рейсов произ.",
    "ФактРейсы",
    "Потери",
    "Кол-во водителей",
    "Площадка",
    "Филиал",
    "Авт/Эл",
    "Ключ 2",
    "Ключ 4",
    "Ключ 5",
    "КТР",
    "Дубляж",
    "Дубль Ключ 5",
    "Кол-во Ключ 5",
    "Справочник",
    "Выпуск сумм.",
    "Рейсы сумм",
    "Выпус План ПКД",
    "Выпуск Факт ПКД",
    "Рейсы План ПКД",
    "Рейсы Факт ПКД",
    "Совпадение исх плана выпуска",
    "Совпадение исх факта выпуска",
    "Совпадение исх плана рейсов",
    "Совпадение исх факта рейсов",
    "Корр. Выпуск План",
    "Корр. Выпуск Факт",
    "Корр. Рейсы План",
    "Корр. Рейсы Факт",
    "Совпадение плана выпуска",
    "Совпадение факта выпуска",
    "Совпадение плана рейсов",
    "Совпадение факта рейсов",
    "Выпуск факт КСУПТ",
    "Рейсы факт КСУПТ",
    "Ручной выпуск план",
    "Ручной выпуск факт",
    "Ручной рейсы план",
    "Ручной рейсы факт",
    "Исходная строка",
    "Корр. Выпуск План сумм.",
];

const DUPLICATE_HEADERS: [&str; 9] = [
    "Ключ 5",
    "Исходная строка",
    "Оставлена строка",
    "Дата",
    "Маршрут",
    "Филиал",
    "Авт/Эл",
    "Площадка",
    "Выпуск",
];

const BRANCH_HEADERS: [&str; 11] = [
    "Филиал",
    "Строк",
    "Выпуск",
    "ФактВыпуск",
    "Количество рейсов произ.",
    "ФактРейсы",
    "Потери",
    "Корр. Выпуск План",
    "Корр. Выпуск Факт",
    "Корр. Рейсы План",
    "Корр. Рейсы Факт",
];

/// A value of the output. Unknown values are blank cells, never 0.
#[derive(PartialEq, Debug, Clone)]
pub enum Cell {
    Text(String),
    Number(f64),
    Blank,
}

fn num(x: Option<f64>) -> Cell {
    x.map(Cell::Number).unwrap_or(Cell::Blank)
}

fn text(s: &str) -> Cell {
    Cell::Text(s.to_string())
}

fn opt_text(s: &Option<String>) -> Cell {
    s.as_deref().map(text).unwrap_or(Cell::Blank)
}

fn flag(b: bool) -> Cell {
    Cell::Number(if b { 1.0 } else { 0.0 })
}

fn tier_name(tier: Option<MatchTier>) -> Cell {
    match tier {
        Some(MatchTier::Exact) => text("exact"),
        Some(MatchTier::DateRoute) => text("date+route"),
        Some(MatchTier::RouteOnly) => text("route"),
        None => Cell::Blank,
    }
}

pub fn result_row(row: &ReconciledRow) -> Vec<Cell> {
    let rec = &row.record;
    let metrics = |ms: &MetricSet| -> Vec<Cell> { Metric::ALL.iter().map(|m| num(ms.get(*m))).collect() };
    let mut res = vec![
        text(&rec.date),
        text(&rec.route),
        num(rec.route_length_km),
        num(rec.planned_departures),
        Cell::Number(rec.actual_departures),
        num(rec.planned_trips),
        Cell::Number(rec.actual_trips),
        Cell::Number(rec.lost_trips),
        num(rec.driver_count),
        opt_text(&rec.site),
        text(&rec.branch),
        text(rec.vehicle_type.abbreviation()),
        text(&row.keys.key2),
        text(&row.keys.key4),
        text(&row.keys.key5),
        flag(rec.is_special_route),
        flag(row.key4_duplicated),
        flag(row.is_duplicate),
        Cell::Number(row.duplicate_count as f64),
        tier_name(row.match_tier),
        Cell::Number(row.summed_departures),
        Cell::Number(row.summed_trips),
    ];
    res.extend(metrics(&row.authoritative));
    res.extend(metrics(&row.raw_variance));
    res.extend(metrics(&row.corrected));
    res.extend(metrics(&row.corrected_variance));
    res.push(num(row.exit_fact_departures));
    res.push(num(row.exit_fact_trips));
    res.extend(Metric::ALL.iter().map(|m| num(rec.overrides.get(*m))));
    res.push(Cell::Number(rec.source_row as f64));
    res.push(num(row.corrected_total.planned_departures));
    res
}

fn duplicate_row(dm: &DuplicateMember) -> Vec<Cell> {
    let rec = &dm.record;
    vec![
        text(&dm.key5),
        Cell::Number(rec.source_row as f64),
        Cell::Number(dm.canonical_source_row as f64),
        text(&rec.date),
        text(&rec.route),
        text(&rec.branch),
        text(rec.vehicle_type.abbreviation()),
        opt_text(&rec.site),
        num(rec.planned_departures),
    ]
}

fn branch_row(bt: &BranchTotals) -> Vec<Cell> {
    let mut res = vec![
        text(&bt.branch),
        Cell::Number(bt.records as f64),
        Cell::Number(bt.planned_departures),
        Cell::Number(bt.actual_departures),
        Cell::Number(bt.planned_trips),
        Cell::Number(bt.actual_trips),
        Cell::Number(bt.lost_trips),
    ];
    res.extend(Metric::ALL.iter().map(|m| num(bt.corrected.get(*m))));
    res
}

fn write_sheet(
    ws: &mut Worksheet,
    headers: &[&str],
    rows: impl Iterator<Item = Vec<Cell>>,
) -> Result<(), XlsxError> {
    let bold = Format::new().set_bold();
    for (col, h) in headers.iter().enumerate() {
        ws.write_string_with_format(0, col as u16, *h, &bold)?;
    }
    for (idx, cells) in rows.enumerate() {
        let r = (idx + 1) as u32;
        for (col, cell) in cells.iter().enumerate() {
            match cell {
                Cell::Text(s) => {
                    ws.write_string(r, col as u16, s)?;
                }
                Cell::Number(x) => {
                    ws.write_number(r, col as u16, *x)?;
                }
                Cell::Blank => {}
            }
        }
    }
    ws.set_freeze_panes(1, 0)?;
    Ok(())
}

fn build_workbook(report: &ReconReport, sheet_name: &str) -> Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet().set_name(sheet_name)?;
    write_sheet(ws, &RESULT_HEADERS, report.rows.iter().map(result_row))?;
    let ws = workbook.add_worksheet().set_name(DUPLICATES_SHEET)?;
    write_sheet(ws, &DUPLICATE_HEADERS, report.duplicates.iter().map(duplicate_row))?;
    let ws = workbook.add_worksheet().set_name(BRANCH_TOTALS_SHEET)?;
    write_sheet(ws, &BRANCH_HEADERS, report.branch_totals.iter().map(branch_row))?;
    Ok(workbook)
}

/// Writes the result workbook: the result sheet, the duplicates and the branch totals.
pub fn write_report(path: &str, report: &ReconReport, sheet_name: &str) -> RIResult<()> {
    info!(
        "write_report: {}: {} rows in {:?}, {} duplicates, {} branches",
        path,
        report.rows.len(),
        sheet_name,
        report.duplicates.len(),
        report.branch_totals.len()
    );
    let mut workbook = build_workbook(report, sheet_name).context(WritingOutputSnafu { path })?;
    workbook.save(path).context(WritingOutputSnafu { path })?;
    Ok(())
}

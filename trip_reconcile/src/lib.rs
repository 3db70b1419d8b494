mod config;
use log::{debug, info, warn};

pub use crate::config::*;

pub mod builder;
pub mod correction;
pub mod dedup;
pub mod disambiguation;
pub mod discrepancy;
pub mod keys;
pub mod manual;
pub mod matcher;
pub mod normalize;

use crate::correction::{correct, AuthoritativeTotals};
use crate::dedup::deduplicate;
use crate::disambiguation::{SpecialRouteMap, VehicleTypeMap};
use crate::discrepancy::{branch_totals, raw_totals_per_key4, variance_set, ExitFacts};
use crate::keys::{build_keys, key2, KeyedRecord};
use crate::matcher::{fill_gaps, query_for, ReferenceIndex};
use crate::normalize::*;

fn blank(cell: &Option<String>) -> bool {
    cell.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true)
}

fn cell_text(cell: &Option<String>) -> &str {
    cell.as_deref().unwrap_or("")
}

// True when one of the keys written in the sheet differs from the rebuilt one.
fn supplied_keys_differ(row: &RawTripRow, keys: &RecordKeys) -> bool {
    [
        (&row.key2, &keys.key2),
        (&row.key4, &keys.key4),
        (&row.key5, &keys.key5),
    ]
    .iter()
    .any(|(supplied, rebuilt)| {
        !blank(supplied) && normalize_key_text(cell_text(supplied)) != normalize_key_text(rebuilt)
    })
}

/// Turns one raw row into a keyed record, or returns `None` if the row has to be dropped.
fn normalize_row(
    norm: &Normalizer,
    row: &RawTripRow,
    vt_map: &VehicleTypeMap,
    special_map: &SpecialRouteMap,
    rules: &ReconRules,
    stats: &mut ReconStats,
) -> Option<KeyedRecord> {
    let route = norm.normalize_route(cell_text(&row.route));
    if route.route.is_empty() {
        debug!("normalize_row: row {}: no route", row.source_row);
        stats.dropped_missing_route += 1;
        return None;
    }

    let branch = norm.normalize_branch(cell_text(&row.branch));
    if !norm.is_allowed_branch(&branch) {
        debug!(
            "normalize_row: row {}: branch {:?} -> {:?} is not allowed",
            row.source_row, row.branch, branch
        );
        stats.dropped_invalid_branch += 1;
        return None;
    }

    let raw_date = cell_text(&row.date);
    let date = norm
        .extract_date(raw_date)
        .unwrap_or_else(|| raw_date.trim().to_string());

    let own_type = norm.normalize_vehicle_type(cell_text(&row.vehicle_type));
    let vehicle_type = match vt_map.get(&key2(&date, &route.route)) {
        Some(vt) => {
            if own_type != Some(vt) {
                debug!(
                    "normalize_row: row {}: vehicle type {:?} replaced by {:?} from the summary",
                    row.source_row, own_type, vt
                );
                stats.vehicle_type_backfilled += 1;
            }
            Some(vt)
        }
        None => own_type,
    };
    let vehicle_type = match vehicle_type {
        Some(vt) if rules.allows(vt) => vt,
        _ => {
            debug!(
                "normalize_row: row {}: vehicle type {:?} is not reconciled",
                row.source_row, row.vehicle_type
            );
            stats.dropped_vehicle_type += 1;
            return None;
        }
    };

    // The row's own flag, then the summary's for the Key2, then the route suffix.
    let is_special_route = match row.special_route_flag.as_deref().and_then(parse_special_flag) {
        Some(flag) => flag,
        None => match special_map.get(&key2(&date, &route.route)) {
            Some(flag) => {
                stats.special_flag_backfilled += 1;
                flag
            }
            None => route.is_special,
        },
    };
    if is_special_route {
        stats.special_routes += 1;
    }

    let site = Some(cell_text(&row.site).trim().to_string()).filter(|s| !s.is_empty());

    let record = TripRecord {
        source_row: row.source_row,
        date,
        route: route.route,
        branch,
        vehicle_type,
        is_special_route,
        planned_departures: optional_number(row.planned_departures.as_deref()),
        actual_departures: normalize_number(cell_text(&row.actual_departures)),
        planned_trips: optional_number(row.planned_trips.as_deref()),
        actual_trips: normalize_number(cell_text(&row.actual_trips)),
        lost_trips: normalize_number(cell_text(&row.lost_trips)),
        site,
        driver_count: optional_number(row.driver_count.as_deref()),
        route_length_km: optional_number(row.route_length_km.as_deref()),
        overrides: ManualOverrides {
            planned_departures: optional_number(row.manual_planned_departures.as_deref()),
            actual_departures: optional_number(row.manual_actual_departures.as_deref()),
            planned_trips: optional_number(row.manual_planned_trips.as_deref()),
            actual_trips: optional_number(row.manual_actual_trips.as_deref()),
        },
    };
    let keys = build_keys(norm, &record);
    if supplied_keys_differ(row, &keys) {
        debug!(
            "normalize_row: row {}: supplied keys ({:?}, {:?}, {:?}) differ from {:?}",
            row.source_row, row.key2, row.key4, row.key5, keys
        );
        stats.supplied_key_mismatches += 1;
    }
    Some(KeyedRecord { record, keys })
}

/// Runs the reconciliation over all the sources of the input.
///
/// Arguments:
/// * `input` the raw rows of every source. Optional sources may be empty.
/// * `tables` the lookup tables of the text normalizer
/// * `rules` the rules that govern this run
///
/// Row-level problems never fail the run: the rows are dropped or left
/// unmatched and counted in the statistics of the report.
pub fn run_reconciliation(
    input: &ReconInput,
    tables: &NormalizerTables,
    rules: &ReconRules,
) -> Result<ReconReport, ReconError> {
    info!(
        "Processing {:?} trip rows, {:?} reference rows, {:?} summary rows, {:?} exit marks, rules: {:?}",
        input.trips.len(),
        input.references.len(),
        input.summary.len(),
        input.exit_marks.len(),
        rules
    );
    let norm = Normalizer::new(tables)?;
    let mut stats = ReconStats {
        input_rows: input.trips.len(),
        ..Default::default()
    };

    // Normalization, vehicle type backfill and filtering.
    let vt_map = VehicleTypeMap::build(&norm, &input.summary);
    stats.ambiguous_key2 = vt_map.num_ambiguous();
    let special_map = SpecialRouteMap::build(&input.summary);
    let records: Vec<KeyedRecord> = input
        .trips
        .iter()
        .filter_map(|row| normalize_row(&norm, row, &vt_map, &special_map, rules, &mut stats))
        .collect();
    let num_dropped =
        stats.dropped_missing_route + stats.dropped_invalid_branch + stats.dropped_vehicle_type;
    if num_dropped > 0 {
        warn!(
            "run_reconciliation: dropped {} rows: {} without route, {} with a branch outside {:?}, {} with another vehicle type",
            num_dropped,
            stats.dropped_missing_route,
            stats.dropped_invalid_branch,
            tables.allowed_branches,
            stats.dropped_vehicle_type
        );
    }
    if stats.supplied_key_mismatches > 0 {
        warn!(
            "run_reconciliation: {} rows carry keys that differ from the rebuilt ones",
            stats.supplied_key_mismatches
        );
    }
    if records.is_empty() {
        return Err(ReconError::EmptyDataset);
    }
    info!(
        "run_reconciliation: {} records after normalization, {} special routes, {} vehicle types and {} special flags from the summary",
        records.len(),
        stats.special_routes,
        stats.vehicle_type_backfilled,
        stats.special_flag_backfilled
    );

    // Enrichment from the reference workbook.
    let index = ReferenceIndex::build(&norm, &input.references);
    stats.reference_rows = index.num_rows();
    let mut tiers: Vec<Option<MatchTier>> = Vec::with_capacity(records.len());
    let mut enriched: Vec<KeyedRecord> = Vec::with_capacity(records.len());
    for kr in records.iter() {
        match index.lookup(&query_for(&norm, &kr.record)) {
            Some((tier, values)) => {
                match tier {
                    MatchTier::Exact => stats.matched_exact += 1,
                    MatchTier::DateRoute => stats.matched_date_route += 1,
                    MatchTier::RouteOnly => stats.matched_route_only += 1,
                }
                tiers.push(Some(tier));
                enriched.push(KeyedRecord {
                    record: fill_gaps(&kr.record, &values, &mut stats),
                    keys: kr.keys.clone(),
                });
            }
            None => {
                debug!(
                    "run_reconciliation: row {}: no reference for {:?}",
                    kr.record.source_row, kr.keys.key4
                );
                stats.unmatched += 1;
                tiers.push(None);
                enriched.push(kr.clone());
            }
        }
    }
    info!(
        "run_reconciliation: reference matches: exact={} date+route={} route={} none={}",
        stats.matched_exact, stats.matched_date_route, stats.matched_route_only, stats.unmatched
    );
    info!(
        "run_reconciliation: filled route length={} departures={} trips={} drivers={}",
        stats.filled_route_length, stats.filled_departures, stats.filled_trips, stats.filled_drivers
    );

    // Deduplication and correction.
    let dedup = deduplicate(&enriched);
    stats.duplicate_groups = dedup
        .canonical
        .iter()
        .filter(|idx| dedup.is_duplicate(**idx))
        .count();
    stats.removed_duplicates = dedup.num_removed();
    let scope: Vec<usize> = if rules.dedup_first {
        dedup.canonical.clone()
    } else {
        dedup.order.clone()
    };
    let totals = AuthoritativeTotals::build(&input.summary);
    let correction = correct(&enriched, &scope, &totals, &mut stats);
    let raw_totals = raw_totals_per_key4(&enriched, &scope);

    // Cross-source facts and variances.
    let facts = ExitFacts::build(&input.exit_marks);
    stats.exit_fact_keys = facts.len();
    let mut rows: Vec<ReconciledRow> = Vec::with_capacity(scope.len());
    for idx in scope.iter() {
        let kr = &enriched[*idx];
        let authoritative = totals.get(&kr.keys.key4).cloned().unwrap_or(MetricSet::EMPTY);
        let raw_total = raw_totals
            .get(&kr.keys.key4)
            .cloned()
            .unwrap_or(MetricSet::EMPTY);
        let corrected_total = correction
            .totals_per_key4
            .get(&kr.keys.key4)
            .cloned()
            .unwrap_or(MetricSet::EMPTY);
        let fact = facts.get(&kr.keys.key5);
        if fact.is_some() {
            stats.exit_fact_matched += 1;
        }
        rows.push(ReconciledRow {
            record: kr.record.clone(),
            keys: kr.keys.clone(),
            duplicate_count: dedup.multiplicity[*idx],
            is_duplicate: dedup.is_duplicate(*idx),
            key4_duplicated: correction.key4_duplicated[*idx],
            match_tier: tiers[*idx],
            authoritative,
            summed_departures: raw_total.planned_departures.unwrap_or(0.0),
            summed_trips: raw_total.planned_trips.unwrap_or(0.0),
            raw_variance: variance_set(&authoritative, &raw_total),
            corrected: correction.corrected[*idx],
            corrected_total,
            corrected_variance: variance_set(&authoritative, &corrected_total),
            exit_fact_departures: fact.map(|f| f.exits),
            exit_fact_trips: fact.map(|f| f.trips),
        });
    }
    info!(
        "run_reconciliation: exit facts for {} of {} rows ({} Key5 in the dispatch log)",
        stats.exit_fact_matched,
        rows.len(),
        stats.exit_fact_keys
    );

    let duplicates: Vec<DuplicateMember> = dedup
        .order
        .iter()
        .filter(|idx| !dedup.is_canonical(**idx))
        .map(|idx| DuplicateMember {
            key5: enriched[*idx].keys.key5.clone(),
            canonical_source_row: enriched[dedup.canonical_of[*idx]].record.source_row,
            record: enriched[*idx].record.clone(),
        })
        .collect();
    let branch_totals = branch_totals(&enriched, &correction.corrected, &dedup.canonical);
    for bt in branch_totals.iter() {
        info!(
            "Branch {}: {} records, planned departures {} (corrected {:?})",
            bt.branch, bt.records, bt.planned_departures, bt.corrected.planned_departures
        );
    }
    debug!("run_reconciliation: stats: {:?}", stats);

    Ok(ReconReport {
        rows,
        duplicates,
        branch_totals,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn trip(row: usize, route: &str, branch: &str, site: &str, departures: &str) -> RawTripRow {
        RawTripRow {
            source_row: row,
            date: Some("01.07.2024".to_string()),
            route: Some(route.to_string()),
            branch: Some(branch.to_string()),
            vehicle_type: Some("Автобус".to_string()),
            planned_departures: Some(departures.to_string()),
            actual_departures: Some(departures.to_string()),
            planned_trips: Some("10".to_string()),
            actual_trips: Some("9".to_string()),
            lost_trips: Some("1".to_string()),
            site: Some(site.to_string()),
            ..Default::default()
        }
    }

    fn summary(key2: &str, key4: &str, vt: &str, departures: &str) -> RawSummaryRow {
        RawSummaryRow {
            key2: Some(key2.to_string()),
            key4: Some(key4.to_string()),
            vehicle_type: Some(vt.to_string()),
            special_route_flag: None,
            planned_departures: Some(departures.to_string()),
            actual_departures: None,
            planned_trips: Some("20".to_string()),
            actual_trips: None,
        }
    }

    fn run(input: &ReconInput, rules: &ReconRules) -> ReconReport {
        run_reconciliation(input, &NormalizerTables::default(), rules).unwrap()
    }

    #[test]
    fn special_route_and_branch_are_normalized() {
        init();
        let input = ReconInput {
            trips: vec![trip(2, "15к / гк", "Юго-Западный филиал", "П1", "3")],
            ..Default::default()
        };
        let report = run(&input, &ReconRules::DEFAULT_RULES);
        let rec = &report.rows[0].record;
        assert_eq!(rec.route, "15к");
        assert!(rec.is_special_route);
        assert_eq!(rec.branch, "ЮЗ");
        assert_eq!(report.rows[0].keys.key4, "01.07.2024 15к ФЮЗ Авт");
        assert_eq!(report.stats.special_routes, 1);
        assert_eq!(report.stats.unmatched, 1);
    }

    #[test]
    fn two_records_of_one_key5_split_the_total() {
        init();
        let input = ReconInput {
            trips: vec![
                trip(2, "15к", "ЮЗ", "П1", "3"),
                trip(3, "15к", "ЮЗ", "П1", "7"),
            ],
            summary: vec![summary(
                "01.07.2024 15к",
                "01.07.2024 15к ФЮЗ Авт",
                "Автобус",
                "100",
            )],
            ..Default::default()
        };
        let report = run(&input, &ReconRules::DEFAULT_RULES);
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].corrected.planned_departures, Some(30.0));
        assert_eq!(report.rows[1].corrected.planned_departures, Some(70.0));
        assert_eq!(report.rows[0].duplicate_count, 2);
        assert_eq!(report.rows[0].summed_departures, 10.0);
        assert_eq!(report.rows[0].raw_variance.planned_departures, Some(90.0));
        assert_eq!(report.rows[0].corrected_variance.planned_departures, Some(0.0));
        // No authoritative fact in the summary: unknown, not zero.
        assert_eq!(report.rows[0].raw_variance.actual_departures, None);
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].canonical_source_row, 2);
        // Branch totals only see the representative.
        assert_eq!(report.branch_totals.len(), 1);
        assert_eq!(report.branch_totals[0].planned_departures, 3.0);
        assert_eq!(report.stats.duplicate_groups, 1);
        assert_eq!(report.stats.removed_duplicates, 1);
    }

    #[test]
    fn dedup_first_corrects_representatives_only() {
        let input = ReconInput {
            trips: vec![
                trip(2, "15к", "ЮЗ", "П1", "3"),
                trip(3, "15к", "ЮЗ", "П1", "7"),
            ],
            summary: vec![summary(
                "01.07.2024 15к",
                "01.07.2024 15к ФЮЗ Авт",
                "Автобус",
                "100",
            )],
            ..Default::default()
        };
        let rules = ReconRules {
            dedup_first: true,
            ..ReconRules::DEFAULT_RULES
        };
        let report = run(&input, &rules);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].corrected.planned_departures, Some(100.0));
        assert!(!report.rows[0].key4_duplicated);
    }

    #[test]
    fn invalid_rows_are_dropped_and_counted() {
        let mut tram = trip(4, "т25", "ЮЗ", "П1", "3");
        tram.vehicle_type = Some("Трамвай".to_string());
        let input = ReconInput {
            trips: vec![
                trip(2, "  ", "ЮЗ", "П1", "3"),
                trip(3, "15к", "Центральный (депо 3)", "П1", "3"),
                tram,
                trip(5, "м1", "ФСВ", "П1", "3"),
                trip(6, "м1", "СВ", "П1", "3"),
            ],
            ..Default::default()
        };
        let report = run(&input, &ReconRules::DEFAULT_RULES);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].record.branch, "СВ");
        assert_eq!(report.stats.input_rows, 5);
        assert_eq!(report.stats.dropped_missing_route, 1);
        // ФСВ is not one of the default branches.
        assert_eq!(report.stats.dropped_invalid_branch, 2);
        assert_eq!(report.stats.dropped_vehicle_type, 1);

        let rules = ReconRules {
            allowed_vehicle_types: vec![VehicleType::Tram],
            ..ReconRules::DEFAULT_RULES
        };
        let report = run(&input, &rules);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].record.vehicle_type, VehicleType::Tram);
    }

    #[test]
    fn special_flag_comes_from_the_row_then_the_summary_then_the_suffix() {
        let mut own = trip(2, "15к", "ЮЗ", "П1", "3");
        own.special_route_flag = Some("не КТР".to_string());
        let mut flagged = summary("01.07.2024 15к", "", "", "");
        flagged.special_route_flag = Some("КТР".to_string());
        let mut unflagged = summary("01.07.2024 т25", "", "", "");
        unflagged.special_route_flag = Some("не КТР".to_string());
        let input = ReconInput {
            trips: vec![
                own,
                trip(3, "15к", "ЮЗ", "П2", "3"),
                trip(4, "т25/гк", "ЮЗ", "П1", "3"),
                trip(5, "м1/гк", "ЮЗ", "П1", "3"),
            ],
            summary: vec![flagged, unflagged],
            ..Default::default()
        };
        let report = run(&input, &ReconRules::DEFAULT_RULES);
        let by_row = |r: usize| {
            report
                .rows
                .iter()
                .find(|row| row.record.source_row == r)
                .unwrap()
                .record
                .is_special_route
        };
        assert!(!by_row(2));
        assert!(by_row(3));
        assert!(!by_row(4));
        assert!(by_row(5));
        assert_eq!(report.stats.special_flag_backfilled, 2);
        assert_eq!(report.stats.special_routes, 2);
    }

    #[test]
    fn branch_code_carrying_the_marker_matches_exactly() {
        let mut tables = NormalizerTables::default();
        tables.allowed_branches.push("ФСВ".to_string());
        let input = ReconInput {
            trips: vec![trip(2, "15", "ФСВ", "П1", "3")],
            references: vec![RawReferenceRow {
                label: Some("01.07.2024 ФСВ (авт)".to_string()),
                route: Some("15".to_string()),
                departures: Some("6".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let report = run_reconciliation(&input, &tables, &ReconRules::DEFAULT_RULES).unwrap();
        let row = &report.rows[0];
        assert_eq!(row.keys.key4, "01.07.2024 15 ФСВ Авт");
        assert_eq!(row.match_tier, Some(MatchTier::Exact));
    }

    #[test]
    fn empty_dataset_fails() {
        let input = ReconInput {
            trips: vec![trip(2, "15к", "Центральный", "П1", "3")],
            ..Default::default()
        };
        let res = run_reconciliation(&input, &NormalizerTables::default(), &ReconRules::DEFAULT_RULES);
        assert_eq!(res, Err(ReconError::EmptyDataset));
    }

    #[test]
    fn summary_vehicle_type_replaces_the_row_one_unless_ambiguous() {
        let mut unknown = trip(2, "15к", "ЮЗ", "П1", "3");
        unknown.vehicle_type = Some("".to_string());
        let input = ReconInput {
            trips: vec![unknown, trip(3, "м1", "ЮЗ", "П1", "3")],
            summary: vec![
                summary("01.07.2024 15к", "", "Электробус", ""),
                summary("01.07.2024 м1", "", "Автобус", ""),
                summary("01.07.2024 м1", "", "Электробус", ""),
            ],
            ..Default::default()
        };
        let report = run(&input, &ReconRules::DEFAULT_RULES);
        assert_eq!(report.rows.len(), 2);
        let by_route = |r: &str| report.rows.iter().find(|row| row.record.route == r).unwrap();
        assert_eq!(by_route("15к").record.vehicle_type, VehicleType::ElectricBus);
        assert_eq!(by_route("15к").keys.key4, "01.07.2024 15к ФЮЗ Эл");
        assert_eq!(by_route("м1").record.vehicle_type, VehicleType::Bus);
        assert_eq!(report.stats.ambiguous_key2, 1);
        assert_eq!(report.stats.vehicle_type_backfilled, 1);
    }

    #[test]
    fn reference_fills_gaps_and_exit_facts_are_attached() {
        let mut gap = trip(2, "15к", "ЮЗ", "П1", "");
        gap.planned_departures = None;
        gap.key5 = Some("01.07.2024 15к ФЮЗ Авт П1".to_string());
        gap.key4 = Some("something else".to_string());
        let input = ReconInput {
            trips: vec![gap],
            references: vec![RawReferenceRow {
                label: Some("01.07.2024 ЮЗ (авт)".to_string()),
                route: Some("15К".to_string()),
                route_length_km: Some("21,4".to_string()),
                departures: Some("6".to_string()),
                trips: Some("48".to_string()),
                drivers: Some("9".to_string()),
            }],
            exit_marks: vec![
                RawExitMark {
                    key5: Some("01.07.2024 15к ФЮЗ Авт П1".to_string()),
                    exit_id: Some("1".to_string()),
                    non_zero_trips: Some("ПРАВДА".to_string()),
                    fact_trips: Some("8".to_string()),
                },
                RawExitMark {
                    key5: Some("01.07.2024 15к ФЮЗ Авт П2".to_string()),
                    exit_id: Some("1".to_string()),
                    non_zero_trips: Some("ПРАВДА".to_string()),
                    fact_trips: Some("8".to_string()),
                },
            ],
            ..Default::default()
        };
        let report = run(&input, &ReconRules::DEFAULT_RULES);
        let row = &report.rows[0];
        assert_eq!(row.match_tier, Some(MatchTier::Exact));
        assert_eq!(row.record.planned_departures, Some(6.0));
        // Present in the row: not replaced.
        assert_eq!(row.record.planned_trips, Some(10.0));
        assert_eq!(row.record.route_length_km, Some(21.4));
        assert_eq!(row.record.driver_count, Some(9.0));
        assert_eq!(row.exit_fact_departures, Some(1.0));
        assert_eq!(row.exit_fact_trips, Some(8.0));
        assert_eq!(report.stats.supplied_key_mismatches, 1);
        assert_eq!(report.stats.exit_fact_keys, 2);
        // Nothing authoritative for this Key4.
        assert!(row.corrected.is_empty());
        assert_eq!(row.raw_variance.planned_departures, None);
    }
}

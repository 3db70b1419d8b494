use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};
use trip_reconcile::builder::Builder;
use trip_reconcile::*;

use std::fs;
use std::path::Path;

use calamine::{open_workbook, Reader, Xlsx};

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::recon::config_reader::*;

pub mod config_reader;
pub mod io_common;
pub mod io_exit_marks;
pub mod io_reference;
pub mod io_summary;
pub mod io_trips;
pub mod io_xlsx_out;

#[derive(Debug, Snafu)]
pub enum ReconIoError {
    #[snafu(display("Required source {name} is missing (path: {path:?})"))]
    MissingRequiredSource { name: String, path: String },
    #[snafu(display("Missing columns in {path}: {columns:?}"))]
    MissingRequiredColumns { path: String, columns: Vec<String> },
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("No worksheet named {name:?} in {path}"))]
    MissingWorksheet { path: String, name: String },
    #[snafu(display("No data in {path}"))]
    EmptyExcel { path: String },
    #[snafu(display("Error reading file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing json"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Cannot understand column position {value}"))]
    ParsingColumnIndex { value: String },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("Invalid value for rule {rule}: {value:?}"))]
    InvalidRule { rule: String, value: String },
    #[snafu(display("Error writing output {path}"))]
    WritingOutput {
        source: rust_xlsxwriter::XlsxError,
        path: String,
    },
    #[snafu(display("Error writing summary {path}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Reconciliation failed: {source}"))]
    Engine { source: ReconError },
    #[snafu(display("Difference detected between calculated summary and reference summary"))]
    SummaryMismatch {},
}

pub type RIResult<T> = Result<T, ReconIoError>;

fn validate_rules(rules: &RecoRules) -> RIResult<ReconRules> {
    let mut allowed_vehicle_types: Vec<VehicleType> = Vec::new();
    for name in rules.allowed_vehicle_types.iter().flatten() {
        let vt = VehicleType::from_config_name(name).context(InvalidRuleSnafu {
            rule: "allowedVehicleTypes",
            value: name,
        })?;
        if !allowed_vehicle_types.contains(&vt) {
            allowed_vehicle_types.push(vt);
        }
    }
    ensure!(
        rules.allowed_vehicle_types.is_none() || !allowed_vehicle_types.is_empty(),
        InvalidRuleSnafu {
            rule: "allowedVehicleTypes",
            value: "[]"
        }
    );
    Ok(ReconRules {
        allowed_vehicle_types,
        dedup_first: rules.dedup_first.unwrap_or(false),
    })
}

fn validate_tables(rules: &RecoRules) -> RIResult<NormalizerTables> {
    let mut tables = NormalizerTables::default();
    if let Some(marker) = &rules.special_route_marker {
        ensure!(
            !marker.trim().is_empty(),
            InvalidRuleSnafu {
                rule: "specialRouteMarker",
                value: marker
            }
        );
        tables.special_route_marker = marker.trim().to_string();
    }
    if let Some(branches) = &rules.allowed_branches {
        ensure!(
            !branches.is_empty(),
            InvalidRuleSnafu {
                rule: "allowedBranches",
                value: "[]"
            }
        );
        tables.allowed_branches = branches.iter().map(|b| b.trim().to_string()).collect();
    }
    Ok(tables)
}

fn resolve_path(root: &Path, file_path: &str) -> String {
    root.join(file_path).display().to_string()
}

fn required_path(root: &Path, name: &str, file_path: Option<&str>) -> RIResult<String> {
    let file_path = file_path.context(MissingRequiredSourceSnafu { name, path: "" })?;
    let p = resolve_path(root, file_path);
    ensure!(
        Path::new(&p).exists(),
        MissingRequiredSourceSnafu { name, path: &p }
    );
    Ok(p)
}

// An unreadable file contributes nothing: the run goes on with the other sources.
fn read_or_empty<S, T>(
    name: &str,
    path: &str,
    src: &S,
    reader: fn(&str, &S) -> RIResult<Vec<T>>,
) -> Vec<T> {
    info!("Attempting to read {} file {:?}", name, path);
    match reader(path, src) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Could not read source {}: {}, continuing without it", name, e);
            Vec::new()
        }
    }
}

// Optional sources never fail the run, not even when their file is missing.
fn read_optional<T>(
    root: &Path,
    name: &str,
    source: &Option<FileSource>,
    reader: fn(&str, &FileSource) -> RIResult<Vec<T>>,
) -> Vec<T> {
    let cfs = match source {
        Some(cfs) => cfs,
        None => {
            info!("No {} source configured", name);
            return Vec::new();
        }
    };
    let p = resolve_path(root, &cfs.file_path);
    if !Path::new(&p).exists() {
        warn!("Source {} not found at {:?}, continuing without it", name, p);
        return Vec::new();
    }
    read_or_empty(name, &p, cfs, reader)
}

fn metrics_to_json(ms: &MetricSet) -> JSValue {
    json!({
        "plannedDepartures": ms.planned_departures,
        "actualDepartures": ms.actual_departures,
        "plannedTrips": ms.planned_trips,
        "actualTrips": ms.actual_trips,
    })
}

fn stats_to_json(stats: &ReconStats) -> JSValue {
    json!({
        "inputRows": stats.input_rows,
        "droppedMissingRoute": stats.dropped_missing_route,
        "droppedInvalidBranch": stats.dropped_invalid_branch,
        "droppedVehicleType": stats.dropped_vehicle_type,
        "specialRoutes": stats.special_routes,
        "suppliedKeyMismatches": stats.supplied_key_mismatches,
        "vehicleTypeBackfilled": stats.vehicle_type_backfilled,
        "specialFlagBackfilled": stats.special_flag_backfilled,
        "ambiguousKey2": stats.ambiguous_key2,
        "referenceRows": stats.reference_rows,
        "matches": {
            "exact": stats.matched_exact,
            "dateRoute": stats.matched_date_route,
            "routeOnly": stats.matched_route_only,
            "unmatched": stats.unmatched,
        },
        "filled": {
            "routeLength": stats.filled_route_length,
            "departures": stats.filled_departures,
            "trips": stats.filled_trips,
            "drivers": stats.filled_drivers,
        },
        "duplicateGroups": stats.duplicate_groups,
        "removedDuplicates": stats.removed_duplicates,
        "authoritativeKeys": stats.authoritative_keys,
        "authoritativeMatched": stats.authoritative_matched,
        "overridesApplied": stats.overrides_applied,
        "exitFactKeys": stats.exit_fact_keys,
        "exitFactMatched": stats.exit_fact_matched,
    })
}

fn branch_totals_to_json(totals: &[BranchTotals]) -> Vec<JSValue> {
    totals
        .iter()
        .map(|bt| {
            json!({
                "branch": bt.branch,
                "records": bt.records,
                "plannedDepartures": bt.planned_departures,
                "actualDepartures": bt.actual_departures,
                "plannedTrips": bt.planned_trips,
                "actualTrips": bt.actual_trips,
                "lostTrips": bt.lost_trips,
                "corrected": metrics_to_json(&bt.corrected),
            })
        })
        .collect()
}

fn build_summary_js(config: &RecoConfig, sheet_name: &str, report: &ReconReport) -> JSValue {
    json!({
        "config": {
            "sheetName": sheet_name,
            "rules": config.rules,
        },
        "rows": report.rows.len(),
        "duplicates": report.duplicates.len(),
        "stats": stats_to_json(&report.stats),
        "branchTotals": branch_totals_to_json(&report.branch_totals),
    })
}

fn write_summary(dest: &str, pretty_js: &str) -> RIResult<()> {
    if dest == "stdout" {
        println!("{}", pretty_js);
    } else {
        info!("Writing summary to {:?}", dest);
        fs::write(dest, pretty_js).context(WritingSummarySnafu { path: dest })?;
    }
    Ok(())
}

/// Runs a full reconciliation as described by a configuration file.
///
/// Arguments:
/// * `config_path` the JSON run configuration
/// * `output_path` overrides the output workbook of the configuration
/// * `summary_out` overrides the summary destination (a path or `stdout`)
/// * `check_summary_path` a reference summary that the computed one must match
pub fn run_reconciliation_job(
    config_path: &str,
    output_path: Option<&str>,
    summary_out: Option<&str>,
    check_summary_path: Option<&str>,
) -> RIResult<ReconReport> {
    let config_p = Path::new(config_path);
    let config = read_config(config_path)?;
    info!("config: {:?}", config);

    let rules = validate_rules(&config.rules)?;
    let tables = validate_tables(&config.rules)?;

    let root_p = config_p.parent().context(MissingParentDirSnafu {})?;

    let trips_path = required_path(
        root_p,
        "trips",
        config.sources.trips.as_ref().map(|s| s.file_path.as_str()),
    )?;
    let reference_path = required_path(
        root_p,
        "reference",
        config.sources.reference.as_ref().map(|s| s.file_path.as_str()),
    )?;

    let mut builder = Builder::new(&rules)
        .context(EngineSnafu {})?
        .tables(tables)
        .context(EngineSnafu {})?;

    // Both workbooks must exist. A corrupt one is skipped like an optional source.
    if let Some(cfs) = &config.sources.trips {
        for row in read_or_empty("trips", &trips_path, cfs, io_trips::read_trips) {
            builder.add_trip(row).context(EngineSnafu {})?;
        }
    }
    if let Some(src) = &config.sources.reference {
        let rows = read_or_empty(
            "reference",
            &reference_path,
            src,
            io_reference::read_references,
        );
        for row in rows {
            builder.add_reference(row).context(EngineSnafu {})?;
        }
    }
    for row in read_optional(
        root_p,
        "summary",
        &config.sources.summary,
        io_summary::read_summary_rows,
    ) {
        builder.add_summary(row).context(EngineSnafu {})?;
    }
    for mark in read_optional(
        root_p,
        "exitMarks",
        &config.sources.exit_marks,
        io_exit_marks::read_exit_marks,
    ) {
        builder.add_exit_mark(mark).context(EngineSnafu {})?;
    }

    let report = builder.run().context(EngineSnafu {})?;
    debug!("stats: {:?}", report.stats);

    let sheet_name = config
        .output_settings
        .sheet_name
        .clone()
        .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string());
    let out_xlsx = match output_path {
        Some(p) => p.to_string(),
        None => resolve_path(
            root_p,
            config
                .output_settings
                .output_path
                .as_deref()
                .unwrap_or(DEFAULT_OUTPUT_PATH),
        ),
    };
    io_xlsx_out::write_report(&out_xlsx, &report, &sheet_name)?;

    // Assemble the final json
    let result_js = build_summary_js(&config, &sheet_name, &report);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;

    let summary_dest = match summary_out {
        Some(p) => Some(p.to_string()),
        None => config
            .output_settings
            .summary_path
            .as_deref()
            .map(|p| resolve_path(root_p, p)),
    };
    if let Some(dest) = summary_dest {
        write_summary(&dest, &pretty_js_stats)?;
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            return SummaryMismatchSnafu {}.fail();
        }
    }

    info!(
        "Reconciliation done: {} rows, {} duplicates removed",
        report.rows.len(),
        report.stats.removed_duplicates
    );
    Ok(report)
}

// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// One row of the primary trips sheet, as read by the loaders.
///
/// Every cell is kept as text: the engine owns all the normalization.
/// A `None` is a blank cell.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RawTripRow {
    /// Position of the row in its source, used for logging.
    pub source_row: usize,
    pub date: Option<String>,
    pub route: Option<String>,
    pub branch: Option<String>,
    pub vehicle_type: Option<String>,
    pub special_route_flag: Option<String>,
    pub planned_departures: Option<String>,
    pub actual_departures: Option<String>,
    pub planned_trips: Option<String>,
    pub actual_trips: Option<String>,
    pub lost_trips: Option<String>,
    pub site: Option<String>,
    pub driver_count: Option<String>,
    pub route_length_km: Option<String>,
    pub manual_planned_departures: Option<String>,
    pub manual_actual_departures: Option<String>,
    pub manual_planned_trips: Option<String>,
    pub manual_actual_trips: Option<String>,
    /// Keys as they were written in the sheet. Only used to audit the rebuilt keys.
    pub key2: Option<String>,
    pub key4: Option<String>,
    pub key5: Option<String>,
}

/// One row of the monthly reference workbook.
///
/// The label carries the date, the branch and a transport marker, for
/// example `01.07.2024 ЮЗ (авт)`.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RawReferenceRow {
    pub label: Option<String>,
    pub route: Option<String>,
    pub route_length_km: Option<String>,
    pub departures: Option<String>,
    pub trips: Option<String>,
    pub drivers: Option<String>,
}

/// One row of the release summary: the authoritative plan/fact figures of a Key4,
/// and the vehicle type reported for its Key2.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RawSummaryRow {
    pub key2: Option<String>,
    pub key4: Option<String>,
    pub vehicle_type: Option<String>,
    /// The special-route flag reported for the Key2.
    pub special_route_flag: Option<String>,
    pub planned_departures: Option<String>,
    pub actual_departures: Option<String>,
    pub planned_trips: Option<String>,
    pub actual_trips: Option<String>,
}

/// One row of the per-exit dispatch log.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RawExitMark {
    pub key5: Option<String>,
    pub exit_id: Option<String>,
    pub non_zero_trips: Option<String>,
    pub fact_trips: Option<String>,
}

/// Everything a reconciliation run consumes. Optional sources are simply empty.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ReconInput {
    pub trips: Vec<RawTripRow>,
    pub references: Vec<RawReferenceRow>,
    pub summary: Vec<RawSummaryRow>,
    pub exit_marks: Vec<RawExitMark>,
}

// ******** Domain data structures *********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum VehicleType {
    Bus,
    Trolleybus,
    Tram,
    ElectricBus,
}

impl VehicleType {
    pub const ALL: [VehicleType; 4] = [
        VehicleType::Bus,
        VehicleType::Trolleybus,
        VehicleType::Tram,
        VehicleType::ElectricBus,
    ];

    /// The token used inside Key4/Key5.
    pub fn abbreviation(&self) -> &'static str {
        match self {
            VehicleType::Bus => "Авт",
            VehicleType::ElectricBus => "Эл",
            // No short form in the dispatch sheets, the full name is used.
            VehicleType::Trolleybus => "Троллейбус",
            VehicleType::Tram => "Трамвай",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            VehicleType::Bus => "Автобус",
            VehicleType::ElectricBus => "Электробус",
            VehicleType::Trolleybus => "Троллейбус",
            VehicleType::Tram => "Трамвай",
        }
    }

    /// Parses the identifiers used in the run configuration.
    pub fn from_config_name(name: &str) -> Option<VehicleType> {
        match name.trim().to_lowercase().as_str() {
            "bus" => Some(VehicleType::Bus),
            "trolleybus" => Some(VehicleType::Trolleybus),
            "tram" => Some(VehicleType::Tram),
            "electricbus" | "electric_bus" | "ebus" => Some(VehicleType::ElectricBus),
            _ => None,
        }
    }
}

/// Values typed in by hand. A present value always wins, zero included.
#[derive(PartialEq, Debug, Clone, Copy, Default)]
pub struct ManualOverrides {
    pub planned_departures: Option<f64>,
    pub actual_departures: Option<f64>,
    pub planned_trips: Option<f64>,
    pub actual_trips: Option<f64>,
}

impl ManualOverrides {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::PlannedDepartures => self.planned_departures,
            Metric::ActualDepartures => self.actual_departures,
            Metric::PlannedTrips => self.planned_trips,
            Metric::ActualTrips => self.actual_trips,
        }
    }

    pub fn count(&self) -> usize {
        Metric::ALL.iter().filter(|m| self.get(**m).is_some()).count()
    }
}

/// A normalized dispatch row.
///
/// `planned_departures` and `planned_trips` are the reported weights: `None`
/// means the cell was blank and may be filled from the reference workbook.
#[derive(PartialEq, Debug, Clone)]
pub struct TripRecord {
    pub source_row: usize,
    pub date: String,
    pub route: String,
    pub branch: String,
    pub vehicle_type: VehicleType,
    pub is_special_route: bool,
    pub planned_departures: Option<f64>,
    pub actual_departures: f64,
    pub planned_trips: Option<f64>,
    pub actual_trips: f64,
    pub lost_trips: f64,
    pub site: Option<String>,
    pub driver_count: Option<f64>,
    pub route_length_km: Option<f64>,
    pub overrides: ManualOverrides,
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct RecordKeys {
    pub key2: String,
    pub key4: String,
    pub key5: String,
}

/// The four reconciled figures.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Metric {
    PlannedDepartures,
    ActualDepartures,
    PlannedTrips,
    ActualTrips,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::PlannedDepartures,
        Metric::ActualDepartures,
        Metric::PlannedTrips,
        Metric::ActualTrips,
    ];

    pub fn is_departures(&self) -> bool {
        matches!(self, Metric::PlannedDepartures | Metric::ActualDepartures)
    }
}

/// One optional value per metric. `None` is "unknown", which is never the same as zero.
#[derive(PartialEq, Debug, Clone, Copy, Default)]
pub struct MetricSet {
    pub planned_departures: Option<f64>,
    pub actual_departures: Option<f64>,
    pub planned_trips: Option<f64>,
    pub actual_trips: Option<f64>,
}

impl MetricSet {
    pub const EMPTY: MetricSet = MetricSet {
        planned_departures: None,
        actual_departures: None,
        planned_trips: None,
        actual_trips: None,
    };

    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::PlannedDepartures => self.planned_departures,
            Metric::ActualDepartures => self.actual_departures,
            Metric::PlannedTrips => self.planned_trips,
            Metric::ActualTrips => self.actual_trips,
        }
    }

    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        match metric {
            Metric::PlannedDepartures => self.planned_departures = value,
            Metric::ActualDepartures => self.actual_departures = value,
            Metric::PlannedTrips => self.planned_trips = value,
            Metric::ActualTrips => self.actual_trips = value,
        }
    }

    pub fn from_fn(f: impl Fn(Metric) -> Option<f64>) -> MetricSet {
        let mut res = MetricSet::EMPTY;
        for m in Metric::ALL {
            res.set(m, f(m));
        }
        res
    }

    pub fn is_empty(&self) -> bool {
        Metric::ALL.iter().all(|m| self.get(*m).is_none())
    }
}

// ******** Output data structures *********

/// The matcher tier that produced the reference values of a record.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum MatchTier {
    /// date, route, branch and vehicle type
    Exact,
    DateRoute,
    /// Route only. May match across dates and branches.
    RouteOnly,
}

/// A trip record with everything the run derived for it.
#[derive(PartialEq, Debug, Clone)]
pub struct ReconciledRow {
    pub record: TripRecord,
    pub keys: RecordKeys,
    /// Number of records sharing this Key5.
    pub duplicate_count: usize,
    /// More than one record shares this Key5.
    pub is_duplicate: bool,
    /// More than one corrected record shares this Key4. Proportional
    /// correction applies only in that case.
    pub key4_duplicated: bool,
    pub match_tier: Option<MatchTier>,
    pub authoritative: MetricSet,
    pub summed_departures: f64,
    pub summed_trips: f64,
    pub raw_variance: MetricSet,
    pub corrected: MetricSet,
    pub corrected_total: MetricSet,
    pub corrected_variance: MetricSet,
    pub exit_fact_departures: Option<f64>,
    pub exit_fact_trips: Option<f64>,
}

/// A record that lost the canonical election of its Key5 group.
#[derive(PartialEq, Debug, Clone)]
pub struct DuplicateMember {
    pub key5: String,
    pub canonical_source_row: usize,
    pub record: TripRecord,
}

/// Totals of one branch, computed on canonical representatives only.
#[derive(PartialEq, Debug, Clone)]
pub struct BranchTotals {
    pub branch: String,
    pub records: usize,
    pub planned_departures: f64,
    pub actual_departures: f64,
    pub planned_trips: f64,
    pub actual_trips: f64,
    pub lost_trips: f64,
    pub corrected: MetricSet,
}

/// Audit counters of one run. Every skip and fallback decision is counted here.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ReconStats {
    pub input_rows: usize,
    pub dropped_missing_route: usize,
    pub dropped_invalid_branch: usize,
    pub dropped_vehicle_type: usize,
    pub special_routes: usize,
    pub supplied_key_mismatches: usize,
    pub vehicle_type_backfilled: usize,
    pub special_flag_backfilled: usize,
    pub ambiguous_key2: usize,
    pub reference_rows: usize,
    pub matched_exact: usize,
    pub matched_date_route: usize,
    pub matched_route_only: usize,
    pub unmatched: usize,
    pub filled_route_length: usize,
    pub filled_departures: usize,
    pub filled_trips: usize,
    pub filled_drivers: usize,
    pub duplicate_groups: usize,
    pub removed_duplicates: usize,
    pub authoritative_keys: usize,
    pub authoritative_matched: usize,
    pub overrides_applied: usize,
    pub exit_fact_keys: usize,
    pub exit_fact_matched: usize,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ReconReport {
    pub rows: Vec<ReconciledRow>,
    pub duplicates: Vec<DuplicateMember>,
    pub branch_totals: Vec<BranchTotals>,
    pub stats: ReconStats,
}

/// Errors that prevent the reconciliation from completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ReconError {
    /// No trip record survived normalization.
    EmptyDataset,
    /// A lookup table could not be turned into a matcher.
    InvalidTables(String),
}

impl Error for ReconError {}

impl Display for ReconError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconError::EmptyDataset => write!(f, "no trip record left to reconcile"),
            ReconError::InvalidTables(msg) => write!(f, "invalid normalizer tables: {}", msg),
        }
    }
}

// ********* Configuration **********

/// One rule of the branch classifier. Rules are evaluated in order, first match wins.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum BranchRule {
    /// A regular expression searched in the lowercased text (whole-word patterns).
    Pattern { pattern: String, code: String },
    /// Both substrings must appear.
    Both {
        first: String,
        second: String,
        code: String,
    },
    /// A single substring.
    Contains { needle: String, code: String },
}

/// The read-only lookup tables of the normalizer.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct NormalizerTables {
    /// Marker of the special-route suffix: `15к / гк-2` is route `15к`, special.
    pub special_route_marker: String,
    pub branch_rules: Vec<BranchRule>,
    /// Abbreviation token (lowercase) to branch code, walked in order.
    pub branch_abbreviations: Vec<(String, String)>,
    pub allowed_branches: Vec<String>,
    /// Literal prefix of the branch inside Key4/Key5.
    pub branch_key_marker: String,
    /// Latin letter and its Cyrillic look-alike (uppercase).
    pub lookalikes: Vec<(char, char)>,
}

fn owned_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

impl Default for NormalizerTables {
    fn default() -> NormalizerTables {
        let both = |first: &str, second: &str, code: &str| BranchRule::Both {
            first: first.to_string(),
            second: second.to_string(),
            code: code.to_string(),
        };
        NormalizerTables {
            special_route_marker: "гк".to_string(),
            branch_rules: vec![
                BranchRule::Pattern {
                    pattern: r"\bфсв\b".to_string(),
                    code: "ФСВ".to_string(),
                },
                both("юго", "зап", "ЮЗ"),
                both("юго", "вост", "ЮВ"),
                both("север", "вост", "СВ"),
                both("север", "зап", "СЗ"),
                BranchRule::Contains {
                    needle: "южн".to_string(),
                    code: "Ю".to_string(),
                },
            ],
            branch_abbreviations: owned_pairs(&[
                ("юз", "ЮЗ"),
                ("юв", "ЮВ"),
                ("св", "СВ"),
                ("сз", "СЗ"),
                ("ю", "Ю"),
            ]),
            allowed_branches: ["ЮЗ", "СВ", "СЗ", "Ю"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            branch_key_marker: "Ф".to_string(),
            lookalikes: vec![
                ('A', 'А'),
                ('B', 'В'),
                ('C', 'С'),
                ('E', 'Е'),
                ('H', 'Н'),
                ('K', 'К'),
                ('M', 'М'),
                ('O', 'О'),
                ('P', 'Р'),
                ('T', 'Т'),
                ('X', 'Х'),
                ('Y', 'У'),
                ('Z', 'З'),
                ('S', 'С'),
                ('V', 'В'),
            ],
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ReconRules {
    /// Records of other vehicle types are dropped after normalization.
    pub allowed_vehicle_types: Vec<VehicleType>,
    /// Run the proportional correction on canonical representatives only.
    pub dedup_first: bool,
}

impl ReconRules {
    pub const DEFAULT_RULES: ReconRules = ReconRules {
        allowed_vehicle_types: Vec::new(),
        dedup_first: false,
    };

    pub fn allows(&self, vt: VehicleType) -> bool {
        // An empty list means the dispatch default: buses and electric buses.
        if self.allowed_vehicle_types.is_empty() {
            matches!(vt, VehicleType::Bus | VehicleType::ElectricBus)
        } else {
            self.allowed_vehicle_types.contains(&vt)
        }
    }
}

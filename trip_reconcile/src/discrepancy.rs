use std::collections::{BTreeMap, HashMap};

use log::{debug, info};

use crate::config::*;
use crate::keys::KeyedRecord;
use crate::normalize::{is_truthy, normalize_key_text, optional_number};

/// `authoritative - aggregate`, unset as soon as one side is unknown.
pub fn variance(authoritative: Option<f64>, aggregate: Option<f64>) -> Option<f64> {
    Some(authoritative? - aggregate?)
}

pub fn variance_set(authoritative: &MetricSet, aggregate: &MetricSet) -> MetricSet {
    MetricSet::from_fn(|m| variance(authoritative.get(m), aggregate.get(m)))
}

/// The uncorrected value of a metric on a record.
pub fn raw_value(rec: &TripRecord, metric: Metric) -> Option<f64> {
    match metric {
        Metric::PlannedDepartures => rec.planned_departures,
        Metric::ActualDepartures => Some(rec.actual_departures),
        Metric::PlannedTrips => rec.planned_trips,
        Metric::ActualTrips => Some(rec.actual_trips),
    }
}

/// Sums of the uncorrected values of each Key4, over the records of `scope`.
///
/// A metric with no present value in the group is unset.
pub fn raw_totals_per_key4(records: &[KeyedRecord], scope: &[usize]) -> HashMap<String, MetricSet> {
    let mut res: HashMap<String, MetricSet> = HashMap::new();
    for idx in scope.iter() {
        let kr = &records[*idx];
        let entry = res.entry(kr.keys.key4.clone()).or_insert(MetricSet::EMPTY);
        for m in Metric::ALL {
            if let Some(v) = raw_value(&kr.record, m) {
                entry.set(m, Some(entry.get(m).unwrap_or(0.0) + v));
            }
        }
    }
    res
}

/// The cross-source facts of one Key5.
#[derive(PartialEq, Debug, Clone, Copy, Default)]
pub struct ExitFact {
    /// Distinct exits that ran at least one trip.
    pub exits: f64,
    pub trips: f64,
}

/// Facts from the per-exit dispatch log, by Key5.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct ExitFacts {
    facts: HashMap<String, ExitFact>,
}

impl ExitFacts {
    pub fn build(marks: &[RawExitMark]) -> ExitFacts {
        // Key5 -> distinct exits and trip sum, counting only rows that ran.
        let mut acc: HashMap<String, (Vec<String>, f64)> = HashMap::new();
        for mark in marks.iter() {
            let key = normalize_key_text(mark.key5.as_deref().unwrap_or(""));
            if key.is_empty() {
                continue;
            }
            let entry = acc.entry(key).or_insert_with(|| (Vec::new(), 0.0));
            let fact_trips = optional_number(mark.fact_trips.as_deref());
            let ran = match mark.non_zero_trips.as_deref().map(|s| s.trim()) {
                Some(flag) if !flag.is_empty() => is_truthy(flag),
                _ => fact_trips.unwrap_or(0.0) > 0.0,
            };
            if !ran {
                continue;
            }
            if let Some(exit) = mark.exit_id.as_deref().map(|s| s.trim()) {
                if !exit.is_empty() && !entry.0.iter().any(|e| e == exit) {
                    entry.0.push(exit.to_string());
                }
            }
            entry.1 += fact_trips.unwrap_or(0.0);
        }
        let facts: HashMap<String, ExitFact> = acc
            .into_iter()
            .map(|(k, (exits, trips))| {
                (
                    k,
                    ExitFact {
                        exits: exits.len() as f64,
                        trips,
                    },
                )
            })
            .collect();
        info!("ExitFacts::build: {} exit marks, {} Key5", marks.len(), facts.len());
        ExitFacts { facts }
    }

    pub fn get(&self, key5: &str) -> Option<ExitFact> {
        self.facts.get(&normalize_key_text(key5)).cloned()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

/// Totals by branch over the canonical representatives, ordered by branch code.
pub fn branch_totals(records: &[KeyedRecord], corrected: &[MetricSet], canonical: &[usize]) -> Vec<BranchTotals> {
    let mut by_branch: BTreeMap<String, BranchTotals> = BTreeMap::new();
    for idx in canonical.iter() {
        let rec = &records[*idx].record;
        let bt = by_branch
            .entry(rec.branch.clone())
            .or_insert_with(|| BranchTotals {
                branch: rec.branch.clone(),
                records: 0,
                planned_departures: 0.0,
                actual_departures: 0.0,
                planned_trips: 0.0,
                actual_trips: 0.0,
                lost_trips: 0.0,
                corrected: MetricSet::EMPTY,
            });
        bt.records += 1;
        bt.planned_departures += rec.planned_departures.unwrap_or(0.0);
        bt.actual_departures += rec.actual_departures;
        bt.planned_trips += rec.planned_trips.unwrap_or(0.0);
        bt.actual_trips += rec.actual_trips;
        bt.lost_trips += rec.lost_trips;
        for m in Metric::ALL {
            if let Some(v) = corrected[*idx].get(m) {
                bt.corrected.set(m, Some(bt.corrected.get(m).unwrap_or(0.0) + v));
            }
        }
    }
    for bt in by_branch.values() {
        debug!("branch_totals: {}: {} records", bt.branch, bt.records);
    }
    by_branch.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::build_keys;
    use crate::normalize::Normalizer;

    fn mark(key5: &str, exit: &str, flag: Option<&str>, trips: &str) -> RawExitMark {
        RawExitMark {
            key5: Some(key5.to_string()),
            exit_id: Some(exit.to_string()),
            non_zero_trips: flag.map(|s| s.to_string()),
            fact_trips: Some(trips.to_string()),
        }
    }

    fn keyed(norm: &Normalizer, branch: &str, site: &str, departures: f64) -> KeyedRecord {
        let record = TripRecord {
            source_row: 0,
            date: "01.07.2024".to_string(),
            route: "15к".to_string(),
            branch: branch.to_string(),
            vehicle_type: VehicleType::Bus,
            is_special_route: false,
            planned_departures: Some(departures),
            actual_departures: departures - 1.0,
            planned_trips: None,
            actual_trips: 10.0,
            lost_trips: 1.0,
            site: Some(site.to_string()),
            driver_count: None,
            route_length_km: None,
            overrides: ManualOverrides::default(),
        };
        let keys = build_keys(norm, &record);
        KeyedRecord { record, keys }
    }

    #[test]
    fn unknown_side_gives_unknown_variance() {
        assert_eq!(variance(Some(10.0), Some(7.0)), Some(3.0));
        assert_eq!(variance(Some(10.0), None), None);
        assert_eq!(variance(None, Some(0.0)), None);
        let v = variance_set(
            &MetricSet {
                planned_departures: Some(5.0),
                ..MetricSet::EMPTY
            },
            &MetricSet {
                planned_departures: Some(7.0),
                actual_trips: Some(1.0),
                ..MetricSet::EMPTY
            },
        );
        assert_eq!(v.planned_departures, Some(-2.0));
        assert_eq!(v.actual_trips, None);
    }

    #[test]
    fn raw_totals_skip_gaps() {
        let norm = Normalizer::with_default_tables().unwrap();
        let records = vec![
            keyed(&norm, "ЮЗ", "П1", 3.0),
            keyed(&norm, "ЮЗ", "П2", 4.0),
            keyed(&norm, "СВ", "П1", 5.0),
        ];
        let totals = raw_totals_per_key4(&records, &[0, 1, 2]);
        let yz = totals["01.07.2024 15к ФЮЗ Авт"];
        assert_eq!(yz.planned_departures, Some(7.0));
        assert_eq!(yz.actual_departures, Some(5.0));
        assert_eq!(yz.planned_trips, None);
        assert_eq!(yz.actual_trips, Some(20.0));
        assert_eq!(totals.len(), 2);
    }

    #[test]
    fn exit_facts_count_distinct_exits_of_truthy_rows() {
        let facts = ExitFacts::build(&[
            // Not one of the recognized truthy spellings.
            mark("01.07.2024 15к ФЮЗ Авт П1", "1", Some("ИСТИНА"), "5"),
            mark("01.07.2024 15к ФЮЗ Авт П1", "2", Some("TRUE"), "6"),
            mark("01.07.2024 15к ФЮЗ Авт П1", "2", Some("правда"), "1"),
            mark("01.07.2024 15к ФЮЗ Авт П1", "3", Some("FALSE"), "9"),
            // Blank flag: the trip count decides.
            mark("01.07.2024 15к ФЮЗ Авт П1", "4", None, "2"),
            mark("01.07.2024 15к ФЮЗ Авт П1", "5", Some(" "), "0"),
        ]);
        let f = facts.get("01.07.2024  15к ФЮЗ Авт П1").unwrap();
        assert_eq!(f.exits, 2.0);
        assert_eq!(f.trips, 9.0);
    }

    #[test]
    fn key_seen_without_runs_has_zero_facts() {
        let facts = ExitFacts::build(&[mark("k", "1", Some("0"), "3")]);
        assert_eq!(facts.get("k"), Some(ExitFact::default()));
        assert_eq!(facts.get("missing"), None);
    }

    #[test]
    fn branch_totals_exclude_non_canonical_members() {
        let norm = Normalizer::with_default_tables().unwrap();
        let records = vec![
            keyed(&norm, "СВ", "П1", 5.0),
            keyed(&norm, "ЮЗ", "П1", 3.0),
            keyed(&norm, "ЮЗ", "П1", 3.0),
        ];
        let corrected = vec![
            MetricSet {
                planned_departures: Some(6.0),
                ..MetricSet::EMPTY
            },
            MetricSet::EMPTY,
            MetricSet {
                planned_departures: Some(100.0),
                ..MetricSet::EMPTY
            },
        ];
        let totals = branch_totals(&records, &corrected, &[0, 1]);
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].branch, "СВ");
        assert_eq!(totals[0].corrected.planned_departures, Some(6.0));
        assert_eq!(totals[1].branch, "ЮЗ");
        assert_eq!(totals[1].records, 1);
        assert_eq!(totals[1].planned_departures, 3.0);
        assert_eq!(totals[1].lost_trips, 1.0);
        assert_eq!(totals[1].corrected.planned_departures, None);
    }
}

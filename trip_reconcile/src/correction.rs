use std::collections::HashMap;

use log::{debug, info};

use crate::config::*;
use crate::keys::KeyedRecord;
use crate::normalize::{normalize_key_text, optional_number};

/// The authoritative plan/fact figures of each Key4, from the release summary.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct AuthoritativeTotals {
    totals: HashMap<String, MetricSet>,
}

impl AuthoritativeTotals {
    pub fn build(rows: &[RawSummaryRow]) -> AuthoritativeTotals {
        let mut totals: HashMap<String, MetricSet> = HashMap::new();
        for row in rows.iter() {
            let key = normalize_key_text(row.key4.as_deref().unwrap_or(""));
            if key.is_empty() {
                continue;
            }
            let values = MetricSet {
                planned_departures: optional_number(row.planned_departures.as_deref()),
                actual_departures: optional_number(row.actual_departures.as_deref()),
                planned_trips: optional_number(row.planned_trips.as_deref()),
                actual_trips: optional_number(row.actual_trips.as_deref()),
            };
            totals.entry(key).or_insert(values);
        }
        info!("AuthoritativeTotals::build: {} summary rows, {} Key4", rows.len(), totals.len());
        AuthoritativeTotals { totals }
    }

    pub fn get(&self, key4: &str) -> Option<&MetricSet> {
        self.totals.get(&normalize_key_text(key4))
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

/// The corrected values of a run.
#[derive(PartialEq, Debug, Clone)]
pub struct Correction {
    /// For each record. Records outside the corrected set only carry their overrides.
    pub corrected: Vec<MetricSet>,
    /// For each record: its Key4 group in the corrected set has more than one member.
    pub key4_duplicated: Vec<bool>,
    /// Sum of the present corrected values of each Key4.
    pub totals_per_key4: HashMap<String, MetricSet>,
}

/// The reported figure a record is weighted by for this metric.
pub fn weight(rec: &TripRecord, metric: Metric) -> Option<f64> {
    if metric.is_departures() {
        rec.planned_departures
    } else {
        rec.planned_trips
    }
}

/// Share of the authoritative total that goes to one member of a Key4 group.
///
/// Unset when the total is unknown, when the member's own weight is unknown,
/// or when the weights add up to zero.
pub fn proportional_share(authoritative: Option<f64>, weight: Option<f64>, weight_sum: f64) -> Option<f64> {
    let total = authoritative?;
    let w = weight?;
    if weight_sum == 0.0 {
        return None;
    }
    Some((total * w / weight_sum).round_ties_even())
}

/// Groups the records in `scope` by Key4 and spreads the authoritative totals
/// of each group over its members.
pub fn correct(
    records: &[KeyedRecord],
    scope: &[usize],
    totals: &AuthoritativeTotals,
    stats: &mut ReconStats,
) -> Correction {
    let mut corrected: Vec<MetricSet> = records
        .iter()
        .map(|kr| MetricSet::from_fn(|m| kr.record.overrides.get(m)))
        .collect();
    let mut key4_duplicated: Vec<bool> = vec![false; records.len()];

    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut group_order: Vec<&str> = Vec::new();
    for idx in scope.iter() {
        let key4 = records[*idx].keys.key4.as_str();
        groups
            .entry(key4)
            .or_insert_with(|| {
                group_order.push(key4);
                Vec::new()
            })
            .push(*idx);
    }

    let mut totals_per_key4: HashMap<String, MetricSet> = HashMap::new();
    let mut num_matched = 0;
    for key4 in group_order.iter() {
        let members = &groups[key4];
        let authoritative = totals.get(key4).cloned();
        if authoritative.is_some() {
            num_matched += 1;
        } else {
            debug!("correct: no authoritative totals for {:?}", key4);
        }
        let auth = authoritative.unwrap_or(MetricSet::EMPTY);
        for m in Metric::ALL {
            let weight_sum: f64 = members
                .iter()
                .filter_map(|idx| weight(&records[*idx].record, m))
                .sum();
            for idx in members.iter() {
                let rec = &records[*idx].record;
                let value = match rec.overrides.get(m) {
                    Some(v) => {
                        stats.overrides_applied += 1;
                        Some(v)
                    }
                    None if members.len() == 1 => auth.get(m),
                    None => proportional_share(auth.get(m), weight(rec, m), weight_sum),
                };
                corrected[*idx].set(m, value);
            }
        }
        for idx in members.iter() {
            key4_duplicated[*idx] = members.len() > 1;
        }
        let group_total = MetricSet::from_fn(|m| {
            let present: Vec<f64> = members
                .iter()
                .filter_map(|idx| corrected[*idx].get(m))
                .collect();
            if present.is_empty() {
                None
            } else {
                Some(present.iter().sum())
            }
        });
        totals_per_key4.insert(key4.to_string(), group_total);
    }

    stats.authoritative_keys = totals.len();
    stats.authoritative_matched = num_matched;
    info!(
        "correct: {} records in {} Key4 groups, {} with authoritative totals, {} overrides applied",
        scope.len(),
        group_order.len(),
        num_matched,
        stats.overrides_applied
    );
    Correction {
        corrected,
        key4_duplicated,
        totals_per_key4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::build_keys;
    use crate::normalize::Normalizer;

    fn keyed(norm: &Normalizer, row: usize, site: &str, departures: Option<f64>) -> KeyedRecord {
        let record = TripRecord {
            source_row: row,
            date: "01.07.2024".to_string(),
            route: "15к".to_string(),
            branch: "ЮЗ".to_string(),
            vehicle_type: VehicleType::Bus,
            is_special_route: false,
            planned_departures: departures,
            actual_departures: 0.0,
            planned_trips: departures.map(|d| d * 8.0),
            actual_trips: 0.0,
            lost_trips: 0.0,
            site: Some(site.to_string()),
            driver_count: None,
            route_length_km: None,
            overrides: ManualOverrides::default(),
        };
        let keys = build_keys(norm, &record);
        KeyedRecord { record, keys }
    }

    fn summary(key4: &str, planned_departures: &str) -> RawSummaryRow {
        RawSummaryRow {
            key4: Some(key4.to_string()),
            planned_departures: Some(planned_departures.to_string()),
            planned_trips: Some("800".to_string()),
            ..Default::default()
        }
    }

    const KEY4: &str = "01.07.2024 15к ФЮЗ Авт";

    #[test]
    fn split_thirty_seventy() {
        let norm = Normalizer::with_default_tables().unwrap();
        let records = vec![
            keyed(&norm, 0, "П1", Some(3.0)),
            keyed(&norm, 1, "П2", Some(7.0)),
        ];
        let totals = AuthoritativeTotals::build(&[summary(KEY4, "100")]);
        let mut stats = ReconStats::default();
        let c = correct(&records, &[0, 1], &totals, &mut stats);
        assert_eq!(c.corrected[0].planned_departures, Some(30.0));
        assert_eq!(c.corrected[1].planned_departures, Some(70.0));
        assert_eq!(c.corrected[0].planned_trips, Some(240.0));
        assert_eq!(c.corrected[1].planned_trips, Some(560.0));
        // No authoritative actual departures in the summary.
        assert_eq!(c.corrected[0].actual_departures, None);
        assert_eq!(c.key4_duplicated, vec![true, true]);
        let total = c.totals_per_key4[KEY4];
        assert_eq!(total.planned_departures, Some(100.0));
        assert_eq!(total.actual_departures, None);
        assert_eq!(stats.authoritative_matched, 1);
    }

    #[test]
    fn override_zero_beats_authoritative() {
        let norm = Normalizer::with_default_tables().unwrap();
        let mut rec = keyed(&norm, 0, "П1", Some(3.0));
        rec.record.overrides.planned_departures = Some(0.0);
        let totals = AuthoritativeTotals::build(&[summary(KEY4, "50")]);
        let mut stats = ReconStats::default();
        let c = correct(&[rec], &[0], &totals, &mut stats);
        assert_eq!(c.corrected[0].planned_departures, Some(0.0));
        assert_eq!(c.key4_duplicated, vec![false]);
        assert_eq!(stats.overrides_applied, 1);
    }

    #[test]
    fn single_member_takes_the_total_unchanged() {
        let norm = Normalizer::with_default_tables().unwrap();
        let records = vec![keyed(&norm, 0, "П1", None)];
        let totals = AuthoritativeTotals::build(&[summary(KEY4, "50")]);
        let c = correct(&records, &[0], &totals, &mut ReconStats::default());
        assert_eq!(c.corrected[0].planned_departures, Some(50.0));
    }

    #[test]
    fn no_authoritative_match_leaves_nulls() {
        let norm = Normalizer::with_default_tables().unwrap();
        let records = vec![keyed(&norm, 0, "П1", Some(3.0))];
        let totals = AuthoritativeTotals::build(&[summary("02.07.2024 15к ФЮЗ Авт", "50")]);
        let mut stats = ReconStats::default();
        let c = correct(&records, &[0], &totals, &mut stats);
        assert!(c.corrected[0].is_empty());
        assert!(c.totals_per_key4[KEY4].is_empty());
        assert_eq!(stats.authoritative_matched, 0);
    }

    #[test]
    fn unknown_weight_or_zero_sum_is_unset() {
        let norm = Normalizer::with_default_tables().unwrap();
        let records = vec![
            keyed(&norm, 0, "П1", None),
            keyed(&norm, 1, "П2", Some(0.0)),
        ];
        let totals = AuthoritativeTotals::build(&[summary(KEY4, "10")]);
        let c = correct(&records, &[0, 1], &totals, &mut ReconStats::default());
        assert_eq!(c.corrected[0].planned_departures, None);
        assert_eq!(c.corrected[1].planned_departures, None);
        assert_eq!(proportional_share(Some(10.0), Some(1.0), 0.0), None);
        assert_eq!(proportional_share(None, Some(1.0), 2.0), None);
    }

    #[test]
    fn out_of_scope_records_keep_only_overrides() {
        let norm = Normalizer::with_default_tables().unwrap();
        let mut records = vec![
            keyed(&norm, 0, "П1", Some(3.0)),
            keyed(&norm, 1, "П1", Some(7.0)),
        ];
        records[1].record.overrides.actual_trips = Some(12.0);
        let totals = AuthoritativeTotals::build(&[summary(KEY4, "100")]);
        let c = correct(&records, &[0], &totals, &mut ReconStats::default());
        assert_eq!(c.corrected[0].planned_departures, Some(100.0));
        assert_eq!(c.corrected[1].planned_departures, None);
        assert_eq!(c.corrected[1].actual_trips, Some(12.0));
        assert!(!c.key4_duplicated[1]);
    }

    #[test]
    fn shares_add_up_within_rounding() {
        let norm = Normalizer::with_default_tables().unwrap();
        let weights = [1.0, 2.0, 2.0, 5.0, 7.0, 11.0];
        for n in 2..=weights.len() {
            let records: Vec<KeyedRecord> = weights[..n]
                .iter()
                .enumerate()
                .map(|(i, w)| keyed(&norm, i, &format!("П{}", i), Some(*w)))
                .collect();
            let scope: Vec<usize> = (0..n).collect();
            for authoritative in [1.0, 13.0, 100.0, 997.0] {
                let totals = AuthoritativeTotals::build(&[summary(KEY4, &authoritative.to_string())]);
                let c = correct(&records, &scope, &totals, &mut ReconStats::default());
                let sum: f64 = c.corrected.iter().filter_map(|s| s.planned_departures).sum();
                assert!((sum - authoritative).abs() <= n as f64, "{} vs {}", sum, authoritative);
            }
        }
    }

    #[test]
    fn half_rounds_to_even() {
        assert_eq!(proportional_share(Some(5.0), Some(1.0), 2.0), Some(2.0));
        assert_eq!(proportional_share(Some(3.0), Some(1.0), 2.0), Some(2.0));
    }
}

use std::cmp::Ordering;
use std::collections::HashMap;

use log::{debug, info};

use crate::keys::KeyedRecord;

/// The Key5 groups of a record set.
///
/// Invariant: every group has at least one member and exactly one canonical
/// representative, so the multiplicities of the representatives add up to
/// the number of records.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Deduplication {
    /// All record indexes, stable-sorted by date, route, branch, vehicle type, site.
    pub order: Vec<usize>,
    /// The canonical representatives, in the same order.
    pub canonical: Vec<usize>,
    /// For each record: the size of its Key5 group.
    pub multiplicity: Vec<usize>,
    /// For each record: the index of the representative of its group.
    pub canonical_of: Vec<usize>,
}

impl Deduplication {
    pub fn is_canonical(&self, idx: usize) -> bool {
        self.canonical_of[idx] == idx
    }

    pub fn is_duplicate(&self, idx: usize) -> bool {
        self.multiplicity[idx] > 1
    }

    pub fn num_groups(&self) -> usize {
        self.canonical.len()
    }

    pub fn num_removed(&self) -> usize {
        self.order.len() - self.canonical.len()
    }
}

fn canonical_order(a: &KeyedRecord, b: &KeyedRecord) -> Ordering {
    let (ra, rb) = (&a.record, &b.record);
    ra.date
        .cmp(&rb.date)
        .then_with(|| ra.route.cmp(&rb.route))
        .then_with(|| ra.branch.cmp(&rb.branch))
        .then_with(|| ra.vehicle_type.cmp(&rb.vehicle_type))
        .then_with(|| ra.site.cmp(&rb.site))
}

/// Groups the records by Key5 and elects the first record of each group, in
/// the stable sort order, as its representative.
pub fn deduplicate(records: &[KeyedRecord]) -> Deduplication {
    let mut order: Vec<usize> = (0..records.len()).collect();
    // sort_by is stable: ties keep their input order.
    order.sort_by(|a, b| canonical_order(&records[*a], &records[*b]));

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for kr in records.iter() {
        *counts.entry(kr.keys.key5.as_str()).or_insert(0) += 1;
    }

    let mut representative: HashMap<&str, usize> = HashMap::new();
    let mut canonical: Vec<usize> = Vec::new();
    let mut canonical_of: Vec<usize> = vec![0; records.len()];
    for idx in order.iter() {
        let key5 = records[*idx].keys.key5.as_str();
        let rep = *representative.entry(key5).or_insert_with(|| {
            canonical.push(*idx);
            *idx
        });
        canonical_of[*idx] = rep;
        if rep != *idx {
            debug!(
                "deduplicate: row {} duplicates row {} on key {:?}",
                records[*idx].record.source_row, records[rep].record.source_row, key5
            );
        }
    }

    let multiplicity: Vec<usize> = records
        .iter()
        .map(|kr| counts.get(kr.keys.key5.as_str()).cloned().unwrap_or(1))
        .collect();

    let res = Deduplication {
        order,
        canonical,
        multiplicity,
        canonical_of,
    };
    info!(
        "deduplicate: {} records, {} Key5 groups, {} duplicates set aside",
        records.len(),
        res.num_groups(),
        res.num_removed()
    );
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;
    use crate::keys::build_keys;
    use crate::normalize::Normalizer;

    fn keyed(norm: &Normalizer, row: usize, date: &str, route: &str, site: Option<&str>) -> KeyedRecord {
        let record = TripRecord {
            source_row: row,
            date: date.to_string(),
            route: route.to_string(),
            branch: "ЮЗ".to_string(),
            vehicle_type: VehicleType::Bus,
            is_special_route: false,
            planned_departures: Some(row as f64),
            actual_departures: 0.0,
            planned_trips: None,
            actual_trips: 0.0,
            lost_trips: 0.0,
            site: site.map(|s| s.to_string()),
            driver_count: None,
            route_length_km: None,
            overrides: ManualOverrides::default(),
        };
        let keys = build_keys(norm, &record);
        KeyedRecord { record, keys }
    }

    #[test]
    fn first_in_stable_order_is_canonical() {
        let norm = Normalizer::with_default_tables().unwrap();
        let records = vec![
            keyed(&norm, 0, "02.07.2024", "15к", Some("П1")),
            keyed(&norm, 1, "01.07.2024", "15к", Some("П1")),
            keyed(&norm, 2, "01.07.2024", "15к", Some("П1")),
            keyed(&norm, 3, "01.07.2024", "15к", None),
        ];
        let d = deduplicate(&records);
        // Site None sorts before any site.
        assert_eq!(d.order, vec![3, 1, 2, 0]);
        assert_eq!(d.canonical, vec![3, 1, 0]);
        assert_eq!(d.canonical_of, vec![0, 1, 1, 3]);
        assert_eq!(d.multiplicity, vec![1, 2, 2, 1]);
        assert!(d.is_duplicate(2));
        assert!(!d.is_canonical(2));
        assert_eq!(d.num_removed(), 1);
    }

    #[test]
    fn multiplicities_of_representatives_add_up() {
        let norm = Normalizer::with_default_tables().unwrap();
        let routes = ["15к", "м1", "15к", "т25", "м1", "15к"];
        for n in 0..=routes.len() {
            let records: Vec<KeyedRecord> = routes[..n]
                .iter()
                .enumerate()
                .map(|(i, r)| keyed(&norm, i, "01.07.2024", r, None))
                .collect();
            let d = deduplicate(&records);
            let total: usize = d.canonical.iter().map(|i| d.multiplicity[*i]).sum();
            assert_eq!(total, records.len());
        }
    }
}

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};

use crate::config::*;
use crate::normalize::{normalize_key_text, parse_special_flag, Normalizer};

/// The vehicle type reported by the release summary for each Key2.
///
/// A Key2 reported with more than one vehicle type is ambiguous: it is left
/// out of the map and its records keep their own classification.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct VehicleTypeMap {
    types: HashMap<String, VehicleType>,
    num_ambiguous: usize,
}

impl VehicleTypeMap {
    pub fn build(norm: &Normalizer, rows: &[RawSummaryRow]) -> VehicleTypeMap {
        // First pass: all the distinct types of a key, in order of appearance.
        let mut seen: HashMap<String, Vec<VehicleType>> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for row in rows.iter() {
            let key = normalize_key_text(row.key2.as_deref().unwrap_or(""));
            if key.is_empty() {
                continue;
            }
            let vt = match row.vehicle_type.as_deref().and_then(|s| norm.normalize_vehicle_type(s)) {
                Some(vt) => vt,
                None => continue,
            };
            let types = seen.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                Vec::new()
            });
            if !types.contains(&vt) {
                types.push(vt);
            }
        }

        let mut res = VehicleTypeMap::default();
        let mut ambiguous: HashSet<&str> = HashSet::new();
        for key in order.iter() {
            let types = &seen[key];
            if types.len() > 1 {
                debug!("VehicleTypeMap::build: ambiguous key {:?}: {:?}", key, types);
                ambiguous.insert(key.as_str());
            } else if let Some(vt) = types.first() {
                res.types.insert(key.clone(), *vt);
            }
        }
        res.num_ambiguous = ambiguous.len();
        if res.num_ambiguous > 0 {
            warn!(
                "VehicleTypeMap::build: {} ambiguous Key2 keep the type of their own row",
                res.num_ambiguous
            );
        }
        info!(
            "VehicleTypeMap::build: {} summary rows, {} Key2 with a single vehicle type",
            rows.len(),
            res.types.len()
        );
        res
    }

    pub fn get(&self, key2: &str) -> Option<VehicleType> {
        self.types.get(&normalize_key_text(key2)).cloned()
    }

    pub fn num_ambiguous(&self) -> usize {
        self.num_ambiguous
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The type a record should carry: the summary's when it has one, else the record's own.
    pub fn resolve(&self, key2: &str, own: Option<VehicleType>) -> Option<VehicleType> {
        self.get(key2).or(own)
    }
}

/// The special-route flag reported by the release summary for each Key2.
///
/// The first readable flag of a key wins.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct SpecialRouteMap {
    flags: HashMap<String, bool>,
}

impl SpecialRouteMap {
    pub fn build(rows: &[RawSummaryRow]) -> SpecialRouteMap {
        let mut res = SpecialRouteMap::default();
        for row in rows.iter() {
            let key = normalize_key_text(row.key2.as_deref().unwrap_or(""));
            let raw = match row.special_route_flag.as_deref() {
                Some(s) if !key.is_empty() && !s.trim().is_empty() => s,
                _ => continue,
            };
            match parse_special_flag(raw) {
                Some(flag) => {
                    res.flags.entry(key).or_insert(flag);
                }
                None => debug!("SpecialRouteMap::build: {:?}: unreadable flag {:?}", key, raw),
            }
        }
        info!("SpecialRouteMap::build: {} Key2 with a special-route flag", res.flags.len());
        res
    }

    pub fn get(&self, key2: &str) -> Option<bool> {
        self.flags.get(&normalize_key_text(key2)).cloned()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

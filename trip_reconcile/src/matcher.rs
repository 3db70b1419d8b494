use std::collections::HashMap;

use log::{debug, info};

use crate::config::*;
use crate::normalize::{optional_number, Normalizer};

/// The authoritative figures carried by one reference row.
#[derive(PartialEq, Debug, Clone, Copy, Default)]
pub struct ReferenceValues {
    pub route_length_km: Option<f64>,
    pub departures: Option<f64>,
    pub trips: Option<f64>,
    pub drivers: Option<f64>,
}

/// What the matcher looks for, built from a normalized trip record.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct MatchQuery {
    pub date: Option<String>,
    pub routes: Vec<String>,
    /// Branch as a key token (with its marker).
    pub branch: Option<String>,
    pub transport: Option<VehicleType>,
}

/// In-memory lookup tables over the reference rows, one per matcher tier.
///
/// Built once before any matching and never modified afterwards. Only the
/// first row seen for a given key is kept.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct ReferenceIndex {
    exact: HashMap<String, ReferenceValues>,
    date_route: HashMap<(String, String), ReferenceValues>,
    route: HashMap<String, ReferenceValues>,
    num_rows: usize,
}

fn exact_key(date: &str, route: &str, branch: &str, vt: VehicleType) -> String {
    format!("{} {} {} {}", date, route, branch, vt.abbreviation())
}

impl ReferenceIndex {
    pub fn build(norm: &Normalizer, rows: &[RawReferenceRow]) -> ReferenceIndex {
        let mut index = ReferenceIndex {
            num_rows: rows.len(),
            ..Default::default()
        };
        for (idx, row) in rows.iter().enumerate() {
            let label = row.label.as_deref().unwrap_or("");
            let date = norm.extract_date(label);
            let branch = norm.label_branch(label);
            let transport = norm.label_transport(label);
            let routes = norm.route_candidates(row.route.as_deref().unwrap_or(""));
            if routes.is_empty() {
                debug!("ReferenceIndex::build: row {}: no route in {:?}", idx, row.route);
                continue;
            }
            let values = ReferenceValues {
                route_length_km: optional_number(row.route_length_km.as_deref()),
                departures: optional_number(row.departures.as_deref()),
                trips: optional_number(row.trips.as_deref()),
                drivers: optional_number(row.drivers.as_deref()),
            };
            for r in routes.iter() {
                if let (Some(d), Some(b), Some(t)) = (&date, &branch, transport) {
                    index.exact.entry(exact_key(d, r, b, t)).or_insert(values);
                }
                if let Some(d) = &date {
                    index
                        .date_route
                        .entry((d.clone(), r.clone()))
                        .or_insert(values);
                }
                index.route.entry(r.clone()).or_insert(values);
            }
        }
        info!(
            "ReferenceIndex::build: {} rows, keys: exact={} date+route={} route={}",
            index.num_rows,
            index.exact.len(),
            index.date_route.len(),
            index.route.len()
        );
        index
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.route.is_empty()
    }

    /// Looks the query up tier by tier and stops at the first tier with a hit.
    ///
    /// Within a tier, the route candidates are tried in order.
    pub fn lookup(&self, q: &MatchQuery) -> Option<(MatchTier, ReferenceValues)> {
        if let (Some(d), Some(b), Some(t)) = (&q.date, &q.branch, q.transport) {
            for r in q.routes.iter() {
                if let Some(v) = self.exact.get(&exact_key(d, r, b, t)) {
                    return Some((MatchTier::Exact, *v));
                }
            }
        }
        if let Some(d) = &q.date {
            for r in q.routes.iter() {
                if let Some(v) = self.date_route.get(&(d.clone(), r.clone())) {
                    return Some((MatchTier::DateRoute, *v));
                }
            }
        }
        for r in q.routes.iter() {
            if let Some(v) = self.route.get(r) {
                return Some((MatchTier::RouteOnly, *v));
            }
        }
        None
    }
}

pub fn query_for(norm: &Normalizer, rec: &TripRecord) -> MatchQuery {
    MatchQuery {
        date: Some(rec.date.clone()).filter(|d| !d.is_empty()),
        routes: norm.route_candidates(&rec.route),
        branch: Some(norm.branch_key_token(&rec.branch)),
        transport: Some(rec.vehicle_type),
    }
}

/// Fills the gaps of a record with the reference values. Present values are never replaced.
pub fn fill_gaps(rec: &TripRecord, values: &ReferenceValues, stats: &mut ReconStats) -> TripRecord {
    let mut res = rec.clone();
    if res.route_length_km.is_none() && values.route_length_km.is_some() {
        res.route_length_km = values.route_length_km;
        stats.filled_route_length += 1;
    }
    if res.planned_departures.is_none() && values.departures.is_some() {
        res.planned_departures = values.departures;
        stats.filled_departures += 1;
    }
    if res.planned_trips.is_none() && values.trips.is_some() {
        res.planned_trips = values.trips;
        stats.filled_trips += 1;
    }
    if res.driver_count.is_none() && values.drivers.is_some() {
        res.driver_count = values.drivers;
        stats.filled_drivers += 1;
    }
    res
}

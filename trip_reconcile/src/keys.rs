use crate::config::*;
use crate::normalize::Normalizer;

/// A trip record with its composite keys.
#[derive(PartialEq, Debug, Clone)]
pub struct KeyedRecord {
    pub record: TripRecord,
    pub keys: RecordKeys,
}

// Fields are joined with one space. Absent fields still take their slot as an
// empty string, so that a present and an absent site never produce the same key.
fn join_fields(fields: &[&str]) -> String {
    fields.join(" ")
}

pub fn key2(date: &str, route: &str) -> String {
    join_fields(&[date, route])
}

pub fn key4(norm: &Normalizer, date: &str, route: &str, branch: &str, vt: VehicleType) -> String {
    let branch_token = norm.branch_key_token(branch);
    join_fields(&[date, route, &branch_token, vt.abbreviation()])
}

pub fn key5(
    norm: &Normalizer,
    date: &str,
    route: &str,
    branch: &str,
    vt: VehicleType,
    site: Option<&str>,
) -> String {
    let branch_token = norm.branch_key_token(branch);
    join_fields(&[
        date,
        route,
        &branch_token,
        vt.abbreviation(),
        site.unwrap_or(""),
    ])
}

pub fn build_keys(norm: &Normalizer, rec: &TripRecord) -> RecordKeys {
    RecordKeys {
        key2: key2(&rec.date, &rec.route),
        key4: key4(norm, &rec.date, &rec.route, &rec.branch, rec.vehicle_type),
        key5: key5(
            norm,
            &rec.date,
            &rec.route,
            &rec.branch,
            rec.vehicle_type,
            rec.site.as_deref(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(site: Option<&str>) -> TripRecord {
        TripRecord {
            source_row: 1,
            date: "01.07.2024".to_string(),
            route: "15к".to_string(),
            branch: "ЮЗ".to_string(),
            vehicle_type: VehicleType::Bus,
            is_special_route: true,
            planned_departures: None,
            actual_departures: 0.0,
            planned_trips: None,
            actual_trips: 0.0,
            lost_trips: 0.0,
            site: site.map(|s| s.to_string()),
            driver_count: None,
            route_length_km: None,
            overrides: ManualOverrides::default(),
        }
    }

    #[test]
    fn keys_in_field_order() {
        let norm = Normalizer::with_default_tables().unwrap();
        let keys = build_keys(&norm, &record(Some("Площадка 2")));
        assert_eq!(keys.key2, "01.07.2024 15к");
        assert_eq!(keys.key4, "01.07.2024 15к ФЮЗ Авт");
        assert_eq!(keys.key5, "01.07.2024 15к ФЮЗ Авт Площадка 2");
    }

    #[test]
    fn absent_fields_keep_their_slot() {
        let norm = Normalizer::with_default_tables().unwrap();
        let with_site = build_keys(&norm, &record(Some("П1")));
        let without_site = build_keys(&norm, &record(None));
        assert_eq!(without_site.key5, "01.07.2024 15к ФЮЗ Авт ");
        assert_ne!(with_site.key5, without_site.key5);
        assert_ne!(without_site.key5, without_site.key4);
        assert_eq!(key2("", "15к"), " 15к");
    }
}

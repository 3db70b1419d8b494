use crate::recon::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

pub const DEFAULT_OUTPUT_PATH: &str = "ЭП_итог.xlsx";
pub const DEFAULT_SHEET_NAME: &str = "ЭкспПоказ";

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputSettings {
    #[serde(rename = "outputPath")]
    pub output_path: Option<String>,
    #[serde(rename = "sheetName")]
    pub sheet_name: Option<String>,
    #[serde(rename = "summaryPath")]
    pub summary_path: Option<String>,
}

/// A spreadsheet whose columns are found by name.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
}

/// The reference workbook, whose columns are addressed by position.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSource {
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
    #[serde(rename = "labelColumnIndex")]
    _label_column_index: Option<JSValue>,
    #[serde(rename = "routeColumnIndex")]
    _route_column_index: Option<JSValue>,
    #[serde(rename = "lengthColumnIndex")]
    _length_column_index: Option<JSValue>,
    #[serde(rename = "departuresColumnIndex")]
    _departures_column_index: Option<JSValue>,
    #[serde(rename = "tripsColumnIndex")]
    _trips_column_index: Option<JSValue>,
    #[serde(rename = "driversColumnIndex")]
    _drivers_column_index: Option<JSValue>,
}

/// 0-based positions of the reference columns.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct ReferenceColumns {
    pub label: usize,
    pub route: usize,
    pub length: usize,
    pub departures: usize,
    pub trips: usize,
    pub drivers: usize,
}

impl ReferenceSource {
    pub fn new(file_path: &str) -> ReferenceSource {
        ReferenceSource {
            file_path: file_path.to_string(),
            excel_worksheet_name: None,
            _label_column_index: None,
            _route_column_index: None,
            _length_column_index: None,
            _departures_column_index: None,
            _trips_column_index: None,
            _drivers_column_index: None,
        }
    }

    pub fn columns(&self) -> RIResult<ReferenceColumns> {
        Ok(ReferenceColumns {
            label: column_index(&self._label_column_index, "A")?,
            route: column_index(&self._route_column_index, "B")?,
            length: column_index(&self._length_column_index, "F")?,
            departures: column_index(&self._departures_column_index, "G")?,
            trips: column_index(&self._trips_column_index, "R")?,
            drivers: column_index(&self._drivers_column_index, "W")?,
        })
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Sources {
    pub trips: Option<FileSource>,
    pub reference: Option<ReferenceSource>,
    pub summary: Option<FileSource>,
    #[serde(rename = "exitMarks")]
    pub exit_marks: Option<FileSource>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecoRules {
    #[serde(rename = "specialRouteMarker")]
    pub special_route_marker: Option<String>,
    #[serde(rename = "allowedBranches")]
    pub allowed_branches: Option<Vec<String>>,
    #[serde(rename = "allowedVehicleTypes")]
    pub allowed_vehicle_types: Option<Vec<String>>,
    #[serde(rename = "dedupFirst")]
    pub dedup_first: Option<bool>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RecoConfig {
    #[serde(rename = "outputSettings", default)]
    pub output_settings: OutputSettings,
    pub sources: Sources,
    #[serde(default)]
    pub rules: RecoRules,
}

pub fn read_config(path: &str) -> RIResult<RecoConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: RecoConfig = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    Ok(config)
}

pub fn read_summary(path: &str) -> RIResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

/// Converts Excel column letters (`A`, `W`, `AA`) to a 0-based index.
pub fn excel_column_index(letters: &str) -> Option<usize> {
    let s = letters.trim();
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let n = s.to_ascii_uppercase().chars().try_fold(0usize, |acc, c| {
        acc.checked_mul(26)?.checked_add(c as usize - 'A' as usize + 1)
    })?;
    Some(n - 1)
}

// Column positions are Excel letters or 1-based numbers.
fn column_index(x: &Option<JSValue>, default: &str) -> RIResult<usize> {
    let value = format!("{:?}", x);
    match x {
        None => excel_column_index(default).context(ParsingColumnIndexSnafu { value }),
        Some(JSValue::Number(n)) => n
            .as_u64()
            .filter(|n| *n >= 1)
            .map(|n| (n - 1) as usize)
            .context(ParsingColumnIndexSnafu { value }),
        Some(JSValue::String(s)) if s.chars().all(|c| c.is_ascii_digit()) => s
            .parse::<usize>()
            .ok()
            .filter(|n| *n >= 1)
            .map(|n| n - 1)
            .context(ParsingColumnIndexSnafu { value }),
        Some(JSValue::String(s)) => {
            excel_column_index(s).context(ParsingColumnIndexSnafu { value })
        }
        _ => None.context(ParsingColumnIndexSnafu { value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn excel_letters() {
        assert_eq!(excel_column_index("A"), Some(0));
        assert_eq!(excel_column_index("w"), Some(22));
        assert_eq!(excel_column_index("Z"), Some(25));
        assert_eq!(excel_column_index("AA"), Some(26));
        assert_eq!(excel_column_index("AQ"), Some(42));
        assert_eq!(excel_column_index("A1"), None);
        assert_eq!(excel_column_index(""), None);
        // Too many letters for an index.
        assert_eq!(excel_column_index(&"Z".repeat(30)), None);
    }

    #[test]
    fn reference_columns() {
        let mut src = ReferenceSource::new("july.xlsx");
        assert_eq!(
            src.columns().unwrap(),
            ReferenceColumns {
                label: 0,
                route: 1,
                length: 5,
                departures: 6,
                trips: 17,
                drivers: 22,
            }
        );
        src._departures_column_index = Some(json!(8));
        src._trips_column_index = Some(json!("19"));
        src._drivers_column_index = Some(json!("AA"));
        let cols = src.columns().unwrap();
        assert_eq!(cols.departures, 7);
        assert_eq!(cols.trips, 18);
        assert_eq!(cols.drivers, 26);

        src._label_column_index = Some(json!(0));
        assert!(src.columns().is_err());
        src._label_column_index = Some(json!(true));
        assert!(src.columns().is_err());
        src._label_column_index = Some(json!("A".repeat(40)));
        assert!(matches!(
            src.columns(),
            Err(ReconIoError::ParsingColumnIndex { .. })
        ));
    }

    #[test]
    fn minimal_config() {
        let config: RecoConfig = serde_json::from_str(
            r#"{
                "sources": {
                    "trips": { "filePath": "trips.xlsx", "excelWorksheetName": "Выпуск и рейсы КСУПТ" },
                    "reference": { "filePath": "july.xlsx", "departuresColumnIndex": "G" }
                },
                "rules": { "dedupFirst": true }
            }"#,
        )
        .unwrap();
        assert_eq!(config.output_settings, OutputSettings::default());
        assert_eq!(config.sources.summary, None);
        assert_eq!(config.rules.dedup_first, Some(true));
        assert_eq!(config.sources.reference.unwrap().columns().unwrap().departures, 6);
    }
}

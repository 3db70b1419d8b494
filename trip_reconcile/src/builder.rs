pub use crate::config::*;

use crate::normalize::Normalizer;

/// A builder for assembling the input of a run, one source row at a time.
///
/// ```
/// pub use trip_reconcile::builder::Builder;
/// pub use trip_reconcile::ReconRules;
/// # use trip_reconcile::ReconError;
///
/// let mut builder = Builder::new(&ReconRules::DEFAULT_RULES)?;
///
/// builder.add_trip_simple("01.07.2024", "15к / гк", "Юго-Западный филиал", "Автобус", "3", "24")?;
///
/// let report = builder.run()?;
/// assert_eq!(report.rows[0].record.route, "15к");
/// assert!(report.rows[0].record.is_special_route);
/// assert_eq!(report.rows[0].record.branch, "ЮЗ");
///
/// # Ok::<(), ReconError>(())
/// ```
pub struct Builder {
    pub(crate) _rules: ReconRules,
    pub(crate) _tables: NormalizerTables,
    pub(crate) _input: ReconInput,
}

impl Builder {
    pub fn new(rules: &ReconRules) -> Result<Builder, ReconError> {
        Ok(Builder {
            _rules: rules.clone(),
            _tables: NormalizerTables::default(),
            _input: ReconInput::default(),
        })
    }

    /// Replaces the normalizer tables. They are checked right away.
    pub fn tables(self, tables: NormalizerTables) -> Result<Builder, ReconError> {
        Normalizer::new(&tables)?;
        Ok(Builder {
            _rules: self._rules,
            _tables: tables,
            _input: self._input,
        })
    }

    /// Adds a trip row with only the usual columns filled.
    pub fn add_trip_simple(
        &mut self,
        date: &str,
        route: &str,
        branch: &str,
        vehicle_type: &str,
        planned_departures: &str,
        planned_trips: &str,
    ) -> Result<(), ReconError> {
        let cell = |s: &str| Some(s.to_string());
        self.add_trip(RawTripRow {
            date: cell(date),
            route: cell(route),
            branch: cell(branch),
            vehicle_type: cell(vehicle_type),
            planned_departures: cell(planned_departures),
            planned_trips: cell(planned_trips),
            ..Default::default()
        })
    }

    /// Adds a trip row.
    ///
    /// A row without a source position is numbered after the rows already added.
    pub fn add_trip(&mut self, row: RawTripRow) -> Result<(), ReconError> {
        let source_row = if row.source_row == 0 {
            self._input.trips.len() + 1
        } else {
            row.source_row
        };
        self._input.trips.push(RawTripRow { source_row, ..row });
        Ok(())
    }

    pub fn add_reference(&mut self, row: RawReferenceRow) -> Result<(), ReconError> {
        self._input.references.push(row);
        Ok(())
    }

    pub fn add_summary(&mut self, row: RawSummaryRow) -> Result<(), ReconError> {
        self._input.summary.push(row);
        Ok(())
    }

    pub fn add_exit_mark(&mut self, mark: RawExitMark) -> Result<(), ReconError> {
        self._input.exit_marks.push(mark);
        Ok(())
    }

    pub fn input(&self) -> &ReconInput {
        &self._input
    }

    pub fn run(&self) -> Result<ReconReport, ReconError> {
        crate::run_reconciliation(&self._input, &self._tables, &self._rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_numbered_in_order() {
        let mut builder = Builder::new(&ReconRules::DEFAULT_RULES).unwrap();
        builder
            .add_trip_simple("01.07.2024", "15к", "ЮЗ", "Автобус", "3", "24")
            .unwrap();
        builder
            .add_trip(RawTripRow {
                source_row: 40,
                ..Default::default()
            })
            .unwrap();
        builder
            .add_trip_simple("01.07.2024", "м1", "ЮЗ", "Автобус", "3", "24")
            .unwrap();
        let rows: Vec<usize> = builder.input().trips.iter().map(|r| r.source_row).collect();
        assert_eq!(rows, vec![1, 40, 3]);
    }

    #[test]
    fn invalid_tables_are_rejected() {
        let tables = NormalizerTables {
            branch_rules: vec![BranchRule::Pattern {
                pattern: "(".to_string(),
                code: "ЮЗ".to_string(),
            }],
            ..Default::default()
        };
        let res = Builder::new(&ReconRules::DEFAULT_RULES).and_then(|b| b.tables(tables));
        assert!(matches!(res, Err(ReconError::InvalidTables(_))));
    }
}

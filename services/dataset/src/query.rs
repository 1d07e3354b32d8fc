//! Exact-match filtering and the historical monthly average.

use serde::Serialize;

use crate::error::QueryError;
use crate::join::{DenormalizedRecord, DenormalizedTable};

/// Exact-match predicate; `None` fields are unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub region_id: Option<i64>,
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub category_code: Option<i64>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(mut self, region_id: i64) -> Self {
        self.region_id = Some(region_id);
        self
    }

    pub fn year(mut self, year: i64) -> Self {
        self.year = Some(year);
        self
    }

    pub fn month(mut self, month: i64) -> Self {
        self.month = Some(month);
        self
    }

    pub fn category(mut self, category_code: i64) -> Self {
        self.category_code = Some(category_code);
        self
    }

    pub fn matches(&self, record: &DenormalizedRecord) -> bool {
        fn eq(wanted: Option<i64>, actual: i64) -> bool {
            wanted.map_or(true, |w| w == actual)
        }
        eq(self.region_id, record.region_id)
            && eq(self.year, record.year)
            && eq(self.month, record.month)
            && eq(self.category_code, record.category_code)
    }
}

/// Rows matching `filter`, in table order.
pub fn filter_by(table: &DenormalizedTable, filter: &RecordFilter) -> Vec<DenormalizedRecord> {
    table
        .rows
        .iter()
        .filter(|r| filter.matches(r))
        .cloned()
        .collect()
}

/// Current-period quantity next to the mean of the same month across all years.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalAverage {
    pub region_id: i64,
    pub region_name: Option<String>,
    pub category_code: i64,
    pub category_name: Option<String>,
    pub month: i64,
    pub year: i64,
    pub current_quantity: i64,
    pub historical_mean: f64,
}

pub fn historical_average(
    table: &DenormalizedTable,
    region_id: i64,
    year: i64,
    month: i64,
    category_code: i64,
) -> Result<HistoricalAverage, QueryError> {
    let historical = RecordFilter::new()
        .region(region_id)
        .month(month)
        .category(category_code);
    let specific = historical.year(year);

    // Duplicates are not validated: the first matching row is reported.
    let current = table
        .rows
        .iter()
        .find(|r| specific.matches(r))
        .ok_or(QueryError::NotFound {
            region_id,
            category_code,
            month,
            year,
        })?;

    let (sum, count) = table
        .rows
        .iter()
        .filter(|r| historical.matches(r))
        .fold((0i64, 0u32), |(sum, count), r| (sum + r.quantity, count + 1));

    // count >= 1: the current row matches the broader predicate too.
    let mean = sum as f64 / f64::from(count);

    Ok(HistoricalAverage {
        region_id,
        region_name: current.region_name.clone(),
        category_code,
        category_name: current.category_name.clone(),
        month,
        year,
        current_quantity: current.quantity,
        historical_mean: mean.round_ties_even(),
    })
}

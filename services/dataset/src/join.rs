//! Left join of the fact table against both lookup tables.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::tables::{CategoryTable, FactTable, RegionTable, Snapshot};

/// A fact row with its descriptive names attached.
///
/// `id` is assigned at join time (1..N in fact-table order) and is only
/// stable for as long as the fact file is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DenormalizedRecord {
    pub id: u64,
    pub region_id: i64,
    pub region_name: Option<String>,
    pub category_code: i64,
    pub category_name: Option<String>,
    pub month: i64,
    pub year: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone)]
pub struct DenormalizedTable {
    pub rows: Vec<DenormalizedRecord>,
    pub loaded_at: DateTime<Utc>,
}

impl DenormalizedTable {
    pub fn new(rows: Vec<DenormalizedRecord>) -> Self {
        Self {
            rows,
            loaded_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Snapshot for DenormalizedTable {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

/// Joins facts with category and region names, keeping every fact row.
pub fn denormalize(
    facts: &FactTable,
    categories: &CategoryTable,
    regions: &RegionTable,
) -> DenormalizedTable {
    if facts.is_empty() || categories.is_empty() || regions.is_empty() {
        warn!(
            facts = facts.rows.len(),
            categories = categories.rows.len(),
            regions = regions.rows.len(),
            "a source table is empty, join yields no rows"
        );
        return DenormalizedTable::empty();
    }

    // First occurrence of a code wins on duplicates.
    let mut category_names: HashMap<i64, Option<&str>> = HashMap::new();
    for c in &categories.rows {
        category_names
            .entry(c.category_code)
            .or_insert(c.category_name.as_deref());
    }
    let mut region_names: HashMap<i64, Option<&str>> = HashMap::new();
    for r in &regions.rows {
        region_names
            .entry(r.region_id)
            .or_insert(r.region_name.as_deref());
    }

    let rows: Vec<DenormalizedRecord> = facts
        .rows
        .iter()
        .zip(1u64..)
        .map(|(fact, id)| DenormalizedRecord {
            id,
            region_id: fact.region_id,
            region_name: region_names
                .get(&fact.region_id)
                .copied()
                .flatten()
                .map(str::to_string),
            category_code: fact.category_code,
            category_name: category_names
                .get(&fact.category_code)
                .copied()
                .flatten()
                .map(str::to_string),
            month: fact.month,
            year: fact.year,
            quantity: fact.quantity,
        })
        .collect();

    let unmatched = rows
        .iter()
        .filter(|r| r.region_name.is_none() || r.category_name.is_none())
        .count();
    if unmatched > 0 {
        warn!(unmatched, "fact rows reference unknown region or category codes");
    }
    debug!(rows = rows.len(), "denormalized table built");

    DenormalizedTable::new(rows)
}

//! Dataset - occurrence statistics of the SSP/DF over flat CSV files
//!
//! Responsibilities:
//! - Load the fact table and the two lookup tables (natureza, RA)
//! - Keep one immutable snapshot per table until a write invalidates it
//! - Left-join facts with descriptive names
//! - Answer exact-match queries and the historical monthly average
//! - Append new records to the fact file
//!
//! Load failures surface as [`LoadError`], never as an empty table, so a
//! caller can tell "no data available" apart from "nothing matched".

pub mod cache;
pub mod error;
pub mod join;
pub mod loader;
pub mod query;
pub mod tables;
pub mod writer;

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

pub use cache::{TableCache, TableId, TableStatus};
pub use error::{LoadError, QueryError, WriteError};
pub use join::{denormalize, DenormalizedRecord, DenormalizedTable};
pub use loader::{parse_int, CsvFormat};
pub use query::{filter_by, historical_average, HistoricalAverage, RecordFilter};
pub use tables::{CategoryLookup, CategoryTable, FactTable, OccurrenceRecord, RegionLookup, RegionTable};

/// A CSV file and how to read it.
#[derive(Debug, Clone)]
pub struct DataSource {
    pub path: PathBuf,
    pub format: CsvFormat,
}

impl DataSource {
    pub fn new(path: impl Into<PathBuf>, format: CsvFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DataSources {
    pub facts: DataSource,
    pub categories: DataSource,
    pub regions: DataSource,
}

/// Composition root: the three sources, their cache and the write lock.
#[derive(Debug)]
pub struct Dataset {
    sources: DataSources,
    cache: TableCache,
    write_lock: Mutex<()>,
}

impl Dataset {
    pub fn new(sources: DataSources) -> Self {
        Self {
            sources,
            cache: TableCache::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn sources(&self) -> &DataSources {
        &self.sources
    }

    pub fn facts(&self) -> Result<Arc<FactTable>, LoadError> {
        let source = &self.sources.facts;
        self.cache.facts.get_or_load(|| {
            let raw = loader::load_table(&source.path, &source.format)?;
            FactTable::from_raw(&raw)
        })
    }

    pub fn categories(&self) -> Result<Arc<CategoryTable>, LoadError> {
        let source = &self.sources.categories;
        self.cache.categories.get_or_load(|| {
            let raw = loader::load_table(&source.path, &source.format)?;
            CategoryTable::from_raw(&raw)
        })
    }

    pub fn regions(&self) -> Result<Arc<RegionTable>, LoadError> {
        let source = &self.sources.regions;
        self.cache.regions.get_or_load(|| {
            let raw = loader::load_table(&source.path, &source.format)?;
            RegionTable::from_raw(&raw)
        })
    }

    pub fn denormalized(&self) -> Result<Arc<DenormalizedTable>, LoadError> {
        if let Some(table) = self.cache.denormalized.get() {
            debug!("denormalized table served from cache");
            return Ok(table);
        }
        self.cache.denormalized.get_or_load(|| {
            let facts = self.facts()?;
            let categories = self.categories()?;
            let regions = self.regions()?;
            Ok(denormalize(&facts, &categories, &regions))
        })
    }

    /// Denormalized rows matching `filter`, in file order.
    pub fn records(&self, filter: &RecordFilter) -> Result<Vec<DenormalizedRecord>, LoadError> {
        let table = self.denormalized()?;
        Ok(filter_by(&table, filter))
    }

    pub fn historical_average(
        &self,
        region_id: i64,
        year: i64,
        month: i64,
        category_code: i64,
    ) -> Result<HistoricalAverage, QueryError> {
        let table = self.denormalized()?;
        historical_average(&table, region_id, year, month, category_code)
    }

    /// Category row for `code`, `None` when the code is unknown. A known
    /// code with an empty name cell comes back with `category_name: None`.
    pub fn category(&self, code: i64) -> Result<Option<CategoryLookup>, LoadError> {
        let table = self.categories()?;
        Ok(table.find(code).cloned())
    }

    /// Appends `record` to the fact file, then drops the stale snapshots.
    pub fn append(&self, record: &OccurrenceRecord) -> Result<(), WriteError> {
        let _guard = self.write_lock.lock();
        let source = &self.sources.facts;
        writer::append_record(&source.path, &source.format, record)?;
        self.cache.invalidate(TableId::Facts);
        self.cache.invalidate(TableId::Denormalized);
        Ok(())
    }

    pub fn status(&self) -> Vec<TableStatus> {
        self.cache.status()
    }
}

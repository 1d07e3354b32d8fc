//! Typed tables built from [`RawTable`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::loader::RawTable;

// Normalized header names accepted for each field. The first entry is the
// canonical name reported in errors.
pub(crate) const REGION_ID_COLUMNS: &[&str] = &["id_ra", "cod_ra", "ra_id"];
pub(crate) const CATEGORY_CODE_COLUMNS: &[&str] = &["cod_natureza", "codigo_natureza", "codigo"];
pub(crate) const QUANTITY_COLUMNS: &[&str] = &["quantidade", "qtd", "qtde"];
pub(crate) const MONTH_COLUMNS: &[&str] = &["mes", "mês"];
pub(crate) const YEAR_COLUMNS: &[&str] = &["ano"];
const CATEGORY_NAME_COLUMNS: &[&str] = &["natureza", "nome_natureza", "descricao"];
const REGION_NAME_COLUMNS: &[&str] = &[
    "ra",
    "regiao_administrativa",
    "região_administrativa",
    "nome_ra",
];

/// One row of the fact table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceRecord {
    pub region_id: i64,
    pub category_code: i64,
    pub quantity: i64,
    pub month: i64,
    pub year: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLookup {
    pub category_code: i64,
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionLookup {
    pub region_id: i64,
    pub region_name: Option<String>,
}

/// Something the cache can report on.
pub trait Snapshot {
    fn row_count(&self) -> usize;
    fn loaded_at(&self) -> DateTime<Utc>;
}

macro_rules! impl_snapshot {
    ($($table:ty),*) => {
        $(impl Snapshot for $table {
            fn row_count(&self) -> usize {
                self.rows.len()
            }
            fn loaded_at(&self) -> DateTime<Utc> {
                self.loaded_at
            }
        })*
    };
}

#[derive(Debug, Clone)]
pub struct FactTable {
    pub rows: Vec<OccurrenceRecord>,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CategoryTable {
    pub rows: Vec<CategoryLookup>,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RegionTable {
    pub rows: Vec<RegionLookup>,
    pub loaded_at: DateTime<Utc>,
}

impl_snapshot!(FactTable, CategoryTable, RegionTable);

impl FactTable {
    pub fn new(rows: Vec<OccurrenceRecord>) -> Self {
        Self {
            rows,
            loaded_at: Utc::now(),
        }
    }

    pub fn from_raw(raw: &RawTable) -> Result<Self, LoadError> {
        let region = raw.column_index(REGION_ID_COLUMNS)?;
        let category = raw.column_index(CATEGORY_CODE_COLUMNS)?;
        let quantity = raw.column_index(QUANTITY_COLUMNS)?;
        let month = raw.column_index(MONTH_COLUMNS)?;
        let year = raw.column_index(YEAR_COLUMNS)?;

        let rows = (0..raw.len())
            .map(|i| {
                Ok(OccurrenceRecord {
                    region_id: raw.int_at(i, region)?,
                    category_code: raw.int_at(i, category)?,
                    quantity: raw.int_at(i, quantity)?,
                    month: raw.int_at(i, month)?,
                    year: raw.int_at(i, year)?,
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        Ok(Self::new(rows))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl CategoryTable {
    pub fn new(rows: Vec<CategoryLookup>) -> Self {
        Self {
            rows,
            loaded_at: Utc::now(),
        }
    }

    pub fn from_raw(raw: &RawTable) -> Result<Self, LoadError> {
        let code = raw.column_index(CATEGORY_CODE_COLUMNS)?;
        let name = raw.column_index(CATEGORY_NAME_COLUMNS)?;

        let rows = (0..raw.len())
            .map(|i| {
                Ok(CategoryLookup {
                    category_code: raw.int_at(i, code)?,
                    category_name: raw.text_at(i, name),
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        Ok(Self::new(rows))
    }

    /// First row recorded for `code`. An empty name cell reads as
    /// `category_name: None`.
    pub fn find(&self, code: i64) -> Option<&CategoryLookup> {
        self.rows.iter().find(|r| r.category_code == code)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RegionTable {
    pub fn new(rows: Vec<RegionLookup>) -> Self {
        Self {
            rows,
            loaded_at: Utc::now(),
        }
    }

    pub fn from_raw(raw: &RawTable) -> Result<Self, LoadError> {
        let id = raw.column_index(REGION_ID_COLUMNS)?;
        let name = raw.column_index(REGION_NAME_COLUMNS)?;

        let rows = (0..raw.len())
            .map(|i| {
                Ok(RegionLookup {
                    region_id: raw.int_at(i, id)?,
                    region_name: raw.text_at(i, name),
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        Ok(Self::new(rows))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn raw(columns: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            path: PathBuf::from("test.csv"),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_fact_table_any_column_order() {
        let raw = raw(
            &["ano", "mês", "quantidade", "cod_natureza", "id_ra"],
            &[&["2023", "1", "10", "7", "1"]],
        );
        let facts = FactTable::from_raw(&raw).unwrap();
        assert_eq!(
            facts.rows,
            vec![OccurrenceRecord {
                region_id: 1,
                category_code: 7,
                quantity: 10,
                month: 1,
                year: 2023,
            }]
        );
    }

    #[test]
    fn test_fact_table_missing_column() {
        let raw = raw(&["id_ra", "cod_natureza", "quantidade", "mes"], &[]);
        match FactTable::from_raw(&raw).unwrap_err() {
            LoadError::MissingColumn { column, .. } => assert_eq!(column, "ano"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fact_table_bad_cast_is_fatal() {
        let raw = raw(
            &["id_ra", "cod_natureza", "quantidade", "mes", "ano"],
            &[&["1", "7", "10", "1", "2023"], &["1", "7", "dez", "1", "2023"]],
        );
        assert!(matches!(
            FactTable::from_raw(&raw),
            Err(LoadError::InvalidValue { line: 3, .. })
        ));
    }

    #[test]
    fn test_category_lookup_first_wins() {
        let raw = raw(
            &["cod_natureza", "natureza"],
            &[&["7", "HOMICÍDIO"], &["7", "DUPLICADO"], &["8", ""]],
        );
        let table = CategoryTable::from_raw(&raw).unwrap();
        let name = |code| table.find(code).map(|r| r.category_name.as_deref());
        assert_eq!(name(7), Some(Some("HOMICÍDIO")));
        assert_eq!(name(8), Some(None));
        assert_eq!(name(9), None);
    }

    #[test]
    fn test_region_table_columns() {
        let raw = raw(&["id_ra", "regiao_administrativa"], &[&["1", "ARNIQUEIRA"]]);
        let table = RegionTable::from_raw(&raw).unwrap();
        assert_eq!(table.rows[0].region_name.as_deref(), Some("ARNIQUEIRA"));
        assert_eq!(table.row_count(), 1);
    }
}

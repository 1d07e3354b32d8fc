//! Error types for loading, querying and appending occurrence data.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading a CSV source into a typed table.
///
/// Every variant means "the service has no usable data for this table",
/// which is distinct from a query that matched zero rows.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("CSV file not found: {path}")]
    MissingFile { path: PathBuf },

    #[error("failed to read file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file {path} is not valid {encoding}")]
    Decode {
        path: PathBuf,
        encoding: &'static str,
    },

    #[error("failed to parse CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("required column '{column}' not found in {path}")]
    MissingColumn { column: String, path: PathBuf },

    #[error("invalid {column} value '{value}' at line {line} of {path}")]
    InvalidValue {
        column: String,
        value: String,
        line: usize,
        path: PathBuf,
    },
}

/// Errors returned by the query operations.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("no occurrence recorded for region {region_id}, category {category_code} in {month:02}/{year}")]
    NotFound {
        region_id: i64,
        category_code: i64,
        month: i64,
        year: i64,
    },
}

/// Errors raised by the append writer. A failed append leaves the cache untouched.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("fact file not found: {path}")]
    MissingFile { path: PathBuf },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Csv(#[from] csv::Error),

    #[error("header of {path} does not line up with the record fields at column '{column}'")]
    SchemaMismatch { column: String, path: PathBuf },
}

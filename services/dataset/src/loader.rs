//! CSV loading: decoding, header normalization and integer casts.

use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use tracing::{error, info};

use crate::error::LoadError;

/// How a source file is laid out on disk.
#[derive(Debug, Clone, Copy)]
pub struct CsvFormat {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
}

impl CsvFormat {
    /// Semicolon-separated file in the given encoding.
    pub fn semicolon(encoding: &'static Encoding) -> Self {
        Self {
            delimiter: b';',
            encoding,
        }
    }

    /// Resolves an encoding label such as `utf-8`, `latin1` or `cp1252`.
    ///
    /// Latin-1 labels resolve to WINDOWS-1252, which is a superset of
    /// ISO-8859-1 for every printable character.
    pub fn with_encoding_label(label: &str) -> Option<Self> {
        Encoding::for_label(label.trim().as_bytes()).map(Self::semicolon)
    }
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self::semicolon(encoding_rs::UTF_8)
    }
}

/// A decoded CSV file with normalized column names and trimmed cells.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Index of the first column whose normalized name is one of `candidates`.
    pub fn column_index(&self, candidates: &[&str]) -> Result<usize, LoadError> {
        self.columns
            .iter()
            .position(|c| candidates.contains(&c.as_str()))
            .ok_or_else(|| LoadError::MissingColumn {
                column: candidates[0].to_string(),
                path: self.path.clone(),
            })
    }

    /// Casts one cell to an integer, reporting the 1-based file line on failure.
    pub fn int_at(&self, row: usize, col: usize) -> Result<i64, LoadError> {
        let value = self.rows[row].get(col).map(String::as_str).unwrap_or("");
        parse_int(value).ok_or_else(|| LoadError::InvalidValue {
            column: self.columns[col].clone(),
            value: value.to_string(),
            line: row + 2, // +1 for 0-index, +1 for header
            path: self.path.clone(),
        })
    }

    /// Text of one cell; an empty cell reads as `None`.
    pub fn text_at(&self, row: usize, col: usize) -> Option<String> {
        self.rows[row]
            .get(col)
            .filter(|s| !s.is_empty())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Normalizes a header: trimmed, lowercase, spaces replaced by underscores.
pub fn normalize_column(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Accepts plain integers and integral floats such as `12.0`.
pub fn parse_int(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(n);
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
        _ => None,
    }
}

/// Reads `path` into a [`RawTable`]. Failures are logged and returned, never swallowed.
pub fn load_table(path: &Path, format: &CsvFormat) -> Result<RawTable, LoadError> {
    info!(path = %path.display(), encoding = format.encoding.name(), "loading CSV");
    let result = read_table(path, format);
    match &result {
        Ok(table) => info!(
            path = %path.display(),
            rows = table.len(),
            columns = table.columns.len(),
            "CSV loaded"
        ),
        Err(e) => error!(path = %path.display(), error = %e, "failed to load CSV"),
    }
    result
}

fn read_table(path: &Path, format: &CsvFormat) -> Result<RawTable, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            LoadError::MissingFile {
                path: path.to_path_buf(),
            }
        } else {
            LoadError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let (content, had_errors) = format.encoding.decode_with_bom_removal(&bytes);
    if had_errors {
        return Err(LoadError::Decode {
            path: path.to_path_buf(),
            encoding: format.encoding.name(),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(format.delimiter)
        .flexible(false)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let columns: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(normalize_column)
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_err)?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawTable {
        path: path.to_path_buf(),
        columns,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_normalize_column() {
        assert_eq!(normalize_column("  ID RA "), "id_ra");
        assert_eq!(normalize_column("MÊS"), "mês");
        assert_eq!(normalize_column("Regiao Administrativa"), "regiao_administrativa");
    }

    #[test]
    fn test_parse_int_accepts_integral_floats() {
        assert_eq!(parse_int("12"), Some(12));
        assert_eq!(parse_int(" 7 "), Some(7));
        assert_eq!(parse_int("2023.0"), Some(2023));
        assert_eq!(parse_int("2.5"), None);
        assert_eq!(parse_int("abc"), None);
        assert_eq!(parse_int(""), None);
    }

    #[test]
    fn test_load_utf8_with_bom() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ra.csv");
        fs::write(&path, "\u{feff}ID RA;RA\n1 ; ARNIQUEIRA \n").unwrap();

        let table = load_table(&path, &CsvFormat::default()).unwrap();
        assert_eq!(table.columns, vec!["id_ra", "ra"]);
        assert_eq!(table.rows, vec![vec!["1".to_string(), "ARNIQUEIRA".to_string()]]);
    }

    #[test]
    fn test_load_latin1() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("natureza.csv");
        let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode("COD_NATUREZA;NATUREZA\n7;HOMICÍDIO\n");
        fs::write(&path, &bytes).unwrap();

        let format = CsvFormat::with_encoding_label("latin1").unwrap();
        let table = load_table(&path, &format).unwrap();
        assert_eq!(table.text_at(0, 1).as_deref(), Some("HOMICÍDIO"));
    }

    #[test]
    fn test_latin1_bytes_rejected_as_utf8() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("natureza.csv");
        let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode("COD;NATUREZA\n7;HOMICÍDIO\n");
        fs::write(&path, &bytes).unwrap();

        let err = load_table(&path, &CsvFormat::default()).unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = load_table(&dir.path().join("nope.csv"), &CsvFormat::default()).unwrap_err();
        assert!(matches!(err, LoadError::MissingFile { .. }));
    }

    #[test]
    fn test_header_only_is_empty_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("facts.csv");
        fs::write(&path, "ID_RA;ANO\n").unwrap();

        let table = load_table(&path, &CsvFormat::default()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns.len(), 2);
    }

    #[test]
    fn test_ragged_row_is_csv_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("facts.csv");
        fs::write(&path, "A;B\n1;2\n3\n").unwrap();

        let err = load_table(&path, &CsvFormat::default()).unwrap_err();
        assert!(matches!(err, LoadError::Csv { .. }));
    }

    #[test]
    fn test_column_lookup_and_int_cast() {
        let table = RawTable {
            path: PathBuf::from("t.csv"),
            columns: vec!["mês".into(), "ano".into()],
            rows: vec![vec!["1".into(), "x".into()]],
        };
        let mes = table.column_index(&["mes", "mês"]).unwrap();
        assert_eq!(table.int_at(0, mes).unwrap(), 1);

        let ano = table.column_index(&["ano"]).unwrap();
        match table.int_at(0, ano).unwrap_err() {
            LoadError::InvalidValue { column, value, line, .. } => {
                assert_eq!(column, "ano");
                assert_eq!(value, "x");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(
            table.column_index(&["quantidade"]),
            Err(LoadError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_unknown_encoding_label() {
        assert!(CsvFormat::with_encoding_label("klingon").is_none());
        assert!(CsvFormat::with_encoding_label("UTF-8").is_some());
    }
}

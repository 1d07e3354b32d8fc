//! Append-only writes to the fact CSV.
//!
//! The header already on disk is the schema: values are written in the
//! header's column order and the header itself is never rewritten.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{error, info};

use crate::error::WriteError;
use crate::loader::{normalize_column, CsvFormat};
use crate::tables::{
    OccurrenceRecord, CATEGORY_CODE_COLUMNS, MONTH_COLUMNS, QUANTITY_COLUMNS, REGION_ID_COLUMNS,
    YEAR_COLUMNS,
};

/// Appends one record as a new line of `path`.
///
/// The line is built in memory and committed in one go: if the write
/// fails part way, the file is truncated back to its previous length.
pub fn append_record(
    path: &Path,
    format: &CsvFormat,
    record: &OccurrenceRecord,
) -> Result<(), WriteError> {
    let io_err = |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .open(path)
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                WriteError::MissingFile {
                    path: path.to_path_buf(),
                }
            } else {
                io_err(source)
            }
        })?;

    let header = read_header(&file).map_err(io_err)?;
    let crlf = header.ends_with(b"\r\n");
    let (header_text, _) = format.encoding.decode_without_bom_handling(&header);
    let header_text = header_text.trim_start_matches('\u{feff}');

    let values = values_in_header_order(header_text, format, record, path)?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(format.delimiter)
        .has_headers(false)
        .terminator(if crlf {
            csv::Terminator::CRLF
        } else {
            csv::Terminator::Any(b'\n')
        })
        .from_writer(Vec::new());
    writer.write_record(&values)?;
    let line = writer
        .into_inner()
        .map_err(|e| io_err(e.into_error()))?;

    let mut buf = Vec::with_capacity(line.len() + 2);
    if !ends_with_newline(&mut file).map_err(io_err)? {
        buf.extend_from_slice(if crlf { b"\r\n" } else { b"\n" });
    }
    let line = String::from_utf8_lossy(&line);
    let (encoded, _, _) = format.encoding.encode(&line);
    buf.extend_from_slice(&encoded);

    commit(&mut file, &buf).map_err(io_err)?;

    info!(
        path = %path.display(),
        region_id = record.region_id,
        category_code = record.category_code,
        month = record.month,
        year = record.year,
        "record appended"
    );
    Ok(())
}

/// Storage an encoded line is appended to.
trait AppendTarget: Write {
    fn byte_len(&self) -> std::io::Result<u64>;
    fn truncate(&mut self, len: u64) -> std::io::Result<()>;
}

impl AppendTarget for File {
    fn byte_len(&self) -> std::io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)
    }
}

/// Writes `buf` in full or leaves the target at its original length.
fn commit<T: AppendTarget>(target: &mut T, buf: &[u8]) -> std::io::Result<()> {
    let original_len = target.byte_len()?;
    if let Err(e) = target.write_all(buf).and_then(|()| target.flush()) {
        if let Err(rollback) = target.truncate(original_len) {
            error!(error = %rollback, original_len, "failed to roll back partial append");
        }
        return Err(e);
    }
    Ok(())
}

fn read_header(file: &File) -> std::io::Result<Vec<u8>> {
    let mut header = Vec::new();
    BufReader::new(file).read_until(b'\n', &mut header)?;
    Ok(header)
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn values_in_header_order(
    header: &str,
    format: &CsvFormat,
    record: &OccurrenceRecord,
    path: &Path,
) -> Result<Vec<String>, WriteError> {
    let fields: [(&[&str], i64); 5] = [
        (REGION_ID_COLUMNS, record.region_id),
        (CATEGORY_CODE_COLUMNS, record.category_code),
        (QUANTITY_COLUMNS, record.quantity),
        (MONTH_COLUMNS, record.month),
        (YEAR_COLUMNS, record.year),
    ];

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(format.delimiter)
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(header.as_bytes());
    let columns: Vec<String> = match reader.records().next() {
        Some(result) => result?.iter().map(normalize_column).collect(),
        None => Vec::new(),
    };

    let mut values = Vec::with_capacity(columns.len());
    for column in &columns {
        let value = fields
            .iter()
            .find(|(aliases, _)| aliases.contains(&column.as_str()))
            .map(|(_, v)| v.to_string())
            .ok_or_else(|| WriteError::SchemaMismatch {
                column: column.clone(),
                path: path.to_path_buf(),
            })?;
        values.push(value);
    }

    for (aliases, _) in &fields {
        if !columns.iter().any(|c| aliases.contains(&c.as_str())) {
            return Err(WriteError::SchemaMismatch {
                column: aliases[0].to_string(),
                path: path.to_path_buf(),
            });
        }
    }

    Ok(values)
}

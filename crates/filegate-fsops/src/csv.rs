//! Structural CSV checks: column count per record and double-quoted fields.
//!
//! Records are read one line at a time so large uploads never sit in memory.
//! Fields are split on every comma; quoted commas are not special.

use std::num::NonZeroUsize;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{FsOpsError, FsOpsResult};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// File under validation and the schema it must satisfy.
#[derive(Debug, Clone, Copy)]
pub struct CsvTarget<'a> {
    /// Bare file name, used in messages.
    pub file_name: &'a str,
    /// File type code, used in messages.
    pub file_type: &'a str,
    /// Values every record must contain.
    pub expected_columns: NonZeroUsize,
}

/// Validate the structure of a CSV stream, returning human-readable errors.
///
/// Record numbers in messages start at zero.
///
/// # Errors
///
/// Returns [`FsOpsError::NotFound`] or [`FsOpsError::Io`] when the stream
/// fails mid-read.
pub async fn validate_csv<R>(reader: &mut R, target: &CsvTarget<'_>) -> FsOpsResult<Vec<String>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut errors = Vec::new();
    let mut utf8 = true;
    let mut buffer = Vec::new();
    let mut pending_empty: Option<usize> = None;
    let mut record = 0usize;

    loop {
        buffer.clear();
        let read = reader
            .read_until(b'\n', &mut buffer)
            .await
            .map_err(|source| {
                FsOpsError::io("csv.read", target.file_name, target.file_name, source)
            })?;
        if read == 0 {
            break;
        }
        let mut line = trim_line_ending(&buffer);
        if record == 0 {
            line = line.strip_prefix(UTF8_BOM).unwrap_or(line);
        }

        // An empty line is only an error if something follows it.
        if let Some(empty_record) = pending_empty.take() {
            check_record(&[], empty_record, target, &mut errors);
        }
        if line.is_empty() {
            pending_empty = Some(record);
            record += 1;
            continue;
        }

        if std::str::from_utf8(line).is_err() {
            utf8 = false;
        }
        check_record(line, record, target, &mut errors);
        record += 1;
    }

    if !utf8 {
        errors.push(format!("{} is not UTF-8 encoded", target.file_name));
    }
    Ok(errors)
}

fn trim_line_ending(buffer: &[u8]) -> &[u8] {
    let line = buffer.strip_suffix(b"\n").unwrap_or(buffer);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn check_record(line: &[u8], record: usize, target: &CsvTarget<'_>, errors: &mut Vec<String>) {
    let text = String::from_utf8_lossy(line);
    let fields: Vec<&str> = text.split(',').collect();
    let prefix = format!(
        "{} file '{}' Record {record}",
        target.file_type, target.file_name
    );
    if fields.len() != target.expected_columns.get() {
        errors.push(format!(
            "{prefix} is malformed. Should have {} values; has {}",
            target.expected_columns,
            fields.len()
        ));
        return;
    }
    for (index, field) in fields.iter().enumerate() {
        if !is_quoted(field) {
            errors.push(format!(
                "{prefix} Field {index}: value ({field}) is not enclosed in double quotes (\")"
            ));
        }
    }
}

fn is_quoted(field: &str) -> bool {
    field.len() >= 2 && field.starts_with('"') && field.ends_with('"')
}

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

use super::error::MetricsError;

/// First CSV record of `path`, or `None` when the file is missing or holds
/// nothing but line terminators.
pub(super) fn first_record(path: &Path) -> Result<Option<Vec<String>>, MetricsError> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(MetricsError::io(path)(e)),
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);
    match reader.records().next() {
        None => Ok(None),
        Some(Ok(record)) => Ok(Some(record.iter().map(str::to_string).collect())),
        Some(Err(e)) => Err(MetricsError::csv(path)(e)),
    }
}

/// Append records to a CSV log. A file without any record yet (missing,
/// empty, or blank lines only) is truncated and started with `header`.
/// Returns the number of records written.
pub(super) fn append_records<I, R>(
    path: &Path,
    header: &[&str],
    records: I,
) -> Result<usize, MetricsError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    let is_new = first_record(path)?.is_none();
    let mut options = OpenOptions::new();
    options.create(true);
    if is_new {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    let file = options.open(path).map_err(MetricsError::io(path))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if is_new {
        writer
            .write_record(header)
            .map_err(MetricsError::csv(path))?;
    }

    let mut written = 0;
    for record in records {
        writer
            .write_record(record)
            .map_err(MetricsError::csv(path))?;
        written += 1;
    }
    writer.flush().map_err(MetricsError::io(path))?;
    Ok(written)
}

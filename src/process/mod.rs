// src/process/mod.rs
use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecordsIntoIter};
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod timestamps;

/// One bounded slice of the source file's rows, processed as a unit.
///
/// Cells are `None` where the source field was empty; they load as SQL NULL.
/// Row order matches the source file.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Column names from the file's header row, in source order.
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Batch {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Lazy, forward-only reader that slices a CSV file into row-count-bounded
/// batches. The header row is consumed at open; `next_batch` returns
/// `Ok(None)` once the file is exhausted (and keeps returning it).
///
/// The reader is strict about shape: a row whose field count differs from
/// the header is an error, since every batch of a dataset must share one
/// schema.
pub struct ChunkReader {
    path: PathBuf,
    headers: Vec<String>,
    records: StringRecordsIntoIter<File>,
    chunk_rows: usize,
    rows_read: u64,
    exhausted: bool,
}

impl ChunkReader {
    pub fn open(path: impl AsRef<Path>, chunk_rows: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .with_context(|| format!("opening CSV file {}", path.display()))?;
        let headers = reader
            .headers()
            .with_context(|| format!("reading CSV header of {}", path.display()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        Ok(ChunkReader {
            path,
            headers,
            records: reader.into_records(),
            chunk_rows: chunk_rows.max(1),
            rows_read: 0,
            exhausted: false,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Read the next batch of up to `chunk_rows` rows, or `None` at end of
    /// input.
    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut rows = Vec::new();
        while rows.len() < self.chunk_rows {
            match self.records.next() {
                Some(record) => {
                    let record = record.with_context(|| {
                        format!(
                            "CSV parse error in {} at record {}",
                            self.path.display(),
                            self.rows_read + 1
                        )
                    })?;
                    self.rows_read += 1;
                    rows.push(
                        record
                            .iter()
                            .map(|field| {
                                if field.is_empty() {
                                    None
                                } else {
                                    Some(field.to_string())
                                }
                            })
                            .collect(),
                    );
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }

        if rows.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        Ok(Some(Batch {
            headers: self.headers.clone(),
            rows,
        }))
    }
}

//! A flat CSV file held in memory.
//!
//! Rows are loaded once. New rows are appended to the end of the file;
//! anything that removes or edits rows rewrites the whole file through a
//! temp file in the same directory and a rename, so readers never see a
//! half-written table. The in-memory copy only changes after the write
//! went through.

use crate::error::StoreResult;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug)]
pub struct CsvTable<T> {
    path: PathBuf,
    rows: Vec<T>,
    /// Header of a file this process has not written yet. Older files may
    /// carry fewer columns than `T`; the first write then rewrites the file.
    disk_header: Option<StringRecord>,
}

impl<T> CsvTable<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn load(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        fs::create_dir_all(parent_dir(&path))?;

        let mut rows = Vec::new();
        let mut disk_header = None;
        if path.exists() {
            let mut reader = ReaderBuilder::new().has_headers(true).from_path(&path)?;
            let headers = reader.headers()?.clone();
            if !headers.is_empty() {
                disk_header = Some(headers);
            }
            for row in reader.deserialize() {
                rows.push(row?);
            }
        }

        tracing::debug!("Loaded {} rows from {}", rows.len(), path.display());
        Ok(Self {
            path,
            rows,
            disk_header,
        })
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn append(&mut self, row: T) -> StoreResult<()> {
        let stale_header = match &self.disk_header {
            Some(disk) => *disk != header_of(&row)?,
            None => false,
        };

        if stale_header {
            tracing::info!("Upgrading columns of {}", self.path.display());
            self.rows.push(row);
            if let Err(e) = self.write_all(&self.rows) {
                self.rows.pop();
                return Err(e);
            }
        } else {
            let needs_header = fs::metadata(&self.path)
                .map(|meta| meta.len() == 0)
                .unwrap_or(true);

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            let mut writer = WriterBuilder::new()
                .has_headers(needs_header)
                .from_writer(file);
            writer.serialize(&row)?;
            writer.flush()?;

            self.rows.push(row);
        }

        self.disk_header = None;
        Ok(())
    }

    pub fn replace(&mut self, rows: Vec<T>) -> StoreResult<()> {
        self.write_all(&rows)?;
        self.rows = rows;
        self.disk_header = None;
        Ok(())
    }

    fn write_all(&self, rows: &[T]) -> StoreResult<()> {
        let mut tmp = NamedTempFile::new_in(parent_dir(&self.path))?;
        {
            let mut writer = WriterBuilder::new()
                .has_headers(true)
                .from_writer(tmp.as_file_mut());
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        tmp.as_file_mut().flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// The header row `T` serializes with.
fn header_of<T: Serialize>(row: &T) -> StoreResult<StringRecord> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(Vec::new());
    writer.serialize(row)?;
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes.as_slice());
    Ok(reader.headers()?.clone())
}

impl<T> CsvTable<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Rewrites the table without the rows matching `remove`, returning how
    /// many were dropped. Nothing is written when nothing matches.
    pub fn remove_where(&mut self, remove: impl Fn(&T) -> bool) -> StoreResult<usize> {
        let kept: Vec<T> = self.rows.iter().filter(|r| !remove(r)).cloned().collect();
        let removed = self.rows.len() - kept.len();
        if removed > 0 {
            self.replace(kept)?;
        }
        Ok(removed)
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

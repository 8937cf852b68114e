use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Buffered append-only handle on the active log file
#[derive(Debug)]
pub struct LogDestination {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl LogDestination {
    /// Open `path` for appending, creating it if needed
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Path of the open file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append bytes to the buffer
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    /// Drain the buffer and sync file data to disk
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Flush, then switch to `path`
    ///
    /// On failure the current file stays open.
    pub fn reopen(&mut self, path: &Path) -> Result<()> {
        self.flush()?;
        *self = Self::open(path)?;
        Ok(())
    }

    /// Size of the file on disk, including bytes written by other processes
    pub fn committed_len(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }
}

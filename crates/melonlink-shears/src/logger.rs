//! Append-only CSV log store.
//!
//! One file at a fixed path under the storage prefix. Every committed
//! save appends one row; the transfer server reads the same file
//! sequentially during an offload. Each append opens, writes, and closes
//! so a crash never leaves the file open, and a transfer that is already
//! in progress sees a size snapshot taken at session start.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::nmea::GgaFix;
use crate::ShearsError;

/// Header row written as the first line of a fresh log.
pub const CSV_HEADER: &str =
    "utc_time,latitude,longitude,fix_quality,num_satellites,hdop,altitude,geoid_height";

/// The CSV log store on the shears filesystem.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    /// Opens the store, creating the log file with its header when absent.
    ///
    /// The storage directory itself must already be mounted; a missing
    /// directory is surfaced rather than created, since the mount is an
    /// external collaborator. A file whose header row is unreadable or
    /// wrong is recreated empty (erase-and-retry).
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ShearsError> {
        let path = path.into();
        let dir = path.parent().unwrap_or(Path::new("."));
        if !dir.is_dir() {
            return Err(ShearsError::StorageMissing(dir.to_path_buf()));
        }

        let store = Self { path };
        match store.header_ok() {
            Ok(true) => {}
            Ok(false) => {
                warn!(path = %store.path.display(), "log header invalid, recreating");
                store.reset()?;
            }
            Err(_) => {
                store.reset()?;
                info!(path = %store.path.display(), "created log with header");
            }
        }
        Ok(store)
    }

    /// Full path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one committed fix as a CSV row (open, append, close).
    pub fn append_fix(&self, fix: &GgaFix) -> Result<(), ShearsError> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(
            file,
            "{},{:.7},{:.7},{},{},{:.1},{:.3},{:.3}",
            fix.utc_time,
            fix.latitude,
            fix.longitude,
            fix.fix_quality,
            fix.num_satellites,
            fix.hdop,
            fix.altitude,
            fix.geoid_height,
        )?;
        info!(
            utc = %fix.utc_time,
            lat = fix.latitude,
            lon = fix.longitude,
            "GPS point saved"
        );
        Ok(())
    }

    /// Truncates the log back to a lone header row.
    ///
    /// This is the explicit clear that follows a host-acknowledged
    /// offload; when to call it is application policy.
    pub fn reset(&self) -> Result<(), ShearsError> {
        let mut file = File::create(&self.path)?;
        writeln!(file, "{CSV_HEADER}")?;
        Ok(())
    }

    /// Returns the newest `n` data rows, oldest first (debug preview).
    pub fn tail(&self, n: usize) -> Result<Vec<String>, ShearsError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let rows: Vec<String> = reader
            .lines()
            .skip(1) // header
            .collect::<Result<_, _>>()?;
        let start = rows.len().saturating_sub(n);
        Ok(rows[start..].to_vec())
    }

    /// Number of data rows currently in the log.
    pub fn row_count(&self) -> Result<usize, ShearsError> {
        let reader = BufReader::new(File::open(&self.path)?);
        Ok(reader.lines().count().saturating_sub(1))
    }

    fn header_ok(&self) -> Result<bool, std::io::Error> {
        let mut first = String::new();
        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.read_line(&mut first)?;
        Ok(first.trim_end() == CSV_HEADER)
    }
}

//! Save-request coordination.
//!
//! A save can originate in interrupt context (the physical button) or
//! from software; neither may touch the filesystem. Both set the same
//! atomic flag, and a dedicated worker polls it at ~100 Hz, consuming it
//! with a single swap so each set → clear cycle commits at most one row.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::assembler::LatestLine;
use crate::logger::CsvStore;
use crate::nmea;

/// Worker poll period (~100 Hz).
const POLL_PERIOD: Duration = Duration::from_millis(10);

/// The ISR-safe save-request flag.
///
/// Setting an already-set flag is idempotent; the worker's consume is an
/// atomic swap, so a request can never be both observed and kept.
#[derive(Debug, Clone, Default)]
pub struct SaveRequest {
    flag: Arc<AtomicBool>,
}

impl SaveRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a save; callable from any context, including signal-like
    /// edges.
    pub fn request(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Consumes a pending request, clearing the flag.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }

    /// Whether a request is pending (observation only).
    pub fn is_pending(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Polls the save flag and commits the latest sentence on each request.
pub async fn run_save_worker(
    request: SaveRequest,
    latest: LatestLine,
    store: CsvStore,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(POLL_PERIOD) => {}
        }

        if !request.take() {
            continue;
        }
        save_latest(&latest, &store);
    }
}

/// One save attempt: consume the latest sentence, parse, append.
///
/// The slot is consumed whether or not the sentence parses; a malformed
/// sentence is logged and dropped without a row.
pub fn save_latest(latest: &LatestLine, store: &CsvStore) {
    let Some(line) = latest.take() else {
        warn!("save requested but no valid NMEA data available");
        return;
    };

    info!(line = line.trim_end(), "save requested");
    match nmea::parse_gga(&line) {
        Ok(fix) => {
            if let Err(e) = store.append_fix(&fix) {
                warn!(error = %e, "failed to append CSV row");
            }
        }
        Err(e) => warn!(error = %e, "dropping unusable sentence"),
    }
}

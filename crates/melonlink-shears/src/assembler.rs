//! NMEA line assembly from the GPS byte stream.
//!
//! The GPS UART delivers bytes in arbitrary slices; the assembler
//! accumulates them into a bounded buffer and publishes each
//! newline-terminated sentence into the single latest-line slot. Only a
//! fully terminated line is ever published, so a reader of the slot never
//! observes a partial sentence.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bound on an in-progress line; a line that overflows it without a
/// terminator is discarded.
pub const LINE_BUF_SIZE: usize = 512;

/// How long one stream read may block before the loop re-checks for
/// cancellation.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// The single latest-sentence slot shared between the assembler and the
/// save worker.
///
/// `Some` doubles as the validity bit: content is published atomically
/// with it, and [`take`](Self::take) clears the slot on consumption.
#[derive(Debug, Clone, Default)]
pub struct LatestLine {
    slot: Arc<Mutex<Option<String>>>,
}

impl LatestLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a fully terminated sentence, replacing any previous one.
    pub fn publish(&self, line: String) {
        *self.slot.lock().unwrap() = Some(line);
    }

    /// Consumes the current sentence, clearing the slot.
    pub fn take(&self) -> Option<String> {
        self.slot.lock().unwrap().take()
    }

    /// Whether a sentence is currently available.
    pub fn is_valid(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }
}

/// Accumulates stream bytes into lines.
#[derive(Debug)]
pub struct LineAssembler {
    buf: Vec<u8>,
    latest: LatestLine,
    /// Lines discarded because the buffer filled without a terminator.
    overflows: u64,
}

impl LineAssembler {
    pub fn new(latest: LatestLine) -> Self {
        Self {
            buf: Vec::with_capacity(LINE_BUF_SIZE),
            latest,
            overflows: 0,
        }
    }

    /// Feeds raw stream bytes, publishing every completed line.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.buf.len() >= LINE_BUF_SIZE {
                warn!(len = self.buf.len(), "line overflow, discarding");
                self.buf.clear();
                self.overflows += 1;
            }
            self.buf.push(b);
            if b == b'\n' {
                let line = String::from_utf8_lossy(&self.buf).into_owned();
                self.latest.publish(line);
                self.buf.clear();
            }
        }
    }

    /// Lines discarded to buffer overflow so far.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }
}

/// Drains the GPS byte stream until cancelled or the stream ends.
///
/// Reads block for at most 100 ms so cancellation is always observed
/// promptly even on a silent port.
pub async fn run_assembler<R>(mut stream: R, latest: LatestLine, cancel: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut assembler = LineAssembler::new(latest);
    let mut raw = [0u8; LINE_BUF_SIZE];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            read = timeout(READ_TIMEOUT, stream.read(&mut raw)) => {
                match read {
                    Err(_) => continue, // timeout, poll cancellation again
                    Ok(Ok(0)) => {
                        debug!("GPS stream ended");
                        break;
                    }
                    Ok(Ok(n)) => assembler.push_bytes(&raw[..n]),
                    Ok(Err(e)) => {
                        warn!(error = %e, "GPS stream read failed");
                        break;
                    }
                }
            }
        }
    }
}

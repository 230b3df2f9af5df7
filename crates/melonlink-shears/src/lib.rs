//! Shears-side stack.
//!
//! The shears is the peripheral of the pair: it ingests NMEA sentences
//! from the GPS, freezes fixes into a CSV log on save requests, and
//! serves that log to the base over the radio link.
//!
//! - [`assembler`]: reassembles NMEA lines from the GPS byte stream.
//! - [`nmea`]: GGA sentence parsing and decimal-degree conversion.
//! - [`logger`]: the append-only CSV log store.
//! - [`save`]: the interrupt-to-worker save-request handoff.
//! - [`server`]: the transfer server state machine (IDLE → ACTIVE →
//!   FINALIZING) that streams file chunks.
//! - [`supervisor`]: advertising lifecycle, event routing, indicator.

pub mod assembler;
pub mod config;
pub mod indicator;
pub mod logger;
pub mod nmea;
pub mod save;
pub mod server;
pub mod supervisor;

pub use assembler::LatestLine;
pub use config::ShearsConfig;
pub use logger::CsvStore;
pub use save::SaveRequest;
pub use server::TransferServer;
pub use supervisor::ShearsSupervisor;

/// Errors produced by the shears stack.
#[derive(Debug, thiserror::Error)]
pub enum ShearsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] melonlink_protocol::ProtocolError),

    #[error("radio error: {0}")]
    Radio(#[from] melonlink_radio::RadioError),

    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("storage directory missing: {}", .0.display())]
    StorageMissing(std::path::PathBuf),
}

//! Base-side stack.
//!
//! The base is the central of the pair: it finds the shears, pulls the
//! CSV log over the radio link, and forwards everything to the host
//! computer as framed serial messages.
//!
//! - [`client`]: the transfer client state machine (IDLE →
//!   AWAITING_ACCEPT → RECEIVING) that reassembles chunks.
//! - [`uplink`]: the single-writer framed serial uplink to the host.
//! - [`supervisor`]: scanning, connection, service discovery,
//!   notification routing, the pending-request slot, indicator.

pub mod client;
pub mod config;
pub mod indicator;
pub mod supervisor;
pub mod uplink;

pub use client::TransferClient;
pub use config::BaseConfig;
pub use supervisor::{BaseHandle, BaseSupervisor};
pub use uplink::SerialUplink;

/// Errors produced by the base stack.
#[derive(Debug, thiserror::Error)]
pub enum BaseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] melonlink_protocol::ProtocolError),

    #[error("radio error: {0}")]
    Radio(#[from] melonlink_radio::RadioError),

    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("serial uplink closed")]
    UplinkClosed,

    #[error("supervisor stopped")]
    SupervisorStopped,
}

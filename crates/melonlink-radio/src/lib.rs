//! Radio-stack seam for the melonlink devices.
//!
//! The real short-range radio (controller, host, GAP/GATT primitives) is
//! an external collaborator; this crate pins down the surface the two
//! device stacks program against:
//!
//! - [`gatt`]: the log-transfer service layout both sides must agree on.
//! - [`types`]: link events, advertisement and discovery data, connection
//!   parameters.
//! - [`medium`]: an in-process implementation of that surface, used by
//!   the test suite and the simulator. It models the parts of the link
//!   the protocol depends on: advertising visibility, name-filtered scan
//!   reports, connect/disconnect seen from both ends, a GATT table with
//!   configuration descriptors at value-handle + 1, subscription-gated
//!   in-order notification delivery, and the per-link maximum attribute
//!   size (MTU − 3).

pub mod gatt;
pub mod medium;
pub mod types;

pub use medium::{Central, Medium, MediumCtl, Peripheral};
pub use types::{
    Advertisement, Characteristic, CentralEvent, ConnParams, Handle, PeerAddr, PeripheralEvent,
    ServiceRange,
};

/// Errors surfaced by radio operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RadioError {
    #[error("no active connection")]
    NotConnected,

    #[error("a connection is already active")]
    AlreadyConnected,

    #[error("attribute too large: {len} bytes (link maximum {max})")]
    AttributeTooLarge { len: usize, max: usize },

    #[error("unknown attribute handle 0x{0:04X}")]
    UnknownHandle(u16),

    #[error("attribute 0x{0:04X} does not support this operation")]
    NotPermitted(u16),

    #[error("invalid descriptor value")]
    InvalidDescriptorValue,

    #[error("radio event stream closed")]
    Closed,
}

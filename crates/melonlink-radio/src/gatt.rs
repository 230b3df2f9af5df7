//! Log-transfer service layout.
//!
//! Both devices hard-code this table: a primary service with two
//! characteristics, control (write + notify) and data (notify only).
//! The standard client configuration descriptor sits immediately after
//! each value attribute, so subscribing means writing
//! [`CCCD_ENABLE_NOTIFY`] to value-handle + 1.

/// 16-bit identifier of the log-transfer primary service.
pub const LOG_SERVICE_UUID: u16 = 0xFFF0;

/// Control characteristic: commands in (write), status events out (notify).
pub const CTRL_CHR_UUID: u16 = 0xFFF1;

/// Data characteristic: file chunks out (notify only).
pub const DATA_CHR_UUID: u16 = 0xFFF2;

/// Complete local name the shears advertises and the base scans for.
pub const SHEARS_DEVICE_NAME: &str = "WM-SHEARS";

/// Value written to a configuration descriptor to enable notifications.
pub const CCCD_ENABLE_NOTIFY: [u8; 2] = [0x01, 0x00];

/// Value written to a configuration descriptor to disable notifications.
pub const CCCD_DISABLE: [u8; 2] = [0x00, 0x00];

/// The configuration descriptor lives this many handles past the value.
pub const CCCD_OFFSET: u16 = 1;

/// Characteristic property bits (subset used by this service).
pub mod props {
    pub const WRITE: u8 = 0x08;
    pub const NOTIFY: u8 = 0x10;
}

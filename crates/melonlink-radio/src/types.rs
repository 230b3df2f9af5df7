//! Link events and discovery data shared across the radio seam.

/// Attribute handle on the peer's GATT table.
pub type Handle = u16;

/// 48-bit device address, printed most-significant byte first.
pub type PeerAddr = [u8; 6];

/// Payload of a connectable undirected advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Complete local name.
    pub local_name: String,
    /// Advertised 16-bit service identifiers (complete list).
    pub services_16: Vec<u16>,
}

/// Connection parameters requested by the central.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnParams {
    pub scan_itvl: u16,
    pub scan_window: u16,
    pub itvl_min: u16,
    pub itvl_max: u16,
    pub latency: u16,
    /// Units of 10 ms; 0x0258 = 6 s.
    pub supervision_timeout: u16,
}

impl Default for ConnParams {
    fn default() -> Self {
        Self {
            scan_itvl: 0x0010,
            scan_window: 0x0010,
            itvl_min: 0x0010,
            itvl_max: 0x0020,
            latency: 0,
            supervision_timeout: 0x0258,
        }
    }
}

/// One primary service found by service discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceRange {
    pub uuid16: u16,
    pub start_handle: Handle,
    pub end_handle: Handle,
}

/// One characteristic found by characteristic discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Characteristic {
    pub uuid16: u16,
    pub val_handle: Handle,
    /// Property bits, see [`crate::gatt::props`].
    pub properties: u8,
}

/// Events delivered to the peripheral (shears) side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    /// A central connected; advertising has stopped.
    Connected { max_attribute_size: usize },
    /// The link dropped (peer disconnect or supervision timeout).
    Disconnected,
    /// A characteristic value was written by the central.
    Write { handle: Handle, data: Vec<u8> },
}

/// Events delivered to the central (base) side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralEvent {
    /// Advertising report seen while scanning.
    AdvReport {
        name: String,
        services_16: Vec<u16>,
        addr: PeerAddr,
    },
    /// Connection established.
    Connected { max_attribute_size: usize },
    /// Connection attempt failed.
    ConnectFailed,
    /// The link dropped.
    Disconnected,
    /// A finite scan window ended without a connection.
    ScanComplete,
    /// Notification from the peer, routed by attribute handle.
    Notification { handle: Handle, data: Vec<u8> },
}

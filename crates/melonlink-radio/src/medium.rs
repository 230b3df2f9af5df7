//! In-process radio medium.
//!
//! [`Medium::pair`] wires a [`Peripheral`] and a [`Central`] back to back
//! through shared state, standing in for the real controller. The medium
//! hosts the log-transfer GATT table at fixed handles and enforces the
//! link rules the protocol depends on: notifications are dropped while
//! unsubscribed, attribute payloads are bounded by MTU − 3, and event
//! order on each side matches emission order.
//!
//! The extra [`MediumCtl`] handle lets tests and the simulator inject
//! link faults (drop the link, end a scan window) the way the real
//! controller would report them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::gatt::{self, props};
use crate::types::{
    Advertisement, CentralEvent, Characteristic, ConnParams, Handle, PeerAddr, PeripheralEvent,
    ServiceRange,
};
use crate::RadioError;

/// Fixed handle layout of the log-transfer service on the medium.
///
/// Mirrors a typical attribute table: service declaration, then per
/// characteristic a declaration, the value, and the configuration
/// descriptor at value + 1.
pub mod handles {
    use crate::types::Handle;

    pub const SVC_START: Handle = 0x0010;
    pub const CTRL_VAL: Handle = 0x0012;
    pub const CTRL_CCCD: Handle = 0x0013;
    pub const DATA_VAL: Handle = 0x0015;
    pub const DATA_CCCD: Handle = 0x0016;
    pub const SVC_END: Handle = 0x0016;
}

/// Fixed address the medium reports for the peripheral.
const PERIPHERAL_ADDR: PeerAddr = [0xC4, 0x4F, 0x33, 0x10, 0x22, 0x51];

struct Shared {
    att_mtu: usize,
    advertising: Option<Advertisement>,
    scanning: bool,
    connected: bool,
    /// Subscription state keyed by configuration-descriptor handle.
    subscriptions: HashMap<Handle, bool>,
    periph_tx: mpsc::UnboundedSender<PeripheralEvent>,
    central_tx: mpsc::UnboundedSender<CentralEvent>,
}

impl Shared {
    fn max_attribute_size(&self) -> usize {
        self.att_mtu.saturating_sub(3)
    }

    fn drop_link(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        self.subscriptions.clear();
        let _ = self.periph_tx.send(PeripheralEvent::Disconnected);
        let _ = self.central_tx.send(CentralEvent::Disconnected);
    }
}

/// The shared in-process link; create sides with [`Medium::pair`].
pub struct Medium;

impl Medium {
    /// Builds a connected pair of radio ports with the given ATT MTU.
    ///
    /// The standard minimum MTU is 23, giving a 20-byte maximum
    /// attribute size.
    pub fn pair(att_mtu: usize) -> (Peripheral, Central, MediumCtl) {
        let (periph_tx, periph_rx) = mpsc::unbounded_channel();
        let (central_tx, central_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Mutex::new(Shared {
            att_mtu,
            advertising: None,
            scanning: false,
            connected: false,
            subscriptions: HashMap::from([
                (handles::CTRL_CCCD, false),
                (handles::DATA_CCCD, false),
            ]),
            periph_tx,
            central_tx,
        }));

        (
            Peripheral {
                shared: Arc::clone(&shared),
                events: periph_rx,
            },
            Central {
                shared: Arc::clone(&shared),
                events: central_rx,
            },
            MediumCtl { shared },
        )
    }
}

// ---------------------------------------------------------------------------
// Peripheral port
// ---------------------------------------------------------------------------

/// Peripheral-side port: advertise, receive writes, send notifications.
pub struct Peripheral {
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedReceiver<PeripheralEvent>,
}

impl Peripheral {
    /// Starts connectable undirected advertising.
    ///
    /// If the central is already scanning, the report is delivered
    /// immediately.
    pub fn start_advertising(&mut self, adv: Advertisement) -> Result<(), RadioError> {
        let mut s = self.shared.lock().unwrap();
        if s.connected {
            return Err(RadioError::AlreadyConnected);
        }
        debug!(name = %adv.local_name, "advertising started");
        if s.scanning {
            let _ = s.central_tx.send(CentralEvent::AdvReport {
                name: adv.local_name.clone(),
                services_16: adv.services_16.clone(),
                addr: PERIPHERAL_ADDR,
            });
        }
        s.advertising = Some(adv);
        Ok(())
    }

    /// Sends a notification on a value handle.
    ///
    /// Returns the number of bytes delivered; a notification on an
    /// unsubscribed characteristic is dropped (fire-and-forget, as on
    /// the wire) and reported as 0.
    pub fn notify(&self, handle: Handle, data: &[u8]) -> Result<usize, RadioError> {
        let s = self.shared.lock().unwrap();
        if !s.connected {
            return Err(RadioError::NotConnected);
        }
        let max = s.max_attribute_size();
        if data.len() > max {
            return Err(RadioError::AttributeTooLarge {
                len: data.len(),
                max,
            });
        }
        let cccd = match handle {
            handles::CTRL_VAL => handles::CTRL_CCCD,
            handles::DATA_VAL => handles::DATA_CCCD,
            other => return Err(RadioError::UnknownHandle(other)),
        };
        if !s.subscriptions.get(&cccd).copied().unwrap_or(false) {
            trace!(handle, "notification dropped: not subscribed");
            return Ok(0);
        }
        let _ = s.central_tx.send(CentralEvent::Notification {
            handle,
            data: data.to_vec(),
        });
        Ok(data.len())
    }

    /// Largest value one notification can carry on the current link.
    pub fn max_attribute_size(&self) -> usize {
        self.shared.lock().unwrap().max_attribute_size()
    }

    /// Next link event, or `None` once the medium is torn down.
    pub async fn recv_event(&mut self) -> Option<PeripheralEvent> {
        self.events.recv().await
    }
}

// ---------------------------------------------------------------------------
// Central port
// ---------------------------------------------------------------------------

/// Central-side port: scan, connect, discover, write, receive notifies.
pub struct Central {
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedReceiver<CentralEvent>,
}

impl Central {
    /// Starts an active scan; reports arrive as [`CentralEvent::AdvReport`].
    pub fn start_scan(&mut self) {
        let mut s = self.shared.lock().unwrap();
        s.scanning = true;
        debug!("scan started");
        if let Some(adv) = &s.advertising {
            let report = CentralEvent::AdvReport {
                name: adv.local_name.clone(),
                services_16: adv.services_16.clone(),
                addr: PERIPHERAL_ADDR,
            };
            let _ = s.central_tx.send(report);
        }
    }

    /// Cancels an in-progress scan.
    pub fn cancel_scan(&mut self) {
        self.shared.lock().unwrap().scanning = false;
    }

    /// Initiates a connection to a scanned peer.
    ///
    /// The outcome arrives as [`CentralEvent::Connected`] or
    /// [`CentralEvent::ConnectFailed`]; connection parameters are
    /// accepted as requested (the medium has no negotiation).
    pub fn connect(&mut self, addr: PeerAddr, _params: &ConnParams) -> Result<(), RadioError> {
        let mut s = self.shared.lock().unwrap();
        if s.connected {
            return Err(RadioError::AlreadyConnected);
        }
        s.scanning = false;
        if addr != PERIPHERAL_ADDR || s.advertising.is_none() {
            debug!("connect failed: peer not advertising");
            let _ = s.central_tx.send(CentralEvent::ConnectFailed);
            return Ok(());
        }
        s.advertising = None;
        s.connected = true;
        let max = s.max_attribute_size();
        debug!(max_attribute_size = max, "link established");
        let _ = s.periph_tx.send(PeripheralEvent::Connected {
            max_attribute_size: max,
        });
        let _ = s.central_tx.send(CentralEvent::Connected {
            max_attribute_size: max,
        });
        Ok(())
    }

    /// Tears down the active link.
    pub fn disconnect(&mut self) {
        self.shared.lock().unwrap().drop_link();
    }

    /// Full service discovery.
    pub fn discover_services(&self) -> Result<Vec<ServiceRange>, RadioError> {
        let s = self.shared.lock().unwrap();
        if !s.connected {
            return Err(RadioError::NotConnected);
        }
        Ok(vec![ServiceRange {
            uuid16: gatt::LOG_SERVICE_UUID,
            start_handle: handles::SVC_START,
            end_handle: handles::SVC_END,
        }])
    }

    /// Characteristic discovery within a service range.
    pub fn discover_characteristics(
        &self,
        range: &ServiceRange,
    ) -> Result<Vec<Characteristic>, RadioError> {
        let s = self.shared.lock().unwrap();
        if !s.connected {
            return Err(RadioError::NotConnected);
        }
        let all = [
            Characteristic {
                uuid16: gatt::CTRL_CHR_UUID,
                val_handle: handles::CTRL_VAL,
                properties: props::WRITE | props::NOTIFY,
            },
            Characteristic {
                uuid16: gatt::DATA_CHR_UUID,
                val_handle: handles::DATA_VAL,
                properties: props::NOTIFY,
            },
        ];
        Ok(all
            .into_iter()
            .filter(|c| (range.start_handle..=range.end_handle).contains(&c.val_handle))
            .collect())
    }

    /// Writes an attribute value: characteristic values route to the
    /// peripheral, configuration descriptors flip subscription state.
    pub fn write(&self, handle: Handle, data: &[u8]) -> Result<(), RadioError> {
        let mut s = self.shared.lock().unwrap();
        if !s.connected {
            return Err(RadioError::NotConnected);
        }
        let max = s.max_attribute_size();
        if data.len() > max {
            return Err(RadioError::AttributeTooLarge {
                len: data.len(),
                max,
            });
        }
        match handle {
            handles::CTRL_VAL => {
                let _ = s.periph_tx.send(PeripheralEvent::Write {
                    handle,
                    data: data.to_vec(),
                });
                Ok(())
            }
            handles::DATA_VAL => Err(RadioError::NotPermitted(handle)),
            handles::CTRL_CCCD | handles::DATA_CCCD => {
                if data.len() != 2 {
                    return Err(RadioError::InvalidDescriptorValue);
                }
                let enabled = data[0] & 0x01 != 0;
                s.subscriptions.insert(handle, enabled);
                trace!(handle, enabled, "subscription updated");
                Ok(())
            }
            other => Err(RadioError::UnknownHandle(other)),
        }
    }

    /// Largest value one attribute operation can carry.
    pub fn max_attribute_size(&self) -> usize {
        self.shared.lock().unwrap().max_attribute_size()
    }

    /// Next link event, or `None` once the medium is torn down.
    pub async fn recv_event(&mut self) -> Option<CentralEvent> {
        self.events.recv().await
    }
}

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

/// Test and simulator hook for controller-originated events.
#[derive(Clone)]
pub struct MediumCtl {
    shared: Arc<Mutex<Shared>>,
}

impl MediumCtl {
    /// Drops the link as a supervision timeout would: both sides see
    /// `Disconnected`, nothing crosses the air afterwards.
    pub fn drop_link(&self) {
        self.shared.lock().unwrap().drop_link();
    }

    /// Ends the current scan window without a connection.
    pub fn finish_scan(&self) {
        let mut s = self.shared.lock().unwrap();
        if s.scanning {
            s.scanning = false;
            let _ = s.central_tx.send(CentralEvent::ScanComplete);
        }
    }

    /// Whether a link is currently active.
    pub fn is_connected(&self) -> bool {
        self.shared.lock().unwrap().connected
    }
}

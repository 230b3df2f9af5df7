//! Base connection supervisor.
//!
//! Owns the central radio port and the transfer client. Scans for the
//! shears by its advertised name, connects with the fixed connection
//! parameters, walks service → characteristic discovery, enables
//! notifications on both channels by writing to the configuration
//! descriptor after each value handle, and from then on routes
//! notifications to the client by attribute-handle identity.
//!
//! A log request that arrives before discovery completes lands in the
//! single pending slot and is written the moment both channels are
//! ready; a newer request overwrites an older one.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use melonlink_protocol::uplink::HostStatus;
use melonlink_radio::gatt::{self, CCCD_ENABLE_NOTIFY, CCCD_OFFSET};
use melonlink_radio::medium::Central;
use melonlink_radio::types::{CentralEvent, ConnParams, Handle};

use crate::client::TransferClient;
use crate::indicator::Indicator;
use crate::uplink::SerialUplink;
use crate::BaseError;

/// Application callback for link-state changes.
pub type ConnCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Discovered channel handles, valid while the link is up.
#[derive(Debug, Clone, Copy)]
struct Channels {
    ctrl: Handle,
    data: Handle,
}

enum Command {
    RequestLog(String),
}

/// Application-facing handle onto a running supervisor.
#[derive(Clone)]
pub struct BaseHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl BaseHandle {
    /// Requests a log file from the shears.
    ///
    /// If discovery has not completed yet, the request is held in the
    /// pending slot and written once the channels are ready.
    pub async fn request_log(&self, basename: &str) -> Result<(), BaseError> {
        self.cmd_tx
            .send(Command::RequestLog(basename.to_string()))
            .await
            .map_err(|_| BaseError::SupervisorStopped)
    }
}

/// The base-side supervisor.
pub struct BaseSupervisor {
    radio: Central,
    client: TransferClient,
    uplink: SerialUplink,
    indicator: Option<Indicator>,
    on_connected: Option<ConnCallback>,
    cancel: CancellationToken,
    channels: Option<Channels>,
    pending: Option<String>,
    cmd_rx: mpsc::Receiver<Command>,
}

impl BaseSupervisor {
    pub fn new(
        radio: Central,
        client: TransferClient,
        uplink: SerialUplink,
        cancel: CancellationToken,
    ) -> (Self, BaseHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        (
            Self {
                radio,
                client,
                uplink,
                indicator: None,
                on_connected: None,
                cancel,
                channels: None,
                pending: None,
                cmd_rx,
            },
            BaseHandle { cmd_tx },
        )
    }

    /// Attaches the status indicator.
    pub fn with_indicator(mut self, indicator: Indicator) -> Self {
        self.indicator = Some(indicator);
        self
    }

    /// Registers the application's link-state callback.
    pub fn with_conn_callback(mut self, cb: ConnCallback) -> Self {
        self.on_connected = Some(cb);
        self
    }

    /// Runs until cancelled. Consumes the supervisor; spawn it.
    pub async fn run(mut self) {
        self.radio.start_scan();
        info!(target_name = gatt::SHEARS_DEVICE_NAME, "scanning");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = self.radio.recv_event() => {
                    let Some(event) = event else { break };
                    self.handle_event(event).await;
                }
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.handle_command(cmd);
                }
            }
        }
        info!("base supervisor stopped");
    }

    async fn handle_event(&mut self, event: CentralEvent) {
        match event {
            CentralEvent::AdvReport { name, addr, .. } => {
                if name != gatt::SHEARS_DEVICE_NAME {
                    return;
                }
                info!(
                    addr = %format_args!(
                        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
                        addr[5], addr[4], addr[3], addr[2], addr[1], addr[0]
                    ),
                    "saw shears, connecting"
                );
                self.radio.cancel_scan();
                if let Err(e) = self.radio.connect(addr, &ConnParams::default()) {
                    warn!(error = %e, "connect initiation failed, rescanning");
                    self.radio.start_scan();
                }
            }
            CentralEvent::Connected { max_attribute_size } => {
                info!(max_attribute_size, "connected to shears");
                self.set_connected(true);
                if let Err(e) = self.uplink.send_status(HostStatus::LinkUp).await {
                    warn!(error = %e, "failed to report link-up");
                }
                self.discover_and_subscribe();
            }
            CentralEvent::ConnectFailed => {
                warn!("connection failed, restarting scan");
                self.radio.start_scan();
            }
            CentralEvent::ScanComplete => {
                debug!("scan window ended, restarting");
                self.radio.start_scan();
            }
            CentralEvent::Disconnected => {
                info!("disconnected, restarting scan");
                self.channels = None;
                self.client.on_link_loss();
                self.set_connected(false);
                if let Err(e) = self.uplink.send_status(HostStatus::LinkDown).await {
                    warn!(error = %e, "failed to report link-down");
                }
                self.radio.start_scan();
            }
            CentralEvent::Notification { handle, data } => {
                let Some(channels) = self.channels else {
                    debug!(handle, "notification before discovery, dropped");
                    return;
                };
                if handle == channels.ctrl {
                    self.client.on_control_notify(&data).await;
                } else if handle == channels.data {
                    self.client.on_data_notify(&data).await;
                } else {
                    warn!(handle, "notification on unknown handle");
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::RequestLog(basename) => match self.channels {
                Some(channels) => {
                    if let Err(e) = self.client.request(&basename, &self.radio, channels.ctrl) {
                        warn!(error = %e, %basename, "log request failed");
                    }
                }
                None => {
                    info!(%basename, "channels not ready, queueing request");
                    self.pending = Some(basename);
                }
            },
        }
    }

    /// Service discovery, characteristic discovery, then notification
    /// subscription on both channels. Flushes the pending request once
    /// everything is wired.
    fn discover_and_subscribe(&mut self) {
        let services = match self.radio.discover_services() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "service discovery failed");
                return;
            }
        };
        let Some(log_svc) = services
            .iter()
            .find(|s| s.uuid16 == gatt::LOG_SERVICE_UUID)
        else {
            warn!("log service not found on peer");
            return;
        };
        debug!(
            start = log_svc.start_handle,
            end = log_svc.end_handle,
            "found log service"
        );

        let chars = match self.radio.discover_characteristics(log_svc) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "characteristic discovery failed");
                return;
            }
        };
        let ctrl = chars.iter().find(|c| c.uuid16 == gatt::CTRL_CHR_UUID);
        let data = chars.iter().find(|c| c.uuid16 == gatt::DATA_CHR_UUID);
        let (Some(ctrl), Some(data)) = (ctrl, data) else {
            warn!("log characteristics not fully discovered");
            return;
        };

        for chr in [ctrl, data] {
            let cccd = chr.val_handle + CCCD_OFFSET;
            if let Err(e) = self.radio.write(cccd, &CCCD_ENABLE_NOTIFY) {
                warn!(error = %e, handle = cccd, "failed to enable notifications");
                return;
            }
        }

        self.channels = Some(Channels {
            ctrl: ctrl.val_handle,
            data: data.val_handle,
        });
        info!(
            ctrl = ctrl.val_handle,
            data = data.val_handle,
            "channels ready"
        );

        if let Some(basename) = self.pending.take() {
            info!(%basename, "issuing queued log request");
            if let Err(e) = self
                .client
                .request(&basename, &self.radio, ctrl.val_handle)
            {
                warn!(error = %e, "queued request failed");
            }
        }
    }

    fn set_connected(&self, connected: bool) {
        if let Some(ind) = &self.indicator {
            ind.set_connected(connected);
        }
        if let Some(cb) = &self.on_connected {
            cb(connected);
        }
    }
}

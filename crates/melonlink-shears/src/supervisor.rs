//! Shears connection supervisor.
//!
//! Owns the peripheral radio port and the transfer server, and drives
//! both from one event loop: advertise, route control writes into the
//! server, tick the server's chunk emitter, re-advertise after a
//! disconnect, and keep the indicator honest.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use melonlink_radio::gatt;
use melonlink_radio::medium::{handles, Peripheral};
use melonlink_radio::types::{Advertisement, PeripheralEvent};

use crate::indicator::{Indicator, IndicatorMode};
use crate::server::TransferServer;

/// Application callback for link-state changes.
pub type ConnCallback = Box<dyn Fn(bool) + Send + Sync>;

/// The shears-side supervisor.
pub struct ShearsSupervisor {
    radio: Peripheral,
    server: TransferServer,
    indicator: Option<Indicator>,
    on_connected: Option<ConnCallback>,
    cancel: CancellationToken,
}

impl ShearsSupervisor {
    pub fn new(radio: Peripheral, server: TransferServer, cancel: CancellationToken) -> Self {
        Self {
            radio,
            server,
            indicator: None,
            on_connected: None,
            cancel,
        }
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
        self.advertise();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = self.radio.recv_event() => {
                    let Some(event) = event else { break };
                    self.handle_event(event);
                }
                _ = tokio::time::sleep(self.server.poll_interval()) => {
                    self.server.poll(&self.radio);
                }
            }
        }
        info!("shears supervisor stopped");
    }

    fn handle_event(&mut self, event: PeripheralEvent) {
        match event {
            PeripheralEvent::Connected { max_attribute_size } => {
                info!(max_attribute_size, "central connected");
                self.server.on_link_up(max_attribute_size);
                self.set_connected(true);
            }
            PeripheralEvent::Disconnected => {
                info!("central disconnected, restarting advertising");
                self.server.on_link_loss();
                self.set_connected(false);
                self.advertise();
            }
            PeripheralEvent::Write { handle, data } => match handle {
                handles::CTRL_VAL => self.server.handle_control(&data, &self.radio),
                other => warn!(handle = other, "write to unexpected handle"),
            },
        }
    }

    fn advertise(&mut self) {
        let adv = Advertisement {
            local_name: gatt::SHEARS_DEVICE_NAME.into(),
            services_16: vec![gatt::LOG_SERVICE_UUID],
        };
        if let Err(e) = self.radio.start_advertising(adv) {
            warn!(error = %e, "failed to start advertising");
        } else {
            info!(name = gatt::SHEARS_DEVICE_NAME, "advertising");
        }
    }

    fn set_connected(&self, connected: bool) {
        if let Some(ind) = &self.indicator {
            ind.set_mode(if connected {
                IndicatorMode::Solid
            } else {
                IndicatorMode::Blinking
            });
        }
        if let Some(cb) = &self.on_connected {
            cb(connected);
        }
    }
}

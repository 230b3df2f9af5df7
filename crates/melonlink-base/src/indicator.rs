//! Base status indicator.
//!
//! Fast blink (100 ms on / 100 ms off) while scanning or connecting,
//! solid on while the shears link is up. The blink loop re-checks the
//! state before the off phase so a connect never gets overridden by a
//! trailing blink cycle; output goes to an injected sink.

use tokio::sync::watch;
use tokio::time::Duration;

/// Output sink receiving on/off levels.
pub type IndicatorSink = Box<dyn Fn(bool) + Send + Sync>;

const BLINK_PHASE: Duration = Duration::from_millis(100);
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Handle controlling the base indicator task.
#[derive(Clone)]
pub struct Indicator {
    state_tx: watch::Sender<bool>,
}

impl Indicator {
    /// Spawns the indicator task writing levels to `sink`.
    pub fn spawn(sink: IndicatorSink) -> Self {
        let (state_tx, state_rx) = watch::channel(false);
        tokio::spawn(run_indicator(state_rx, sink));
        Self { state_tx }
    }

    /// Reports the link state: `true` holds the indicator solid.
    pub fn set_connected(&self, connected: bool) {
        let _ = self.state_tx.send(connected);
    }
}

async fn run_indicator(state_rx: watch::Receiver<bool>, sink: IndicatorSink) {
    loop {
        if state_rx.has_changed().is_err() {
            return; // controller dropped
        }
        if *state_rx.borrow() {
            sink(true);
            tokio::time::sleep(IDLE_POLL).await;
        } else {
            sink(true);
            tokio::time::sleep(BLINK_PHASE).await;
            // Re-check so a fresh connection keeps the level high.
            if *state_rx.borrow() {
                continue;
            }
            sink(false);
            tokio::time::sleep(BLINK_PHASE).await;
        }
    }
}

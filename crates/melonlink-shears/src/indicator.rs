//! Status indicator.
//!
//! Two visible states: blinking (100 ms on / 100 ms off) while waiting
//! for a connection, solid on while connected. The actual output — an
//! LED line on hardware — is injected as a sink so the timing logic
//! stays testable.

use tokio::sync::watch;
use tokio::time::Duration;

/// Output sink receiving on/off levels.
pub type IndicatorSink = Box<dyn Fn(bool) + Send + Sync>;

/// Indicator display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorMode {
    /// Waiting for a connection.
    Blinking,
    /// Link active.
    Solid,
}

const BLINK_PHASE: Duration = Duration::from_millis(100);

/// Handle controlling the indicator task.
#[derive(Clone)]
pub struct Indicator {
    mode_tx: watch::Sender<IndicatorMode>,
}

impl Indicator {
    /// Spawns the indicator task writing levels to `sink`.
    pub fn spawn(sink: IndicatorSink) -> Self {
        let (mode_tx, mode_rx) = watch::channel(IndicatorMode::Blinking);
        tokio::spawn(run_indicator(mode_rx, sink));
        Self { mode_tx }
    }

    /// Switches the display mode.
    pub fn set_mode(&self, mode: IndicatorMode) {
        let _ = self.mode_tx.send(mode);
    }
}

async fn run_indicator(mut mode_rx: watch::Receiver<IndicatorMode>, sink: IndicatorSink) {
    loop {
        let mode = *mode_rx.borrow_and_update();
        match mode {
            IndicatorMode::Solid => {
                sink(true);
                // Hold until the mode changes.
                if mode_rx.changed().await.is_err() {
                    return;
                }
            }
            IndicatorMode::Blinking => {
                sink(true);
                tokio::select! {
                    changed = mode_rx.changed() => {
                        if changed.is_err() { return; }
                        continue; // re-check before the off phase
                    }
                    _ = tokio::time::sleep(BLINK_PHASE) => {}
                }
                sink(false);
                tokio::select! {
                    changed = mode_rx.changed() => {
                        if changed.is_err() { return; }
                    }
                    _ = tokio::time::sleep(BLINK_PHASE) => {}
                }
            }
        }
    }
}

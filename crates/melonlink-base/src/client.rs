//! Log transfer client state machine.
//!
//! Mirrors the shears server from the receiving side:
//!
//! ```text
//! IDLE ── request written ──▶ AWAITING_ACCEPT ── STATUS(ACCEPTED) ──▶ RECEIVING
//!   ▲                               │                                    │
//!   └── error status / link loss ───┴──────── terminal status ───────────┘
//! ```
//!
//! Committed chunk payloads are forwarded to the host as log-line
//! frames; the uplink's bounded queue provides the backpressure, so a
//! chunk is always fully consumed before the next notification is
//! processed.
//!
//! While RECEIVING, a refusal status (BUSY / NO_FILE / FS_ERROR) can
//! only be the answer to a second, concurrent request: it is reported
//! as a transfer error without touching the running reception. Only
//! DONE and ABORTED end the session from the shears side.
//!
//! On a chunk index mismatch the default policy is strict: the chunk is
//! not committed and `next_expected` stays put, so a later in-order
//! chunk can still land. Compiling with the `realign-on-mismatch`
//! feature switches to adopting the received index instead. A mismatch
//! warning is logged either way.

use tracing::{debug, info, warn};

use melonlink_protocol::chunk;
use melonlink_protocol::control::{ControlCommand, StatusCode, StatusEvent};
use melonlink_protocol::uplink::HostStatus;
use melonlink_radio::medium::Central;
use melonlink_radio::Handle;

use crate::uplink::SerialUplink;
use crate::BaseError;

/// Receiving-side view of one transfer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reception {
    pub basename: String,
    pub expected_size: u32,
    pub bytes_received: u64,
    pub next_chunk_index: u16,
    /// Chunks committed so far (equals `next_chunk_index` under the
    /// strict policy).
    pub chunks_committed: u64,
}

enum State {
    Idle,
    AwaitingAccept { basename: String },
    Receiving(Reception),
}

/// The base-side transfer client.
pub struct TransferClient {
    state: State,
    uplink: SerialUplink,
}

impl TransferClient {
    pub fn new(uplink: SerialUplink) -> Self {
        Self {
            state: State::Idle,
            uplink,
        }
    }

    /// Whether a reception is currently active.
    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Receiving(_))
    }

    /// The active reception, if any.
    pub fn reception(&self) -> Option<&Reception> {
        match &self.state {
            State::Receiving(r) => Some(r),
            _ => None,
        }
    }

    /// Writes `START_TRANSFER` for `basename` on the control channel.
    ///
    /// From IDLE this arms the accept wait. While a reception is already
    /// running the write still goes out (the server answers `BUSY`,
    /// which is reported as a transfer error without disturbing the
    /// running reception).
    pub fn request(
        &mut self,
        basename: &str,
        radio: &Central,
        ctrl_handle: Handle,
    ) -> Result<(), BaseError> {
        let cmd = ControlCommand::StartTransfer {
            basename: basename.to_string(),
        };
        radio.write(ctrl_handle, &cmd.encode()?)?;
        info!(basename, "log requested from shears");

        if !matches!(self.state, State::Receiving(_)) {
            self.state = State::AwaitingAccept {
                basename: basename.to_string(),
            };
        }
        Ok(())
    }

    /// Handles a control-channel notification (status event).
    pub async fn on_control_notify(&mut self, data: &[u8]) {
        let event = match StatusEvent::decode(data) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "ignoring unusable status notification");
                return;
            }
        };

        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => {
                warn!(code = ?event.code, "status with no request outstanding");
            }
            State::AwaitingAccept { basename } => match event.code {
                StatusCode::Accepted => {
                    let expected_size = event.file_size.unwrap_or(0);
                    info!(%basename, expected_size, "transfer accepted");
                    self.send_host_status(HostStatus::TransferStart).await;
                    self.state = State::Receiving(Reception {
                        basename,
                        expected_size,
                        bytes_received: 0,
                        next_chunk_index: 0,
                        chunks_committed: 0,
                    });
                }
                code => {
                    warn!(%basename, code = ?code, "transfer refused");
                    self.send_host_status(HostStatus::TransferError).await;
                }
            },
            State::Receiving(r) => match event.code {
                StatusCode::Done => {
                    if r.bytes_received < r.expected_size as u64 {
                        // Defined behavior: done is still done, the gap
                        // is only recorded.
                        warn!(
                            received = r.bytes_received,
                            expected = r.expected_size,
                            "transfer done with missing bytes"
                        );
                    } else {
                        info!(
                            received = r.bytes_received,
                            chunks = r.chunks_committed,
                            "transfer finished"
                        );
                    }
                    self.send_host_status(HostStatus::TransferDone).await;
                }
                StatusCode::Busy | StatusCode::NoFile | StatusCode::FsError => {
                    // A second request raced the running session; the
                    // refusal concerns that request only. Only ABORTED
                    // can end the session itself.
                    warn!(code = ?event.code, "concurrent request refused");
                    self.send_host_status(HostStatus::TransferError).await;
                    self.state = State::Receiving(r);
                }
                StatusCode::Aborted => {
                    warn!(
                        received = r.bytes_received,
                        expected = r.expected_size,
                        "transfer aborted by shears"
                    );
                    self.send_host_status(HostStatus::TransferError).await;
                }
                StatusCode::Accepted => {
                    warn!("unexpected accept during reception");
                    self.state = State::Receiving(r);
                }
            },
        }
    }

    /// Handles a data-channel notification (file chunk).
    ///
    /// The chunk is fully consumed (forwarded to the host) before this
    /// returns, so callers may drop the notification buffer afterwards.
    pub async fn on_data_notify(&mut self, data: &[u8]) {
        let State::Receiving(r) = &mut self.state else {
            debug!(len = data.len(), "chunk ignored: no active reception");
            return;
        };

        let (index, payload) = match chunk::decode_chunk(data) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(error = %e, "ignoring unusable chunk");
                return;
            }
        };

        if index != r.next_chunk_index {
            warn!(
                got = index,
                expected = r.next_chunk_index,
                "chunk out of order"
            );
            #[cfg(not(feature = "realign-on-mismatch"))]
            return;
            #[cfg(feature = "realign-on-mismatch")]
            {
                r.next_chunk_index = index;
            }
        }

        if let Err(e) = self.forward_payload(index, payload).await {
            warn!(error = %e, "failed to forward chunk to host");
        }
    }

    async fn forward_payload(&mut self, index: u16, payload: &[u8]) -> Result<(), BaseError> {
        self.uplink.send_log_line(payload).await?;
        if let State::Receiving(r) = &mut self.state {
            r.bytes_received += payload.len() as u64;
            r.next_chunk_index = r.next_chunk_index.wrapping_add(1);
            r.chunks_committed += 1;
            debug!(
                chunk = index,
                bytes = r.bytes_received,
                expected = r.expected_size,
                "chunk committed"
            );
        }
        Ok(())
    }

    /// Drops any session state on link loss. The supervisor reports the
    /// link-down status; nothing transfer-specific goes to the host.
    pub fn on_link_loss(&mut self) {
        if self.is_active() {
            info!("link lost, dropping reception");
        }
        self.state = State::Idle;
    }

    async fn send_host_status(&self, status: HostStatus) {
        if let Err(e) = self.uplink.send_status(status).await {
            warn!(error = %e, "failed to send host status");
        }
    }
}

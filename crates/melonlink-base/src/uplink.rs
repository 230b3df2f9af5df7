//! Framed serial uplink to the host.
//!
//! Single writer: every outgoing message becomes one frame
//! (`[0xAA][type][len:2 LE][payload][xor]`) built in a local buffer and
//! written with a single call, so the host parser always sees whole
//! frames even when writers interleave. A bounded queue in front of the
//! writer task provides backpressure — `send` blocks when the host side
//! falls behind, and nothing is ever dropped.
//!
//! There is no retransmission and no application-level acknowledgment on
//! this link; the host resynchronizes on the start byte if it joins
//! mid-stream.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use melonlink_protocol::uplink::{
    encode_frame, CutRecord, HostStatus, MsgType, MAX_FRAME_PAYLOAD,
};

use crate::BaseError;

/// Frames buffered ahead of the writer. At the maximum frame size this
/// is well past the 512 bytes of transmit buffering the driver promises.
const QUEUE_DEPTH: usize = 16;

/// Handle for sending framed messages to the host.
#[derive(Clone)]
pub struct SerialUplink {
    tx: mpsc::Sender<Vec<u8>>,
}

impl SerialUplink {
    /// Installs the uplink writer over `writer` and returns the sending
    /// handle. The writer task runs until cancelled or every handle is
    /// dropped.
    pub fn spawn<W>(writer: W, cancel: CancellationToken) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(write_loop(writer, rx, cancel));
        Self { tx }
    }

    /// Sends one framed message.
    ///
    /// Rejects payloads over [`MAX_FRAME_PAYLOAD`] bytes before queueing
    /// — that is a programming error, not a link condition. Blocks while
    /// the queue is full.
    pub async fn send(&self, msg_type: MsgType, payload: &[u8]) -> Result<(), BaseError> {
        let frame = encode_frame(msg_type, payload)?;
        self.tx
            .send(frame)
            .await
            .map_err(|_| BaseError::UplinkClosed)
    }

    /// Sends a status update.
    pub async fn send_status(&self, status: HostStatus) -> Result<(), BaseError> {
        debug!(status = ?status, "uplink status");
        self.send(MsgType::Status, &[status as u8]).await
    }

    /// Forwards raw log bytes from the shears CSV.
    pub async fn send_log_line(&self, line: &[u8]) -> Result<(), BaseError> {
        self.send(MsgType::LogLine, line).await
    }

    /// Sends one packed cut record.
    pub async fn send_cut(&self, record: &CutRecord) -> Result<(), BaseError> {
        self.send(MsgType::CutRecord, &record.encode()).await
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(f) => f,
                None => break,
            },
        };
        if let Err(e) = writer.write_all(&frame).await {
            warn!(error = %e, "uplink write failed, frame lost");
            continue;
        }
        if let Err(e) = writer.flush().await {
            warn!(error = %e, "uplink flush failed");
        }
    }
    info!("uplink writer stopped");
}

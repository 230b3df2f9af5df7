//! Log transfer server state machine.
//!
//! Accepts `START_TRANSFER` requests on the control channel and streams
//! the requested file as indexed chunks on the data channel:
//!
//! ```text
//! IDLE ── START_TRANSFER accepted ──▶ ACTIVE ── EOF ──▶ FINALIZING ──▶ IDLE
//!   ▲                                   │
//!   └────────── ABORT / link loss ──────┘
//! ```
//!
//! Chunk emission runs from the owner's periodic poll, one read per tick
//! while ACTIVE. `ACCEPTED` always precedes the first chunk and the
//! terminal status is only sent after the file is closed, so the
//! receiving side can trust session boundaries.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use tokio::time::Duration;
use tracing::{debug, info, warn};

use melonlink_protocol::chunk;
use melonlink_protocol::control::{self, ControlCommand, StatusCode, StatusEvent};
use melonlink_radio::medium::{handles, Peripheral};

/// Poll period while a transfer is running.
const ACTIVE_POLL: Duration = Duration::from_millis(10);

/// Poll period while idle.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// One active file offload.
pub struct TransferSession {
    pub basename: String,
    pub path: PathBuf,
    file: File,
    pub total_size: u64,
    pub bytes_emitted: u64,
    pub chunk_index: u16,
    pub payload_size: usize,
}

enum State {
    Idle,
    Active(TransferSession),
    /// File closed; terminal DONE still owed to the peer.
    Finalizing { file_size: u32 },
}

/// The shears-side transfer server.
pub struct TransferServer {
    storage_dir: PathBuf,
    state: State,
    /// Maximum attribute size of the current link, when one exists.
    link_max_attr: Option<usize>,
}

impl TransferServer {
    /// Creates a server resolving basenames under `storage_dir`.
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            state: State::Idle,
            link_max_attr: None,
        }
    }

    /// Records the new link's maximum attribute size.
    pub fn on_link_up(&mut self, max_attribute_size: usize) {
        self.link_max_attr = Some(max_attribute_size);
    }

    /// Drops any session without emitting status (the peer is gone).
    pub fn on_link_loss(&mut self) {
        if !matches!(self.state, State::Idle) {
            info!("link lost, dropping transfer session");
        }
        self.state = State::Idle;
        self.link_max_attr = None;
    }

    /// Whether a session is in flight (drives the poll cadence).
    pub fn is_busy(&self) -> bool {
        !matches!(self.state, State::Idle)
    }

    /// Poll period appropriate to the current state.
    pub fn poll_interval(&self) -> Duration {
        if self.is_busy() {
            ACTIVE_POLL
        } else {
            IDLE_POLL
        }
    }

    /// The in-flight session, if any.
    pub fn session(&self) -> Option<&TransferSession> {
        match &self.state {
            State::Active(s) => Some(s),
            _ => None,
        }
    }

    /// Handles one control-characteristic write.
    pub fn handle_control(&mut self, data: &[u8], radio: &Peripheral) {
        match ControlCommand::decode(data) {
            Ok(ControlCommand::Nop) => {}
            Ok(ControlCommand::StartTransfer { basename }) => {
                self.start_transfer(&basename, radio)
            }
            Ok(ControlCommand::Abort) => self.abort(radio),
            Err(e) => warn!(error = %e, "ignoring unusable control write"),
        }
    }

    /// One background step: emit a chunk while ACTIVE, finish while
    /// FINALIZING, do nothing while IDLE.
    pub fn poll(&mut self, radio: &Peripheral) {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => {}
            State::Finalizing { file_size } => {
                info!(file_size, "transfer complete");
                self.send_status(StatusEvent::of(StatusCode::Done), radio);
            }
            State::Active(mut session) => {
                let mut payload = vec![0u8; session.payload_size];
                let n = match session.file.read(&mut payload) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(error = %e, "read failed mid-transfer");
                        0
                    }
                };

                if n > 0 {
                    let frame = chunk::encode_chunk(session.chunk_index, &payload[..n]);
                    match radio.notify(handles::DATA_VAL, &frame) {
                        Ok(0) => debug!("chunk dropped: peer not subscribed"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "chunk notify failed"),
                    }
                    session.bytes_emitted += n as u64;
                    session.chunk_index = session.chunk_index.wrapping_add(1);
                }

                if n < session.payload_size {
                    // EOF or short read: close the file, finish next tick.
                    debug!(
                        bytes = session.bytes_emitted,
                        chunks = session.chunk_index,
                        "reached end of file"
                    );
                    self.state = State::Finalizing {
                        file_size: session.total_size as u32,
                    };
                } else {
                    self.state = State::Active(session);
                }
            }
        }
    }

    fn start_transfer(&mut self, basename: &str, radio: &Peripheral) {
        if self.is_busy() {
            warn!(basename, "transfer already in progress");
            self.send_status(StatusEvent::of(StatusCode::Busy), radio);
            return;
        }

        let Some(max_attr) = self.link_max_attr else {
            warn!("start requested without a link");
            return;
        };
        let Some(payload_size) = chunk::payload_size_for(max_attr) else {
            warn!(max_attr, "link cannot carry chunk payload");
            self.send_status(StatusEvent::of(StatusCode::FsError), radio);
            return;
        };

        if let Err(e) = control::validate_basename(basename) {
            warn!(basename, error = %e, "rejecting transfer request");
            self.send_status(StatusEvent::of(StatusCode::FsError), radio);
            return;
        }

        let path = self.storage_dir.join(basename);
        info!(path = %path.display(), "start transfer requested");

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "file not found");
                self.send_status(StatusEvent::of(StatusCode::NoFile), radio);
                return;
            }
        };
        let total_size = match file.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                warn!(error = %e, "failed to size file");
                self.send_status(StatusEvent::of(StatusCode::FsError), radio);
                return;
            }
        };
        // The 16-bit chunk index must cover the whole file.
        if chunk::chunk_count(total_size, payload_size).is_err() {
            warn!(total_size, payload_size, "file exceeds chunk index space");
            self.send_status(StatusEvent::of(StatusCode::FsError), radio);
            return;
        }

        self.send_status(StatusEvent::accepted(total_size as u32), radio);
        info!(total_size, payload_size, "transfer accepted");
        self.state = State::Active(TransferSession {
            basename: basename.to_string(),
            path,
            file,
            total_size,
            bytes_emitted: 0,
            chunk_index: 0,
            payload_size,
        });
    }

    fn abort(&mut self, radio: &Peripheral) {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Active(session) => {
                info!(
                    bytes = session.bytes_emitted,
                    total = session.total_size,
                    "transfer aborted"
                );
                drop(session); // closes the file
                self.send_status(StatusEvent::of(StatusCode::Aborted), radio);
            }
            other => self.state = other,
        }
    }

    fn send_status(&self, event: StatusEvent, radio: &Peripheral) {
        match radio.notify(handles::CTRL_VAL, &event.encode()) {
            Ok(0) => debug!(code = ?event.code, "status dropped: peer not subscribed"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, code = ?event.code, "status notify failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use melonlink_radio::gatt::{self, CCCD_ENABLE_NOTIFY};
    use melonlink_radio::types::{Advertisement, CentralEvent, ConnParams};
    use melonlink_radio::{Central, Medium, MediumCtl};
    use tempfile::TempDir;

    /// Connected medium with both channels subscribed, MTU 23.
    async fn rig(att_mtu: usize) -> (Peripheral, Central, MediumCtl) {
        let (mut periph, mut central, ctl) = Medium::pair(att_mtu);
        periph
            .start_advertising(Advertisement {
                local_name: gatt::SHEARS_DEVICE_NAME.into(),
                services_16: vec![gatt::LOG_SERVICE_UUID],
            })
            .unwrap();
        central.start_scan();
        let Some(CentralEvent::AdvReport { addr, .. }) = central.recv_event().await else {
            panic!("no adv report");
        };
        central.connect(addr, &ConnParams::default()).unwrap();
        let _ = central.recv_event().await; // Connected
        central.write(handles::CTRL_CCCD, &CCCD_ENABLE_NOTIFY).unwrap();
        central.write(handles::DATA_CCCD, &CCCD_ENABLE_NOTIFY).unwrap();
        (periph, central, ctl)
    }

    fn server_with_file(content: &[u8]) -> (TempDir, TransferServer) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("gps_points.csv"), content).unwrap();
        let server = TransferServer::new(dir.path());
        (dir, server)
    }

    fn start(server: &mut TransferServer, name: &str, periph: &Peripheral) {
        let cmd = ControlCommand::StartTransfer {
            basename: name.into(),
        }
        .encode()
        .unwrap();
        server.handle_control(&cmd, periph);
    }

    async fn next_status(central: &mut Central) -> StatusEvent {
        loop {
            match central.recv_event().await.expect("event stream open") {
                CentralEvent::Notification { handle, data } if handle == handles::CTRL_VAL => {
                    return StatusEvent::decode(&data).unwrap();
                }
                _ => {}
            }
        }
    }

    async fn next_chunk(central: &mut Central) -> (u16, Vec<u8>) {
        loop {
            match central.recv_event().await.expect("event stream open") {
                CentralEvent::Notification { handle, data } if handle == handles::DATA_VAL => {
                    let (idx, payload) = chunk::decode_chunk(&data).unwrap();
                    return (idx, payload.to_vec());
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn streams_file_in_order_then_done() {
        // 46 bytes over an 18-byte payload: 18 + 18 + 10.
        let content = b"utc_time,lat\n192928.00,29.6500000\n1234567890..";
        assert_eq!(content.len(), 46);
        let (periph, mut central, _ctl) = rig(23).await;
        let (_dir, mut server) = server_with_file(content);
        server.on_link_up(periph.max_attribute_size());

        start(&mut server, "gps_points.csv", &periph);
        let accepted = next_status(&mut central).await;
        assert_eq!(accepted.code, StatusCode::Accepted);
        assert_eq!(accepted.file_size, Some(46));

        let mut received = Vec::new();
        for expected_idx in 0..3u16 {
            server.poll(&periph);
            let (idx, payload) = next_chunk(&mut central).await;
            assert_eq!(idx, expected_idx);
            received.extend_from_slice(&payload);
        }
        assert_eq!(received, content);

        // The 10-byte final read was short: already FINALIZING.
        server.poll(&periph);
        let done = next_status(&mut central).await;
        assert_eq!(done.code, StatusCode::Done);
        assert!(!server.is_busy());
    }

    #[tokio::test]
    async fn exact_multiple_needs_one_extra_read() {
        let content = vec![0x42u8; 36]; // exactly 2 × 18
        let (periph, mut central, _ctl) = rig(23).await;
        let (_dir, mut server) = server_with_file(&content);
        server.on_link_up(periph.max_attribute_size());

        start(&mut server, "gps_points.csv", &periph);
        assert_eq!(next_status(&mut central).await.code, StatusCode::Accepted);

        server.poll(&periph);
        assert_eq!(next_chunk(&mut central).await.1.len(), 18);
        server.poll(&periph);
        assert_eq!(next_chunk(&mut central).await.1.len(), 18);

        // Still ACTIVE: the zero-byte read happens on the next tick and
        // must not emit an empty chunk.
        assert!(server.is_busy());
        server.poll(&periph);
        server.poll(&periph);
        assert_eq!(next_status(&mut central).await.code, StatusCode::Done);
    }

    #[tokio::test]
    async fn empty_file_sends_accepted_then_done() {
        let (periph, mut central, _ctl) = rig(23).await;
        let (_dir, mut server) = server_with_file(b"");
        server.on_link_up(periph.max_attribute_size());

        start(&mut server, "gps_points.csv", &periph);
        let accepted = next_status(&mut central).await;
        assert_eq!(accepted.file_size, Some(0));

        server.poll(&periph); // zero-byte read → FINALIZING, no chunk
        server.poll(&periph); // DONE
        assert_eq!(next_status(&mut central).await.code, StatusCode::Done);
    }

    #[tokio::test]
    async fn missing_file_reports_no_file() {
        let (periph, mut central, _ctl) = rig(23).await;
        let dir = TempDir::new().unwrap();
        let mut server = TransferServer::new(dir.path());
        server.on_link_up(periph.max_attribute_size());

        start(&mut server, "nope.csv", &periph);
        assert_eq!(next_status(&mut central).await.code, StatusCode::NoFile);
        assert!(!server.is_busy());
    }

    #[tokio::test]
    async fn second_request_while_active_gets_busy() {
        let content = vec![1u8; 100];
        let (periph, mut central, _ctl) = rig(23).await;
        let (_dir, mut server) = server_with_file(&content);
        server.on_link_up(periph.max_attribute_size());

        start(&mut server, "gps_points.csv", &periph);
        assert_eq!(next_status(&mut central).await.code, StatusCode::Accepted);

        start(&mut server, "gps_points.csv", &periph);
        assert_eq!(next_status(&mut central).await.code, StatusCode::Busy);

        // The original session is untouched.
        let session = server.session().unwrap();
        assert_eq!(session.total_size, 100);
        assert_eq!(session.bytes_emitted, 0);
    }

    #[tokio::test]
    async fn abort_mid_transfer() {
        let content = vec![1u8; 100];
        let (periph, mut central, _ctl) = rig(23).await;
        let (_dir, mut server) = server_with_file(&content);
        server.on_link_up(periph.max_attribute_size());

        start(&mut server, "gps_points.csv", &periph);
        assert_eq!(next_status(&mut central).await.code, StatusCode::Accepted);
        server.poll(&periph);
        let _ = next_chunk(&mut central).await;

        server.handle_control(&ControlCommand::Abort.encode().unwrap(), &periph);
        assert_eq!(next_status(&mut central).await.code, StatusCode::Aborted);
        assert!(!server.is_busy());
    }

    #[tokio::test]
    async fn abort_while_idle_is_silent() {
        let (periph, mut central, _ctl) = rig(23).await;
        let dir = TempDir::new().unwrap();
        let mut server = TransferServer::new(dir.path());
        server.on_link_up(periph.max_attribute_size());

        server.handle_control(&ControlCommand::Abort.encode().unwrap(), &periph);
        let quiet =
            tokio::time::timeout(Duration::from_millis(20), central.recv_event()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test]
    async fn tiny_link_rejected_before_open() {
        // ATT MTU 5 → attribute size 2 → zero payload bytes.
        let (periph, mut central, _ctl) = rig(5).await;
        let (_dir, mut server) = server_with_file(b"data");
        server.on_link_up(periph.max_attribute_size());

        start(&mut server, "gps_points.csv", &periph);
        assert_eq!(next_status(&mut central).await.code, StatusCode::FsError);
    }

    #[tokio::test]
    async fn basename_length_boundary() {
        let (periph, mut central, _ctl) = rig(23).await;
        let dir = TempDir::new().unwrap();
        let name48 = "a".repeat(48);
        std::fs::write(dir.path().join(&name48), b"x").unwrap();
        let mut server = TransferServer::new(dir.path());
        server.on_link_up(periph.max_attribute_size());

        start(&mut server, &name48, &periph);
        assert_eq!(next_status(&mut central).await.code, StatusCode::Accepted);
        server.on_link_loss();

        // 49 bytes: rejected before touching the filesystem.
        server.on_link_up(periph.max_attribute_size());
        let name49 = "a".repeat(49);
        let mut cmd = vec![control::opcode::START_TRANSFER];
        cmd.extend_from_slice(name49.as_bytes());
        cmd.push(0);
        server.handle_control(&cmd, &periph);
        assert_eq!(next_status(&mut central).await.code, StatusCode::FsError);
    }

    #[tokio::test]
    async fn link_loss_drops_session_silently() {
        let content = vec![1u8; 100];
        let (periph, mut central, ctl) = rig(23).await;
        let (_dir, mut server) = server_with_file(&content);
        server.on_link_up(periph.max_attribute_size());

        start(&mut server, "gps_points.csv", &periph);
        assert_eq!(next_status(&mut central).await.code, StatusCode::Accepted);

        ctl.drop_link();
        server.on_link_loss();
        assert!(!server.is_busy());

        // Polling after the loss emits nothing.
        server.poll(&periph);
        loop {
            match tokio::time::timeout(Duration::from_millis(20), central.recv_event()).await {
                Err(_) => break,
                Ok(Some(CentralEvent::Disconnected)) => continue,
                Ok(other) => panic!("unexpected event after link loss: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn bytes_emitted_never_exceeds_total() {
        let content = vec![7u8; 50];
        let (periph, mut central, _ctl) = rig(23).await;
        let (_dir, mut server) = server_with_file(&content);
        server.on_link_up(periph.max_attribute_size());

        start(&mut server, "gps_points.csv", &periph);
        let _ = next_status(&mut central).await;
        while server.is_busy() {
            if let Some(s) = server.session() {
                assert!(s.bytes_emitted <= s.total_size);
            }
            server.poll(&periph);
        }
    }
}

//! Test rig assembling both device stacks over the in-process medium.
//!
//! One call to [`spawn_rig`] yields a running shears (assembler, save
//! worker, transfer server, supervisor) and base (client, uplink,
//! supervisor) wired back to back, plus a host-side frame reader on the
//! serial wire and the medium's fault-injection handle.

use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::sync::CancellationToken;

use melonlink_base::supervisor::{BaseHandle, BaseSupervisor};
use melonlink_base::{SerialUplink, TransferClient};
use melonlink_protocol::uplink::{Frame, FrameParser, HostStatus, MsgType};
use melonlink_radio::{Medium, MediumCtl};
use melonlink_shears::assembler::run_assembler;
use melonlink_shears::save::run_save_worker;
use melonlink_shears::{
    CsvStore, LatestLine, SaveRequest, ShearsSupervisor, TransferServer,
};

/// How long host-frame waits may take before a scenario fails.
pub const WAIT: Duration = Duration::from_secs(10);

/// Both running stacks plus the observation points.
pub struct Rig {
    pub shears_dir: TempDir,
    pub store: CsvStore,
    pub save: SaveRequest,
    pub gps: DuplexStream,
    pub base: BaseHandle,
    pub host: HostReader,
    pub ctl: MediumCtl,
    pub cancel: CancellationToken,
}

/// Reads and parses uplink frames from the host side of the wire.
pub struct HostReader {
    wire: DuplexStream,
    parser: FrameParser,
    queued: Vec<Frame>,
}

impl HostReader {
    /// Next frame, in arrival order.
    pub async fn next_frame(&mut self) -> Frame {
        loop {
            if !self.queued.is_empty() {
                return self.queued.remove(0);
            }
            let mut buf = [0u8; 512];
            let n = tokio::time::timeout(WAIT, self.wire.read(&mut buf))
                .await
                .expect("timed out waiting for host frame")
                .expect("host wire closed");
            self.queued.extend(self.parser.push(&buf[..n]));
        }
    }

    /// Next frame, asserting it is the given status.
    pub async fn expect_status(&mut self, status: HostStatus) {
        let frame = self.next_frame().await;
        assert_eq!(frame.msg_type, MsgType::Status, "frame: {frame:?}");
        assert_eq!(frame.payload, vec![status as u8]);
    }

    /// Collects log-line payloads until the given status arrives,
    /// asserting no other status interleaves.
    pub async fn log_lines_until(&mut self, status: HostStatus) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        loop {
            let frame = self.next_frame().await;
            match frame.msg_type {
                MsgType::LogLine => lines.push(frame.payload),
                MsgType::Status => {
                    assert_eq!(frame.payload, vec![status as u8], "unexpected status");
                    return lines;
                }
                other => panic!("unexpected frame type {other:?}"),
            }
        }
    }

    /// Asserts the wire stays silent for `window`.
    pub async fn expect_quiet(&mut self, window: Duration) {
        assert!(self.queued.is_empty(), "frames already queued");
        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(window, self.wire.read(&mut buf)).await;
        assert!(read.is_err(), "unexpected host traffic");
    }
}

/// Spawns the full two-device rig over a medium with the given ATT MTU.
pub async fn spawn_rig(att_mtu: usize) -> Rig {
    let (periph, central, ctl) = Medium::pair(att_mtu);
    let cancel = CancellationToken::new();

    // Shears side.
    let shears_dir = TempDir::new().expect("tempdir");
    let store = CsvStore::open(shears_dir.path().join("gps_points.csv")).expect("store");
    let server = TransferServer::new(shears_dir.path());
    tokio::spawn(ShearsSupervisor::new(periph, server, cancel.clone()).run());

    let latest = LatestLine::new();
    let (gps, gps_stream) = tokio::io::duplex(1024);
    tokio::spawn(run_assembler(gps_stream, latest.clone(), cancel.clone()));

    let save = SaveRequest::new();
    tokio::spawn(run_save_worker(
        save.clone(),
        latest,
        store.clone(),
        cancel.clone(),
    ));

    // Base side.
    let (wire_tx, wire_rx) = tokio::io::duplex(8192);
    let uplink = SerialUplink::spawn(wire_tx, cancel.clone());
    let client = TransferClient::new(uplink.clone());
    let (supervisor, base) = BaseSupervisor::new(central, client, uplink, cancel.clone());
    tokio::spawn(supervisor.run());

    Rig {
        shears_dir,
        store,
        save,
        gps,
        base,
        host: HostReader {
            wire: wire_rx,
            parser: FrameParser::new(),
            queued: Vec::new(),
        },
        ctl,
        cancel,
    }
}

impl Rig {
    /// Feeds raw bytes into the GPS stream.
    pub async fn feed_gps(&mut self, bytes: &[u8]) {
        self.gps.write_all(bytes).await.expect("gps wire");
    }

    /// Writes a file into the shears storage directory.
    pub fn plant_file(&self, basename: &str, content: &[u8]) {
        std::fs::write(self.shears_dir.path().join(basename), content).expect("plant file");
    }

    /// Waits until the medium reports an active link.
    pub async fn wait_connected(&self) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while !self.ctl.is_connected() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "link never came up"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

//! End-to-end transfer scenarios over the in-process medium.

use std::time::Duration;

use melonlink_e2e::spawn_rig;
use melonlink_protocol::uplink::HostStatus;

/// 46 bytes: two full 18-byte chunks plus a 10-byte tail at MTU 23.
const GPS_CSV_46: &[u8] = b"utc_time,lat\n192928.00,29.6500000\n29.6500001\n\n";

#[tokio::test]
async fn small_file_offload_chunk_sequence() {
    assert_eq!(GPS_CSV_46.len(), 46);
    let mut rig = spawn_rig(23).await;
    rig.plant_file("gps.csv", GPS_CSV_46);

    rig.host.expect_status(HostStatus::LinkUp).await;
    rig.base.request_log("gps.csv").await.unwrap();

    rig.host.expect_status(HostStatus::TransferStart).await;
    let lines = rig.host.log_lines_until(HostStatus::TransferDone).await;

    // 18 + 18 + 10, strictly in order, byte-exact.
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0].len(), 18);
    assert_eq!(lines[1].len(), 18);
    assert_eq!(lines[2].len(), 10);
    let rebuilt: Vec<u8> = lines.concat();
    assert_eq!(rebuilt, GPS_CSV_46);
}

#[tokio::test]
async fn missing_file_reports_error_and_no_chunks() {
    let mut rig = spawn_rig(23).await;

    rig.host.expect_status(HostStatus::LinkUp).await;
    rig.base.request_log("missing.csv").await.unwrap();

    rig.host.expect_status(HostStatus::TransferError).await;
    rig.host.expect_quiet(Duration::from_millis(150)).await;

    // The server stayed IDLE: a follow-up request succeeds.
    rig.plant_file("late.csv", b"now it exists");
    rig.base.request_log("late.csv").await.unwrap();
    rig.host.expect_status(HostStatus::TransferStart).await;
    let lines = rig.host.log_lines_until(HostStatus::TransferDone).await;
    assert_eq!(lines.concat(), b"now it exists");
}

#[tokio::test]
async fn concurrent_request_is_refused_without_hurting_the_transfer() {
    let mut rig = spawn_rig(23).await;
    // Large enough that the transfer is still running when the second
    // request lands (18 bytes per 10 ms tick).
    let content: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
    rig.plant_file("big.csv", &content);

    rig.host.expect_status(HostStatus::LinkUp).await;
    rig.base.request_log("big.csv").await.unwrap();
    rig.host.expect_status(HostStatus::TransferStart).await;

    // Second request mid-flight draws BUSY → one transfer-error frame.
    rig.base.request_log("big.csv").await.unwrap();

    let mut lines = Vec::new();
    let mut saw_busy_error = false;
    loop {
        let frame = rig.host.next_frame().await;
        match frame.msg_type {
            melonlink_protocol::uplink::MsgType::LogLine => lines.push(frame.payload),
            melonlink_protocol::uplink::MsgType::Status => {
                if frame.payload == vec![HostStatus::TransferError as u8] {
                    assert!(!saw_busy_error, "only one refusal expected");
                    saw_busy_error = true;
                } else {
                    assert_eq!(frame.payload, vec![HostStatus::TransferDone as u8]);
                    break;
                }
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    assert!(saw_busy_error, "the refused request must surface");
    assert_eq!(lines.concat(), content, "original session unharmed");
}

#[tokio::test]
async fn empty_file_transfers_zero_chunks() {
    let mut rig = spawn_rig(23).await;
    rig.plant_file("empty.csv", b"");

    rig.host.expect_status(HostStatus::LinkUp).await;
    rig.base.request_log("empty.csv").await.unwrap();

    rig.host.expect_status(HostStatus::TransferStart).await;
    let lines = rig.host.log_lines_until(HostStatus::TransferDone).await;
    assert!(lines.is_empty());
}

#[tokio::test]
async fn exact_chunk_multiple_has_no_empty_tail() {
    let mut rig = spawn_rig(23).await;
    let content = vec![0x5Au8; 36]; // exactly 2 × 18
    rig.plant_file("even.csv", &content);

    rig.host.expect_status(HostStatus::LinkUp).await;
    rig.base.request_log("even.csv").await.unwrap();

    rig.host.expect_status(HostStatus::TransferStart).await;
    let lines = rig.host.log_lines_until(HostStatus::TransferDone).await;
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.len() == 18));
}

#[tokio::test]
async fn request_before_discovery_is_queued_once() {
    let mut rig = spawn_rig(23).await;
    rig.plant_file("x.csv", b"queued request payload");

    // Request immediately; the link may well not be up yet.
    rig.base.request_log("x.csv").await.unwrap();

    rig.host.expect_status(HostStatus::LinkUp).await;
    rig.host.expect_status(HostStatus::TransferStart).await;
    let lines = rig.host.log_lines_until(HostStatus::TransferDone).await;
    assert_eq!(lines.concat(), b"queued request payload");

    // Exactly one transfer: nothing further on the wire.
    rig.host.expect_quiet(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn link_loss_cancels_session_and_recovers() {
    let mut rig = spawn_rig(23).await;
    let content: Vec<u8> = (0..4096u32).map(|i| (i % 157) as u8).collect();
    rig.plant_file("big.csv", &content);

    rig.host.expect_status(HostStatus::LinkUp).await;
    rig.base.request_log("big.csv").await.unwrap();
    rig.host.expect_status(HostStatus::TransferStart).await;

    // Let a few chunks through, then kill the link mid-transfer.
    let _ = rig.host.next_frame().await;
    let _ = rig.host.next_frame().await;
    rig.ctl.drop_link();

    // Link-down is reported; no terminal transfer status follows.
    loop {
        let frame = rig.host.next_frame().await;
        if frame.msg_type == melonlink_protocol::uplink::MsgType::Status {
            assert_eq!(frame.payload, vec![HostStatus::LinkDown as u8]);
            break;
        }
    }

    // Both sides recover on their own; a fresh request restarts from
    // chunk zero and completes byte-exact.
    rig.wait_connected().await;
    rig.host.expect_status(HostStatus::LinkUp).await;
    rig.base.request_log("big.csv").await.unwrap();
    rig.host.expect_status(HostStatus::TransferStart).await;
    let lines = rig.host.log_lines_until(HostStatus::TransferDone).await;
    assert_eq!(lines.concat(), content);
}

#[tokio::test]
async fn committed_bytes_match_file_on_larger_mtu() {
    // A roomier link: MTU 163 → attribute 160 → payload 158.
    let mut rig = spawn_rig(163).await;
    let content: Vec<u8> = (0..3000u32).map(|i| (i * 7 % 256) as u8).collect();
    rig.plant_file("wide.csv", &content);

    rig.host.expect_status(HostStatus::LinkUp).await;
    rig.base.request_log("wide.csv").await.unwrap();
    rig.host.expect_status(HostStatus::TransferStart).await;
    let lines = rig.host.log_lines_until(HostStatus::TransferDone).await;

    assert!(lines.iter().all(|l| l.len() <= 158));
    assert_eq!(lines.concat(), content);
}

#[tokio::test]
async fn oversized_basename_is_refused() {
    let mut rig = spawn_rig(23).await;
    rig.host.expect_status(HostStatus::LinkUp).await;

    let name49 = "a".repeat(49);
    rig.base.request_log(&name49).await.unwrap();
    // The write itself fails client-side (basename over 48 bytes), so
    // nothing reaches the shears and no transfer starts.
    rig.host.expect_quiet(Duration::from_millis(150)).await;
}

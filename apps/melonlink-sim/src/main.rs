//! melonlink simulator.
//!
//! Runs the complete shears and base stacks in one process over the
//! in-process radio medium: a synthetic GPS feeds the line assembler,
//! a save fires per point, the base pulls the resulting CSV over the
//! link, and the frames arriving on the host serial wire are decoded
//! and checked against the shears' own file.

mod gps;

use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use melonlink_base::supervisor::BaseSupervisor;
use melonlink_base::{BaseConfig, SerialUplink, TransferClient};
use melonlink_protocol::uplink::{FrameParser, HostStatus, MsgType};
use melonlink_radio::Medium;
use melonlink_shears::assembler::run_assembler;
use melonlink_shears::save::run_save_worker;
use melonlink_shears::{
    CsvStore, LatestLine, SaveRequest, ShearsConfig, ShearsSupervisor, TransferServer,
};

use gps::FakeGps;

#[derive(Debug, Parser)]
#[command(about = "Run both melonlink device stacks over an in-process link")]
struct Args {
    /// Number of GPS points to ingest before the offload.
    #[arg(short, long, default_value_t = 12)]
    points: u32,

    /// ATT MTU of the simulated link.
    #[arg(short, long, default_value_t = 23)]
    mtu: usize,

    /// Seed for the GPS walk.
    #[arg(short, long, default_value_t = 7)]
    seed: u64,

    /// Write the host-received CSV to this path.
    #[arg(short, long)]
    out: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!(points = args.points, mtu = args.mtu, "starting simulator");

    let (periph, central, _ctl) = Medium::pair(args.mtu);
    let cancel = CancellationToken::new();

    // Shears stack on a temporary storage mount.
    let storage = tempfile::tempdir().context("storage dir")?;
    let shears_cfg = ShearsConfig {
        storage_dir: storage.path().to_path_buf(),
        ..ShearsConfig::default()
    };
    let base_cfg = BaseConfig::default();
    let store = CsvStore::open(shears_cfg.log_path())?;
    let server = TransferServer::new(&shears_cfg.storage_dir);
    tokio::spawn(ShearsSupervisor::new(periph, server, cancel.clone()).run());

    let latest = LatestLine::new();
    let (mut gps_tx, gps_rx) = tokio::io::duplex(1024);
    tokio::spawn(run_assembler(gps_rx, latest.clone(), cancel.clone()));

    let save = SaveRequest::new();
    tokio::spawn(run_save_worker(
        save.clone(),
        latest,
        store.clone(),
        cancel.clone(),
    ));

    // Base stack with the host wire looped back into this process.
    let (wire_tx, mut wire_rx) = tokio::io::duplex(8192);
    let uplink = SerialUplink::spawn(wire_tx, cancel.clone());
    let client = TransferClient::new(uplink.clone());
    let (supervisor, base) = BaseSupervisor::new(central, client, uplink, cancel.clone());
    tokio::spawn(supervisor.run());

    // Walk the field: one sentence and one save per point.
    let mut fake = FakeGps::new(29.576_13, -82.329_42, args.seed);
    for _ in 0..args.points {
        gps_tx.write_all(fake.next_sentence().as_bytes()).await?;
        tokio::time::sleep(Duration::from_millis(30)).await;
        save.request();
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    let rows = store.row_count()?;
    info!(rows, "ingest finished");

    // Newest points, the way the shears console would show them.
    for row in store.tail(5)? {
        if let Some((utc, rest)) = row.split_once(',') {
            println!("  {} | {rest}", melonlink_shears::nmea::format_utc(utc));
        }
    }

    // Pull the log over the link and rebuild it from host frames.
    base.request_log(&base_cfg.log_basename).await?;

    let mut parser = FrameParser::new();
    let mut csv = Vec::new();
    let mut chunks = 0u32;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    'outer: loop {
        let mut buf = [0u8; 512];
        let n = tokio::select! {
            n = wire_rx.read(&mut buf) => n.context("host wire")?,
            _ = tokio::time::sleep_until(deadline) => bail!("transfer timed out"),
        };
        for frame in parser.push(&buf[..n]) {
            match frame.msg_type {
                MsgType::LogLine => {
                    chunks += 1;
                    csv.extend_from_slice(&frame.payload);
                }
                MsgType::Status => match HostStatus::from_u8(frame.payload[0])? {
                    HostStatus::TransferDone => break 'outer,
                    HostStatus::TransferError => bail!("transfer failed"),
                    status => info!(?status, "host status"),
                },
                MsgType::CutRecord => {}
            }
        }
    }

    let original = std::fs::read(store.path())?;
    info!(
        chunks,
        bytes = csv.len(),
        "transfer complete, verifying against shears copy"
    );
    if csv != original {
        bail!(
            "host copy diverges: {} bytes received, {} on shears",
            csv.len(),
            original.len()
        );
    }

    println!("ingested {rows} points, offloaded {} bytes in {chunks} chunks:", csv.len());
    print!("{}", String::from_utf8_lossy(&csv));

    if let Some(out) = args.out {
        std::fs::write(&out, &csv).with_context(|| format!("writing {}", out.display()))?;
        info!(path = %out.display(), "host copy written");
    }

    cancel.cancel();
    Ok(())
}

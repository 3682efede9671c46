use std::path::PathBuf;

use chrono::Utc;
use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    bail,
    Error,
};
use herci_frame::{
    minipackets,
    FrameScanner,
};
use herci_store::{
    PayloadRecord,
    PayloadStore,
    SpacecraftId,
    SpacecraftRegistry,
    SpacecraftSet,
};

fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    match args.command {
        Command::Import {
            log,
            spacecraft,
            known,
            input,
        } => {
            let registry = SpacecraftSet::new(known);
            if !registry.is_empty() && !registry.is_known(spacecraft) {
                bail!("spacecraft {spacecraft} is not in the configured set");
            }

            let store = PayloadStore::load(&log, &registry)?;
            let capture = std::fs::read(&input)?;

            let mut imported = 0usize;
            let mut duplicates = 0usize;
            let mut oversize = 0usize;

            let mut scanner = FrameScanner::new(&capture);
            for frame in scanner.by_ref() {
                let capture_date = Utc::now().format("%Y%m%d%H%M%S").to_string();
                let record = match PayloadRecord::from_frame(&frame, spacecraft, capture_date) {
                    Ok(record) => record,
                    Err(error) => {
                        tracing::warn!(%error, "frame doesn't fit the high-speed layout");
                        oversize += 1;
                        continue;
                    }
                };

                if store.save(record)? {
                    imported += 1;
                }
                else {
                    duplicates += 1;
                }
            }

            let stats = scanner.stats();
            println!(
                "{imported} new records, {duplicates} duplicates, {oversize} oversize frames"
            );
            println!(
                "scan: {} frames, {} bytes skipped, {} CRC errors, {} length errors",
                stats.frames, stats.skipped_bytes, stats.crc_errors, stats.length_errors
            );
            println!("store now holds {} records", store.len());
        }
        Command::Dump { input, minipackets } => {
            let capture = std::fs::read(&input)?;

            let mut scanner = FrameScanner::new(&capture);
            for (i, frame) in scanner.by_ref().enumerate() {
                println!(
                    "frame {i}: {:?} #{} epoch {} seconds {}{} with {} payload bytes",
                    frame.sequence.source(),
                    frame.sequence.frame_count(),
                    frame.epoch,
                    frame.system_time.seconds(),
                    if frame.system_time.suspect() {
                        " (time suspect)"
                    }
                    else {
                        ""
                    },
                    frame.payload.len(),
                );
                hex_dump(frame.payload.iter().copied());

                if minipackets {
                    dump_minipackets(&frame.payload);
                }
            }

            let stats = scanner.stats();
            println!(
                "{} frames, {} bytes skipped, {} CRC errors, {} length errors",
                stats.frames, stats.skipped_bytes, stats.crc_errors, stats.length_errors
            );
        }
        Command::Query {
            log,
            spacecraft,
            period,
            from_reset,
            from_uptime,
        } => {
            let store = PayloadStore::load(&log, &SpacecraftSet::default())?;
            for record in store.range(period, spacecraft, from_reset, from_uptime) {
                println!("{}", record.to_line());
            }
        }
        Command::Latest { log } => {
            let store = PayloadStore::load(&log, &SpacecraftSet::default())?;
            match store.latest() {
                Some(record) => {
                    println!(
                        "latest record: {} values, reset {} uptime {} captured {}",
                        record.fields.len(),
                        record.resets,
                        record.uptime,
                        record.capture_date,
                    );
                    hex_dump(record.fields.iter().map(|value| *value as u8));
                }
                None => println!("store is empty"),
            }
        }
        Command::Remove { log } => {
            let store = PayloadStore::load(&log, &SpacecraftSet::default())?;
            let records = store.len();
            store.remove()?;
            println!("removed {records} records");
        }
    }

    Ok(())
}

/// Prints bytes as hex, 32 to a row.
fn hex_dump(bytes: impl IntoIterator<Item = u8>) {
    let mut row = String::new();
    for (i, byte) in bytes.into_iter().enumerate() {
        if i > 0 && i % 32 == 0 {
            println!("  {row}");
            row.clear();
        }
        row.push_str(&format!("{byte:02x} "));
    }
    if !row.is_empty() {
        println!("  {row}");
    }
}

fn dump_minipackets(payload: &[u8]) {
    for result in minipackets(payload) {
        match result {
            Ok(packet) => {
                println!(
                    "  minipacket type {} segment {}{} time {} status {} data {} bytes",
                    packet.packet_type,
                    packet.segmentation.segment(),
                    if packet.segmentation.eof() { " (eof)" } else { "" },
                    packet.truncated_time,
                    packet.status.len(),
                    packet.data.len(),
                );
            }
            Err(error) => {
                println!("  {error}");
            }
        }
    }
}

#[derive(Debug, Parser)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decode a raw downlink capture and store the frames as high-speed
    /// payload records.
    Import {
        #[clap(long, env = "HERCI_LOG")]
        log: PathBuf,

        /// Spacecraft id to stamp on decoded records.
        #[clap(short, long)]
        spacecraft: SpacecraftId,

        /// Configured spacecraft ids; leave empty to accept any.
        #[clap(short, long)]
        known: Vec<SpacecraftId>,

        input: PathBuf,
    },
    /// Decode a raw downlink capture and print the frames.
    Dump {
        input: PathBuf,

        /// Also walk and print each frame's minipackets.
        #[clap(short, long)]
        minipackets: bool,
    },
    /// Print a window of stored records as log lines.
    Query {
        #[clap(long, env = "HERCI_LOG")]
        log: PathBuf,

        #[clap(short, long)]
        spacecraft: SpacecraftId,

        /// Number of records to return.
        #[clap(short, long, default_value = "25")]
        period: usize,

        /// Reset count to start from; 0/0 selects the most recent
        /// records.
        #[clap(long, default_value = "0")]
        from_reset: u32,

        /// Uptime to start from.
        #[clap(long, default_value = "0")]
        from_uptime: u64,
    },
    /// Show the most recent stored record.
    Latest {
        #[clap(long, env = "HERCI_LOG")]
        log: PathBuf,
    },
    /// Delete a store's log file.
    Remove {
        #[clap(long, env = "HERCI_LOG")]
        log: PathBuf,
    },
}

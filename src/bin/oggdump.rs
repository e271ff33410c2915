use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};
use log::{error, info, warn};
use ogg_bitstream::{
    Demuxer, DemuxerConfig, Muxer, PacketBuf, ReadStatus, StreamWriterConfig, SyncState,
    SyncStatus,
};

/// Inspects and rewrites OGG files.
#[derive(Parser, Debug)]
#[command(name = "oggdump", version, about = "Inspects and rewrites OGG files")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List every page of the file
    Pages {
        path: PathBuf,
        /// Bytes read from the file per call
        #[arg(long, default_value_t = 4096)]
        chunk_size: usize,
    },
    /// List every packet of every logical bitstream
    Packets {
        path: PathBuf,
        #[arg(long, default_value_t = 4096)]
        chunk_size: usize,
    },
    /// Re-page all logical bitstreams into a new file
    Remux {
        input: PathBuf,
        output: PathBuf,
        /// Emit a page once it holds more than this many body bytes
        #[arg(long)]
        fill_threshold: Option<usize>,
    },
}

fn init_logger() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run(Cli::parse()) {
        error!("{:?}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.cmd {
        Cmd::Pages { path, chunk_size } => dump_pages(&path, chunk_size),
        Cmd::Packets { path, chunk_size } => dump_packets(&path, chunk_size),
        Cmd::Remux {
            input,
            output,
            fill_threshold,
        } => remux(&input, &output, fill_threshold),
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn dump_pages(path: &Path, chunk_size: usize) -> Result<()> {
    let mut reader = open(path)?;
    let mut sync = SyncState::new();
    let chunk_size = chunk_size.max(1);
    let mut pages = 0_usize;

    loop {
        let buffer = sync.buffer(chunk_size);
        let bytes = reader
            .read(&mut buffer[..chunk_size])
            .with_context(|| format!("read {}", path.display()))?;
        sync.wrote(bytes)?;

        loop {
            match sync.next_page() {
                SyncStatus::PageReady(page) => {
                    pages += 1;
                    println!(
                        "serial={:#010x} seq={} granule={} segments={} bytes={}{}{}{}",
                        page.serial(),
                        page.sequence_number(),
                        page.granule_position(),
                        page.segment_count(),
                        page.len(),
                        if page.is_continued() { " continued" } else { "" },
                        if page.is_bos() { " bos" } else { "" },
                        if page.is_eos() { " eos" } else { "" },
                    );
                }
                SyncStatus::Resynchronized { skipped } => {
                    println!("-- skipped {} bytes", skipped);
                }
                SyncStatus::NeedMoreData => break,
            }
        }

        if bytes == 0 {
            break;
        }
    }

    if sync.buffered() != 0 {
        warn!("{} trailing bytes do not form a page", sync.buffered());
    }
    info!("{} pages, {} bytes skipped", pages, sync.skipped_bytes());
    Ok(())
}

fn dump_packets(path: &Path, chunk_size: usize) -> Result<()> {
    let config = DemuxerConfig { chunk_size };
    let mut demuxer = Demuxer::with_config(open(path)?, config);
    let mut packet = PacketBuf::default();
    let mut packets = 0_usize;

    loop {
        match demuxer
            .read_packet(&mut packet)
            .with_context(|| format!("demux {}", path.display()))?
        {
            ReadStatus::Ok => {
                packets += 1;
                println!(
                    "serial={:#010x} packet={} granule={} bytes={}{}{}",
                    packet.serial,
                    packet.packet_number,
                    packet.granule_position,
                    packet.data.len(),
                    if packet.bos { " bos" } else { "" },
                    if packet.eos { " eos" } else { "" },
                );
            }
            ReadStatus::Missing { serial } => {
                println!("serial={:#010x} -- packets missing", serial);
            }
            ReadStatus::Eof => break,
        }
    }

    info!("{} packets", packets);
    Ok(())
}

fn remux(input: &Path, output: &Path, fill_threshold: Option<usize>) -> Result<()> {
    let mut demuxer = Demuxer::new(open(input)?);
    let file = File::create(output).with_context(|| format!("create {}", output.display()))?;
    let config = StreamWriterConfig { fill_threshold };
    let mut muxer = Muxer::with_config(BufWriter::new(file), config);

    let mut packet = PacketBuf::default();
    let mut open_streams: Vec<u32> = Vec::new();

    loop {
        match demuxer.read_packet(&mut packet)? {
            ReadStatus::Ok => {}
            ReadStatus::Missing { serial } => {
                warn!("bitstream {:#010x}: packets missing", serial);
                continue;
            }
            ReadStatus::Eof => break,
        }

        let serial = packet.serial;
        if packet.bos && packet.eos {
            muxer.write_single_packet_stream(serial, &packet.data, packet.granule_position)?;
        } else if packet.bos {
            muxer.begin_logical_stream(serial, &packet.data)?;
            open_streams.push(serial);
        } else if packet.eos {
            muxer.end_logical_stream(serial, &packet.data, packet.granule_position)?;
            open_streams.retain(|&s| s != serial);
        } else {
            muxer.push_packet(serial, &packet.data, packet.granule_position)?;
        }
    }

    for serial in open_streams {
        warn!("bitstream {:#010x} has no end, flushing", serial);
        muxer.flush(serial)?;
    }

    let mut writer = muxer.into_inner();
    writer
        .flush()
        .with_context(|| format!("write {}", output.display()))?;
    info!("remuxed {} into {}", input.display(), output.display());
    Ok(())
}

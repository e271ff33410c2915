use std::io::{ErrorKind, Read, Seek, SeekFrom};

use log::{debug, trace, warn};

use crate::{PacketBuf, PacketStatus, Page, ReadError, StreamReader, SyncState, SyncStatus};

/// Returns the status of the read operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadStatus {
    /// Packet is fine.
    Ok,
    /// No new packet, since we reached the EOF.
    Eof,
    /// No new packet. Pages of the given logical bitstream are missing, so at least one
    /// packet of it was lost.
    Missing {
        /// Serial number of the logical bitstream.
        serial: u32,
    },
}

/// Configures a [`Demuxer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DemuxerConfig {
    /// Number of bytes requested from the reader per read call.
    pub chunk_size: usize,
}

impl Default for DemuxerConfig {
    fn default() -> Self {
        Self { chunk_size: 4096 }
    }
}

/// Generic OGG stream reader. Demultiplexes the logical bitstreams of a reader into packets.
///
/// A logical bitstream is picked up when its first page (BOS) is found and is dropped once
/// its last packet was returned. Pages of unknown bitstreams are ignored.
#[derive(Debug)]
pub struct Demuxer<R: Read> {
    reader: R,
    config: DemuxerConfig,
    sync: SyncState,
    streams: Vec<StreamReader>,
    eof: bool,
}

impl<R: Read> Demuxer<R> {
    /// Creates a new `Demuxer`.
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, DemuxerConfig::default())
    }

    /// Creates a new `Demuxer` with the given config.
    pub fn with_config(reader: R, config: DemuxerConfig) -> Self {
        Self {
            reader,
            config,
            sync: SyncState::new(),
            streams: Vec::new(),
            eof: false,
        }
    }

    /// Consumes the `Demuxer` and returns the reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Serial numbers of the logical bitstreams that are currently open.
    pub fn active_streams(&self) -> impl Iterator<Item = u32> + '_ {
        self.streams.iter().map(StreamReader::serial)
    }

    /// Bytes skipped so far while searching for pages.
    pub fn skipped_bytes(&self) -> usize {
        self.sync.skipped_bytes()
    }

    /// Reads the next packet from the reader.
    ///
    /// Will gracefully handle recoverable errors like pages with wrong checksums,
    /// missing packets and out of sync events.
    ///
    /// Returns the status of the operation. When receiving `ReadStatus::Missing` or
    /// `ReadStatus::Eof` no data was written into the given packet.
    ///
    /// A logical bitstream that hands in a page it can't accept (unsupported version) is
    /// dropped and reported as `ReadStatus::Missing`. The other bitstreams continue.
    pub fn read_packet(&mut self, packet: &mut PacketBuf) -> Result<ReadStatus, ReadError> {
        loop {
            if let Some(status) = self.take_packet(packet) {
                return Ok(status);
            }

            match self.sync.next_page() {
                SyncStatus::PageReady(page) => {
                    if let Some(status) = route_page(&mut self.streams, &page) {
                        return Ok(status);
                    }
                }
                SyncStatus::Resynchronized { skipped } => {
                    trace!("resynchronized after {} bytes", skipped);
                }
                SyncStatus::NeedMoreData => {
                    if self.eof {
                        return Ok(ReadStatus::Eof);
                    }
                    self.fill_buffer()?;
                }
            }
        }
    }

    fn take_packet(&mut self, packet: &mut PacketBuf) -> Option<ReadStatus> {
        for index in 0..self.streams.len() {
            let stream = &mut self.streams[index];
            let serial = stream.serial();

            let eos = match stream.packet_out() {
                PacketStatus::NeedMoreData => continue,
                PacketStatus::Corrupt => return Some(ReadStatus::Missing { serial }),
                PacketStatus::Packet(p) => {
                    packet.copy_from(serial, &p);
                    p.eos
                }
            };

            if eos {
                debug!("logical bitstream {} ended", serial);
                let _ = self.streams.remove(index);
            }
            return Some(ReadStatus::Ok);
        }
        None
    }

    fn fill_buffer(&mut self) -> Result<(), ReadError> {
        let chunk_size = self.config.chunk_size.max(1);
        let buffer = self.sync.buffer(chunk_size);

        let bytes = loop {
            match self.reader.read(&mut buffer[..chunk_size]) {
                Ok(bytes) => break bytes,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        };

        self.sync.wrote(bytes)?;
        if bytes == 0 {
            debug!("reached end of input");
            self.eof = true;
        }
        Ok(())
    }
}

impl<R: Read + Seek> Demuxer<R> {
    /// Seeks the logical bitstream `serial` to the first page with a granule position of at
    /// least `granule_position`. The packets completed on that page are returned next.
    ///
    /// All other logical bitstreams continue at the same position in the physical stream.
    /// If the user is seeking outside of the stream, `read_packet()` will return
    /// `ReadStatus::Eof` on the next call.
    pub fn seek(&mut self, serial: u32, granule_position: i64) -> Result<(), ReadError> {
        let _ = self.reader.seek(SeekFrom::Start(0))?;
        self.sync.reset();
        self.eof = false;
        self.streams.iter_mut().for_each(StreamReader::reset);

        // Pages of `serial` since the last one that completed a packet, and the number of
        // packets that start and end on that page.
        let mut chain: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        let mut chain_packets = 0;

        loop {
            match self.sync.next_page() {
                SyncStatus::PageReady(page) => {
                    if page.is_bos() {
                        let _ = open_stream(&mut self.streams, page.serial());
                    }
                    if page.serial() != serial {
                        continue;
                    }

                    let granule = page.granule_position();
                    if granule != -1 && granule >= granule_position {
                        // A continued page needs the pages its first packet started on.
                        let (previous, skip) = if page.is_continued() {
                            (&chain[..], chain_packets)
                        } else {
                            (&[][..], 0)
                        };

                        let index = open_stream(&mut self.streams, serial);
                        let stream = &mut self.streams[index];
                        if let Err(err) = feed_pages(stream, previous, &page) {
                            warn!("dropping logical bitstream {}: {}", serial, err);
                            let _ = self.streams.remove(index);
                            return Ok(());
                        }
                        for _ in 0..skip {
                            let _ = stream.packet_out();
                        }

                        debug!(
                            "seeked bitstream {} to page {} with granule position {}",
                            serial,
                            page.sequence_number(),
                            granule
                        );
                        return Ok(());
                    }

                    if page.packet_count() > 0 {
                        chain.clear();
                        chain_packets = page.packet_count() - usize::from(page.is_continued());
                    }
                    chain.push((page.header().to_vec(), page.body().to_vec()));
                }
                SyncStatus::Resynchronized { .. } => {}
                SyncStatus::NeedMoreData => {
                    if self.eof {
                        debug!(
                            "granule position {} of bitstream {} is outside of the stream",
                            granule_position, serial
                        );
                        return Ok(());
                    }
                    self.fill_buffer()?;
                }
            }
        }
    }
}

fn feed_pages(
    stream: &mut StreamReader,
    previous: &[(Vec<u8>, Vec<u8>)],
    page: &Page<'_>,
) -> Result<(), ReadError> {
    for (header, body) in previous {
        stream.page_in(&Page::new(header, body))?;
    }
    stream.page_in(page)
}

/// Returns the index of the stream with the given serial, creating it if needed.
fn open_stream(streams: &mut Vec<StreamReader>, serial: u32) -> usize {
    match streams.iter().position(|s| s.serial() == serial) {
        Some(index) => index,
        None => {
            streams.push(StreamReader::new(serial));
            streams.len() - 1
        }
    }
}

/// Hands the page to its logical bitstream. Returns `ReadStatus::Missing` if the bitstream
/// had to be dropped.
fn route_page(streams: &mut Vec<StreamReader>, page: &Page<'_>) -> Option<ReadStatus> {
    let serial = page.serial();
    if let Some(index) = streams.iter().position(|s| s.serial() == serial) {
        if let Err(err) = streams[index].page_in(page) {
            warn!("dropping logical bitstream {}: {}", serial, err);
            let _ = streams.remove(index);
            return Some(ReadStatus::Missing { serial });
        }
        return None;
    }

    if page.is_bos() {
        let mut stream = StreamReader::new(serial);
        match stream.page_in(page) {
            Ok(()) => {
                debug!("found logical bitstream {}", serial);
                streams.push(stream);
            }
            Err(err) => warn!("ignoring logical bitstream {}: {}", serial, err),
        }
    } else {
        debug!(
            "dropping page {} of unknown bitstream {}",
            page.sequence_number(),
            serial
        );
    }
    None
}
